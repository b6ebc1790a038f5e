//! In-memory [`Store`] implementation for tests and local experiments.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Lexical search is brute-force [`trigram::similarity`](crate::trigram)
//! and vector search is brute-force cosine similarity, both scoped to one
//! node.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, DocumentStatus, Embedding, KnowledgeNode};
use crate::trigram;

use super::{ChunkCandidate, Store};

#[derive(Default)]
struct Tables {
    nodes: HashMap<String, KnowledgeNode>,
    documents: HashMap<String, Document>,
    /// Insertion order; per-document order is ordinal order.
    chunks: Vec<Chunk>,
    embeddings: HashMap<String, Embedding>,
}

impl Tables {
    fn node_documents(&self, node_id: &str) -> HashMap<&str, &Document> {
        self.documents
            .values()
            .filter(|d| d.node_id == node_id)
            .map(|d| (d.id.as_str(), d))
            .collect()
    }

    fn remove_document_rows(&mut self, document_id: &str) {
        let removed: Vec<String> = self
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.id.clone())
            .collect();
        self.chunks.retain(|c| c.document_id != document_id);
        for id in removed {
            self.embeddings.remove(&id);
        }
        self.documents.remove(document_id);
    }
}

/// In-memory store.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| RagError::Storage("in-memory store lock poisoned".to_string()))
    }

    /// Number of stored embeddings (for assertions in tests).
    pub fn embedding_count(&self) -> usize {
        self.read().map(|t| t.embeddings.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn candidate(chunk: &Chunk, doc: &Document, score: f64) -> ChunkCandidate {
    ChunkCandidate {
        chunk_id: chunk.id.clone(),
        document_id: chunk.document_id.clone(),
        filename: doc.filename.clone(),
        content: chunk.content.clone(),
        start_offset: chunk.start_offset,
        metadata: chunk.metadata.clone(),
        score,
    }
}

fn top_k(mut candidates: Vec<ChunkCandidate>, limit: usize) -> Vec<ChunkCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(limit);
    candidates
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_node(&self, name: &str, description: Option<&str>) -> Result<KnowledgeNode> {
        let mut tables = self.write()?;
        if tables.nodes.values().any(|n| n.name == name) {
            return Err(RagError::InvalidInput(format!(
                "a knowledge node named '{}' already exists",
                name
            )));
        }
        let node = KnowledgeNode {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: chrono::Utc::now().timestamp(),
        };
        tables.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        Ok(self.read()?.nodes.get(id).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<KnowledgeNode>> {
        let mut nodes: Vec<KnowledgeNode> = self.read()?.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        if tables.nodes.remove(id).is_none() {
            return Ok(false);
        }
        let doc_ids: Vec<String> = tables
            .documents
            .values()
            .filter(|d| d.node_id == id)
            .map(|d| d.id.clone())
            .collect();
        for doc_id in doc_ids {
            tables.remove_document_rows(&doc_id);
        }
        Ok(true)
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.nodes.contains_key(&doc.node_id) {
            return Err(RagError::NotFound {
                kind: "knowledge node",
                id: doc.node_id.clone(),
            });
        }
        tables.documents.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(id).cloned())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        if !tables.documents.contains_key(id) {
            return Ok(false);
        }
        tables.remove_document_rows(id);
        Ok(true)
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let mut tables = self.write()?;
        let doc = tables.documents.get_mut(id).ok_or_else(|| RagError::NotFound {
            kind: "document",
            id: id.to_string(),
        })?;
        doc.status = status;
        Ok(())
    }

    async fn documents_with_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .read()?
            .documents
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tables = self.write()?;
        for c in chunks {
            if !tables.documents.contains_key(&c.document_id) {
                return Err(RagError::NotFound {
                    kind: "document",
                    id: c.document_id.clone(),
                });
            }
        }
        tables.chunks.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn insert_embeddings(&self, embeddings: &[Embedding]) -> Result<()> {
        let mut tables = self.write()?;
        for e in embeddings {
            if !tables.chunks.iter().any(|c| c.id == e.chunk_id) {
                return Err(RagError::NotFound {
                    kind: "chunk",
                    id: e.chunk_id.clone(),
                });
            }
            tables.embeddings.insert(e.chunk_id.clone(), e.clone());
        }
        Ok(())
    }

    async fn lexical_search(
        &self,
        node_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let tables = self.read()?;
        let docs = tables.node_documents(node_id);

        let candidates = tables
            .chunks
            .iter()
            .filter_map(|c| {
                let doc = docs.get(c.document_id.as_str())?;
                let score = trigram::similarity(&c.content, query);
                (score > 0.0).then(|| candidate(c, doc, score))
            })
            .collect();

        Ok(top_k(candidates, limit))
    }

    async fn vector_search(
        &self,
        node_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let tables = self.read()?;
        let docs = tables.node_documents(node_id);

        let candidates = tables
            .chunks
            .iter()
            .filter_map(|c| {
                let doc = docs.get(c.document_id.as_str())?;
                let embedding = tables.embeddings.get(&c.id)?;
                let score = cosine_similarity(query_vec, &embedding.vector) as f64;
                Some(candidate(c, doc, score))
            })
            .collect();

        Ok(top_k(candidates, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_text, ChunkConfig};

    fn document(node_id: &str, filename: &str) -> Document {
        Document {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            filename: filename.to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 10,
            storage_path: None,
            metadata: serde_json::json!({}),
            status: DocumentStatus::EmbeddingPending,
            created_at: 0,
        }
    }

    async fn seeded(store: &InMemoryStore, node_name: &str, filename: &str, text: &str) -> (String, Vec<Chunk>) {
        let node = store.create_node(node_name, None).await.unwrap();
        let doc = document(&node.id, filename);
        store.insert_document(&doc).await.unwrap();
        let chunks = chunk_text(&doc.id, text, &ChunkConfig { chunk_size: 40, overlap: 0 });
        store.insert_chunks(&chunks).await.unwrap();
        (node.id, chunks)
    }

    #[tokio::test]
    async fn test_lexical_search_scoped_to_node() {
        let store = InMemoryStore::new();
        let (node_a, _) = seeded(&store, "a", "a.txt", "locazione commerciale").await;
        let (node_b, _) = seeded(&store, "b", "b.txt", "locazione abitativa").await;

        let hits = store.lexical_search(&node_a, "locazione", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "a.txt");

        let hits = store.lexical_search(&node_b, "locazione", 10).await.unwrap();
        assert_eq!(hits[0].filename, "b.txt");
    }

    #[tokio::test]
    async fn test_lexical_search_skips_zero_scores_and_limits() {
        let store = InMemoryStore::new();
        let text = "Primo blocco sul canone mensile. Secondo blocco sul canone annuo. Terzo blocco su altro tema xyz.";
        let (node, chunks) = seeded(&store, "n", "f.txt", text).await;
        assert!(chunks.len() >= 3);

        let hits = store.lexical_search(&node, "canone", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        let none = store.lexical_search(&node, "qqq", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_vector_search_only_embedded_chunks() {
        let store = InMemoryStore::new();
        let (node, chunks) = seeded(&store, "n", "f.txt", "uno due tre quattro cinque sei sette otto nove dieci undici dodici").await;
        assert!(chunks.len() >= 2);

        assert!(store.vector_search(&node, &[1.0, 0.0], 5).await.unwrap().is_empty());

        store
            .insert_embeddings(&[Embedding {
                chunk_id: chunks[1].id.clone(),
                model: "m".into(),
                dims: 2,
                vector: vec![1.0, 0.0],
            }])
            .await
            .unwrap();

        let hits = store.vector_search(&node, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, chunks[1].id);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_delete_node_cascades() {
        let store = InMemoryStore::new();
        let (node, chunks) = seeded(&store, "n", "f.txt", "testo di prova").await;
        store
            .insert_embeddings(&[Embedding {
                chunk_id: chunks[0].id.clone(),
                model: "m".into(),
                dims: 1,
                vector: vec![1.0],
            }])
            .await
            .unwrap();

        assert!(store.delete_node(&node).await.unwrap());
        assert!(!store.delete_node(&node).await.unwrap());
        assert_eq!(store.embedding_count(), 0);
        assert!(store.document_chunks(&chunks[0].document_id).await.unwrap().is_empty());
        assert!(store.get_document(&chunks[0].document_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_node_name_rejected() {
        let store = InMemoryStore::new();
        store.create_node("civile", None).await.unwrap();
        let err = store.create_node("civile", None).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_document_status_tracking() {
        let store = InMemoryStore::new();
        let node = store.create_node("n", None).await.unwrap();
        let doc = document(&node.id, "f.txt");
        store.insert_document(&doc).await.unwrap();

        let pending = store
            .documents_with_status(DocumentStatus::EmbeddingPending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        store
            .set_document_status(&doc.id, DocumentStatus::Ingested)
            .await
            .unwrap();
        let got = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(got.status, DocumentStatus::Ingested);

        let err = store
            .set_document_status("missing", DocumentStatus::Ingested)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_insert_document_requires_node() {
        let store = InMemoryStore::new();
        let err = store
            .insert_document(&document("nope", "f.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }
}
