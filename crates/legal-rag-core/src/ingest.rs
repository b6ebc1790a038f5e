//! Document ingestion: chunk, persist, embed.
//!
//! A document is written with status `embedding-pending`, its chunks are
//! written in ordinal order, and then all chunk texts are embedded with a
//! single [`Embedder::embed`] call. An embedding failure is not fatal: the
//! chunks stay stored, the document is marked `embedding-failed`, and the
//! report carries the error so the caller can backfill later with
//! [`Ingestor::embed_document`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunk::{chunk_text, normalize_whitespace, ChunkConfig};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, DocumentStatus, Embedding, NewDocument};
use crate::store::Store;

/// One document to ingest into a node.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub node_id: String,
    pub text: String,
    pub chunking: ChunkConfig,
    pub document: NewDocument,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_created: usize,
    pub embeddings_created: usize,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_error: Option<String>,
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        if request.document.filename.trim().is_empty() {
            return Err(RagError::InvalidInput("filename is required".to_string()));
        }
        if request.chunking.chunk_size == 0 {
            return Err(RagError::InvalidInput("chunk_size must be >= 1".to_string()));
        }
        if self.store.get_node(&request.node_id).await?.is_none() {
            return Err(RagError::NotFound {
                kind: "node",
                id: request.node_id,
            });
        }

        let normalized = normalize_whitespace(&request.text);
        let content_sha256 = format!("{:x}", Sha256::digest(normalized.as_bytes()));

        let mut metadata = match request.document.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("source".to_string(), other);
                map
            }
        };
        metadata.insert(
            "content_sha256".to_string(),
            serde_json::Value::String(content_sha256),
        );

        let document = Document {
            id: Uuid::new_v4().to_string(),
            node_id: request.node_id,
            filename: request.document.filename,
            mime_type: request.document.mime_type,
            size_bytes: request.document.size_bytes,
            storage_path: request.document.storage_path,
            metadata: serde_json::Value::Object(metadata),
            status: DocumentStatus::EmbeddingPending,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.store.insert_document(&document).await?;

        let chunks = chunk_text(&document.id, &normalized, &request.chunking);
        if let Err(e) = self.store.insert_chunks(&chunks).await {
            // Drop the row so no chunkless document is left pending.
            if let Err(cleanup) = self.store.delete_document(&document.id).await {
                tracing::error!(
                    document_id = %document.id,
                    error = %cleanup,
                    "failed to remove document after chunk write failure"
                );
            }
            return Err(e);
        }

        tracing::info!(
            document_id = %document.id,
            node_id = %document.node_id,
            filename = %document.filename,
            chunks = chunks.len(),
            "document chunked"
        );

        self.embed_chunks(&document.id, &chunks).await
    }

    /// Re-run embedding for an already chunked document.
    ///
    /// A document without stored chunks is rejected rather than marked
    /// `ingested`.
    pub async fn embed_document(&self, document_id: &str) -> Result<IngestReport> {
        if self.store.get_document(document_id).await?.is_none() {
            return Err(RagError::NotFound {
                kind: "document",
                id: document_id.to_string(),
            });
        }
        let chunks = self.store.document_chunks(document_id).await?;
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "document {} has no stored chunks",
                document_id
            )));
        }
        self.embed_chunks(document_id, &chunks).await
    }

    async fn embed_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<IngestReport> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

        let vectors = match self.embedder.embed(&texts).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    document_id,
                    error = %e,
                    "embedding failed, chunks kept for backfill"
                );
                self.store
                    .set_document_status(document_id, DocumentStatus::EmbeddingFailed)
                    .await?;
                return Ok(IngestReport {
                    document_id: document_id.to_string(),
                    chunks_created: chunks.len(),
                    embeddings_created: 0,
                    status: DocumentStatus::EmbeddingFailed,
                    embedding_error: Some(e.to_string()),
                });
            }
        };

        let model = self.embedder.model_name().to_string();
        let dims = self.embedder.dims();
        let embeddings: Vec<Embedding> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| Embedding {
                chunk_id: chunk.id.clone(),
                model: model.clone(),
                dims,
                vector,
            })
            .collect();

        self.store.insert_embeddings(&embeddings).await?;
        self.store
            .set_document_status(document_id, DocumentStatus::Ingested)
            .await?;

        tracing::debug!(document_id, embeddings = embeddings.len(), "document embedded");

        Ok(IngestReport {
            document_id: document_id.to_string(),
            chunks_created: chunks.len(),
            embeddings_created: embeddings.len(),
            status: DocumentStatus::Ingested,
            embedding_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlakyEmbedder {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RagError::Embedding("connection refused".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn setup(fail: bool) -> (Arc<InMemoryStore>, Arc<FlakyEmbedder>, Ingestor) {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(FlakyEmbedder {
            fail: AtomicBool::new(fail),
            calls: AtomicUsize::new(0),
        });
        let ingestor = Ingestor::new(store.clone(), embedder.clone());
        (store, embedder, ingestor)
    }

    fn request(node_id: &str, text: &str) -> IngestRequest {
        IngestRequest {
            node_id: node_id.to_string(),
            text: text.to_string(),
            chunking: ChunkConfig {
                chunk_size: 20,
                overlap: 5,
            },
            document: NewDocument {
                filename: "contratto.txt".to_string(),
                mime_type: "text/plain".to_string(),
                size_bytes: text.len() as i64,
                storage_path: None,
                metadata: serde_json::json!({"tipo": "contratto"}),
            },
        }
    }

    #[tokio::test]
    async fn test_ingest_embeds_in_one_call() {
        let (store, embedder, ingestor) = setup(false);
        let node = store.create_node("contratti", None).await.unwrap();
        let text = "Il conduttore versa il canone. Il locatore consegna l'immobile.";
        let report = ingestor.ingest(request(&node.id, text)).await.unwrap();

        assert!(report.chunks_created > 1);
        assert_eq!(report.embeddings_created, report.chunks_created);
        assert_eq!(report.status, DocumentStatus::Ingested);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.embedding_count(), report.chunks_created);

        let doc = store.get_document(&report.document_id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ingested);
        assert_eq!(doc.metadata["tipo"], "contratto");
        assert_eq!(doc.metadata["content_sha256"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_chunks() {
        let (store, embedder, ingestor) = setup(true);
        let node = store.create_node("contratti", None).await.unwrap();
        let report = ingestor
            .ingest(request(&node.id, "Testo del contratto di locazione commerciale."))
            .await
            .unwrap();

        assert_eq!(report.status, DocumentStatus::EmbeddingFailed);
        assert!(report.embedding_error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(report.embeddings_created, 0);
        let stored = store.document_chunks(&report.document_id).await.unwrap();
        assert_eq!(stored.len(), report.chunks_created);

        // Backfill once the service is back.
        embedder.fail.store(false, Ordering::SeqCst);
        let retry = ingestor.embed_document(&report.document_id).await.unwrap();
        assert_eq!(retry.status, DocumentStatus::Ingested);
        assert_eq!(retry.embeddings_created, stored.len());
    }

    #[tokio::test]
    async fn test_unknown_node_rejected() {
        let (_, embedder, ingestor) = setup(false);
        let err = ingestor.ingest(request("missing", "testo")).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { kind: "node", .. }));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_text_creates_document_without_chunks() {
        let (store, embedder, ingestor) = setup(false);
        let node = store.create_node("vuoto", None).await.unwrap();
        let report = ingestor.ingest(request(&node.id, "   \n ")).await.unwrap();
        assert_eq!(report.chunks_created, 0);
        assert_eq!(report.status, DocumentStatus::Ingested);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);

        let err = ingestor.embed_document(&report.document_id).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }
}
