//! PostgreSQL-backed [`Store`] implementation.
//!
//! Lexical search uses `pg_trgm`'s `similarity(content, query)`; vector
//! search uses pgvector's cosine distance operator `<=>`, reported as
//! `1 - distance`. Every statement is parameterized. Vectors cross the
//! driver as text produced by [`to_vector_literal`] and are cast with
//! `::vector` on the server.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use legal_rag_core::embedding::to_vector_literal;
use legal_rag_core::error::{RagError, Result};
use legal_rag_core::models::{Chunk, Document, DocumentStatus, Embedding, KnowledgeNode};
use legal_rag_core::store::{ChunkCandidate, Store};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_foreign_key_violation())
        .unwrap_or(false)
}

fn parse_metadata(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn node_from_row(row: &PgRow) -> std::result::Result<KnowledgeNode, sqlx::Error> {
    Ok(KnowledgeNode {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    let status: String = row.try_get("status").map_err(RagError::storage)?;
    let metadata: String = row.try_get("metadata_json").map_err(RagError::storage)?;
    Ok(Document {
        id: row.try_get("id").map_err(RagError::storage)?,
        node_id: row.try_get("node_id").map_err(RagError::storage)?,
        filename: row.try_get("filename").map_err(RagError::storage)?,
        mime_type: row.try_get("mime_type").map_err(RagError::storage)?,
        size_bytes: row.try_get("size_bytes").map_err(RagError::storage)?,
        storage_path: row.try_get("storage_path").map_err(RagError::storage)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
        status: status.parse()?,
        created_at: row.try_get("created_at").map_err(RagError::storage)?,
    })
}

fn chunk_from_row(row: &PgRow) -> std::result::Result<Chunk, sqlx::Error> {
    let start: i64 = row.try_get("start_offset")?;
    let end: i64 = row.try_get("end_offset")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        start_offset: start.max(0) as usize,
        end_offset: end.max(0) as usize,
        metadata: parse_metadata(row.try_get("metadata_json")?),
        hash: row.try_get("hash")?,
    })
}

fn candidate_from_row(row: &PgRow) -> std::result::Result<ChunkCandidate, sqlx::Error> {
    let start: i64 = row.try_get("start_offset")?;
    Ok(ChunkCandidate {
        chunk_id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        filename: row.try_get("filename")?,
        content: row.try_get("content")?,
        start_offset: start.max(0) as usize,
        metadata: parse_metadata(row.try_get("metadata_json")?),
        score: row.try_get("score")?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, node_id, filename, mime_type, size_bytes, storage_path, \
                                metadata_json, status, created_at";

#[async_trait]
impl Store for PgStore {
    async fn create_node(&self, name: &str, description: Option<&str>) -> Result<KnowledgeNode> {
        let node = KnowledgeNode {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: chrono::Utc::now().timestamp(),
        };

        sqlx::query(
            "INSERT INTO knowledge_nodes (id, name, description, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&node.id)
        .bind(&node.name)
        .bind(&node.description)
        .bind(node.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RagError::InvalidInput(format!("node name already exists: {}", name))
            } else {
                RagError::storage(e)
            }
        })?;

        Ok(node)
    }

    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM knowledge_nodes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::storage)?;

        row.as_ref()
            .map(node_from_row)
            .transpose()
            .map_err(RagError::storage)
    }

    async fn list_nodes(&self) -> Result<Vec<KnowledgeNode>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at FROM knowledge_nodes ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        rows.iter()
            .map(node_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(RagError::storage)
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM knowledge_nodes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, node_id, filename, mime_type, size_bytes, storage_path,
                                   metadata_json, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.node_id)
        .bind(&doc.filename)
        .bind(&doc.mime_type)
        .bind(doc.size_bytes)
        .bind(&doc.storage_path)
        .bind(doc.metadata.to_string())
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                RagError::NotFound {
                    kind: "node",
                    id: doc.node_id.clone(),
                }
            } else {
                RagError::storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::storage)?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        if result.rows_affected() == 0 {
            return Err(RagError::NotFound {
                kind: "document",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn documents_with_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE status = $1 ORDER BY created_at, id",
            DOCUMENT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, start_offset,
                                    end_offset, metadata_json, hash)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(chunk.metadata.as_ref().map(|m| m.to_string()))
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    RagError::NotFound {
                        kind: "document",
                        id: chunk.document_id.clone(),
                    }
                } else {
                    RagError::storage(e)
                }
            })?;
        }

        tx.commit().await.map_err(RagError::storage)?;
        Ok(())
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, start_offset, end_offset,
                   metadata_json, hash
            FROM chunks
            WHERE document_id = $1
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::storage)?;

        rows.iter()
            .map(chunk_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(RagError::storage)
    }

    async fn insert_embeddings(&self, embeddings: &[Embedding]) -> Result<()> {
        if embeddings.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;

        for e in embeddings {
            let literal = to_vector_literal(&e.vector)?;
            sqlx::query(
                r#"
                INSERT INTO embeddings (chunk_id, model, dims, embedding, created_at)
                VALUES ($1, $2, $3, $4::vector, $5)
                ON CONFLICT (chunk_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&e.chunk_id)
            .bind(&e.model)
            .bind(e.dims as i32)
            .bind(&literal)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;
        }

        tx.commit().await.map_err(RagError::storage)?;
        Ok(())
    }

    async fn lexical_search(
        &self,
        node_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, d.filename, c.content, c.start_offset, c.metadata_json,
                   similarity(c.content, $2)::float8 AS score
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.node_id = $1
              AND similarity(c.content, $2) > 0
            ORDER BY score DESC, c.id ASC
            LIMIT $3
            "#,
        )
        .bind(node_id)
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::retrieval)?;

        rows.iter()
            .map(candidate_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(RagError::retrieval)
    }

    async fn vector_search(
        &self,
        node_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let literal = to_vector_literal(query_vec)?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, d.filename, c.content, c.start_offset, c.metadata_json,
                   (1 - (e.embedding <=> $2::vector))::float8 AS score
            FROM embeddings e
            JOIN chunks c ON c.id = e.chunk_id
            JOIN documents d ON d.id = c.document_id
            WHERE d.node_id = $1
            ORDER BY e.embedding <=> $2::vector ASC, c.id ASC
            LIMIT $3
            "#,
        )
        .bind(node_id)
        .bind(&literal)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::retrieval)?;

        rows.iter()
            .map(candidate_from_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(RagError::retrieval)
    }
}
