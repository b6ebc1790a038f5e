use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool, config.embedding.dims).await?;
    pool.close().await;
    Ok(())
}

/// Create extensions, tables, and indexes. Idempotent.
///
/// With `dims` unknown (embeddings disabled) the vector column is left
/// untyped and no ANN index is built.
pub async fn migrate(pool: &PgPool, dims: Option<usize>) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .context("Failed to create extension 'vector' (is pgvector installed?)")?;
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pg_trgm")
        .execute(pool)
        .await
        .context("Failed to create extension 'pg_trgm'")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_nodes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL REFERENCES knowledge_nodes(id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes BIGINT NOT NULL,
            storage_path TEXT,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'embedding-pending',
            created_at BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index BIGINT NOT NULL,
            content TEXT NOT NULL,
            start_offset BIGINT NOT NULL,
            end_offset BIGINT NOT NULL,
            metadata_json TEXT,
            hash TEXT NOT NULL,
            UNIQUE(document_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let vector_type = match dims {
        Some(d) => format!("vector({})", d),
        None => "vector".to_string(),
    };
    // DDL cannot take bind parameters; `dims` is a validated integer.
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding {} NOT NULL,
            created_at BIGINT NOT NULL
        )
        "#,
        vector_type
    ))
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_node_id ON documents(node_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_content_trgm ON chunks USING gin (content gin_trgm_ops)",
    )
    .execute(pool)
    .await?;

    if dims.is_some() {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embeddings_hnsw ON embeddings USING hnsw (embedding vector_cosine_ops)",
        )
        .execute(pool)
        .await?;
    } else {
        tracing::info!("embedding dims not configured, skipping vector index");
    }

    tracing::info!("migrations applied");
    Ok(())
}
