//! `lrag embed pending`: backfill embeddings for documents whose chunks
//! are stored but not (or not successfully) embedded.

use anyhow::{bail, Result};

use legal_rag_core::models::{Document, DocumentStatus};

use crate::app::App;
use crate::config::Config;

pub async fn run_embed_pending(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let app = App::connect(config).await?;

    let mut pending: Vec<Document> = app
        .store
        .documents_with_status(DocumentStatus::EmbeddingPending)
        .await?;
    pending.extend(
        app.store
            .documents_with_status(DocumentStatus::EmbeddingFailed)
            .await?,
    );
    if let Some(limit) = limit {
        pending.truncate(limit);
    }

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  documents needing embeddings: {}", pending.len());
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all documents up to date");
        return Ok(());
    }

    let total = pending.len();
    let mut embedded = 0usize;
    let mut failed = 0usize;
    let mut chunks = 0usize;

    for doc in &pending {
        let report = match app.ingestor.embed_document(&doc.id).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(document_id = %doc.id, filename = %doc.filename, error = %err, "document skipped");
                failed += 1;
                continue;
            }
        };
        match report.embedding_error {
            None => {
                embedded += 1;
                chunks += report.embeddings_created;
            }
            Some(err) => {
                tracing::warn!(document_id = %doc.id, filename = %doc.filename, error = %err, "embedding still failing");
                failed += 1;
            }
        }
    }

    println!("embed pending");
    println!("  documents: {}", total);
    println!("  embedded: {} ({} chunks)", embedded, chunks);
    println!("  failed: {}", failed);
    Ok(())
}
