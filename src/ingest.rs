//! `lrag ingest`: load a UTF-8 text file into a knowledge node.
//!
//! Text extraction from binary formats happens upstream; this command
//! expects already extracted text.

use anyhow::{Context, Result};
use std::path::Path;

use legal_rag_core::chunk::ChunkPreset;
use legal_rag_core::ingest::IngestRequest;
use legal_rag_core::models::NewDocument;

use crate::app::App;
use crate::config::Config;
use crate::nodes::resolve_node;

/// MIME type from the file extension, defaulting to plain text.
pub fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") | Some("markdown") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        _ => "text/plain",
    }
}

pub async fn run_ingest(
    config: &Config,
    node: &str,
    file: &Path,
    preset: Option<ChunkPreset>,
    mime: Option<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {} as UTF-8 text", file.display()))?;
    let size_bytes = text.len() as i64;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let app = App::connect(config).await?;
    let node = resolve_node(app.store.as_ref(), node).await?;
    let preset = preset.unwrap_or(config.chunking.default_preset);

    let report = app
        .ingestor
        .ingest(IngestRequest {
            node_id: node.id.clone(),
            text,
            chunking: preset.config(),
            document: NewDocument {
                filename,
                mime_type: mime.unwrap_or_else(|| guess_mime(file).to_string()),
                size_bytes,
                storage_path: Some(file.display().to_string()),
                metadata: serde_json::json!({ "preset": preset.as_str() }),
            },
        })
        .await?;

    println!("ingest {} → {}", file.display(), node.name);
    println!("  document: {}", report.document_id);
    println!("  preset: {}", preset);
    println!("  chunks written: {}", report.chunks_created);
    println!("  embeddings written: {}", report.embeddings_created);
    println!("  status: {}", report.status);
    if let Some(err) = &report.embedding_error {
        println!("  embedding error: {}", err);
        println!("  run `lrag embed pending` to retry");
    }

    Ok(())
}
