//! Core data models used throughout legal-rag.
//!
//! Persistent entities (nodes, documents, chunks, embeddings) plus the
//! transient values produced per query (retrieval results, citations,
//! token usage).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RagError;

/// A named, isolated partition of documents queried together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeNode {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

/// Embedding progress of a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    /// Chunks and embeddings are all stored.
    Ingested,
    /// Chunks are stored, embeddings not yet generated.
    EmbeddingPending,
    /// Chunks are stored, the last embedding attempt failed.
    EmbeddingFailed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Ingested => "ingested",
            DocumentStatus::EmbeddingPending => "embedding-pending",
            DocumentStatus::EmbeddingFailed => "embedding-failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingested" => Ok(DocumentStatus::Ingested),
            "embedding-pending" => Ok(DocumentStatus::EmbeddingPending),
            "embedding-failed" => Ok(DocumentStatus::EmbeddingFailed),
            other => Err(RagError::Storage(format!(
                "unknown document status: {}",
                other
            ))),
        }
    }
}

/// Metadata supplied by the caller when a document is uploaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One ingested file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub node_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: Option<String>,
    pub metadata: serde_json::Value,
    pub status: DocumentStatus,
    pub created_at: i64,
}

/// A contiguous slice of a document's normalized text.
///
/// Offsets count characters (not bytes) of the normalized text, with
/// `end_offset` exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub metadata: Option<serde_json::Value>,
    pub hash: String,
}

impl Chunk {
    /// Page hint carried in chunk metadata, if any.
    pub fn page_hint(&self) -> Option<u32> {
        page_from_metadata(self.metadata.as_ref())
    }
}

/// A vector attached 1:1 to a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub chunk_id: String,
    pub model: String,
    pub dims: usize,
    pub vector: Vec<f32>,
}

/// A chunk selected for one query, with its fused relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub content: String,
    pub score: f64,
    pub lexical_score: f64,
    pub vector_score: f64,
    pub start_offset: usize,
    pub metadata: Option<serde_json::Value>,
}

impl RetrievalResult {
    pub fn page_hint(&self) -> Option<u32> {
        page_from_metadata(self.metadata.as_ref())
    }
}

/// A source reference resolved from a citation marker in the answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub document_id: String,
    pub filename: String,
    pub page: Option<u32>,
    pub chunk_id: String,
    pub excerpt: String,
}

/// Token accounting reported by a model provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

fn page_from_metadata(metadata: Option<&serde_json::Value>) -> Option<u32> {
    let page = metadata?.get("page")?;
    match page {
        serde_json::Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|p| *p > 0)
}
