//! Error taxonomy shared by every stage of the engine.
//!
//! Fatal failures abort the request and carry enough context to be logged
//! server-side. Messages must never embed credentials; provider response
//! bodies are truncated with [`truncate_body`] before they land here.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Missing credentials, unknown provider, invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embedding service unreachable or returned a malformed response.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// Datastore query failure during lexical or vector search.
    #[error("retrieval failure: {0}")]
    Retrieval(String),

    /// Provider error, rate limit, or malformed completion.
    #[error("model call failure: {0}")]
    ModelCall(String),

    /// Datastore write or read failure outside of retrieval.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Caller-enforced wall-clock cap elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl RagError {
    pub fn retrieval<E: std::fmt::Display>(err: E) -> Self {
        RagError::Retrieval(err.to_string())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    /// Stable machine-readable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Configuration(_) => "configuration",
            RagError::Embedding(_) => "embedding",
            RagError::Retrieval(_) => "retrieval",
            RagError::ModelCall(_) => "model_call",
            RagError::Storage(_) => "storage",
            RagError::InvalidInput(_) => "invalid_input",
            RagError::NotFound { .. } => "not_found",
            RagError::Timeout(_) => "timeout",
        }
    }
}

/// Shorten an upstream response body for inclusion in an error message.
pub fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    if body.chars().count() <= MAX_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_CHARS).collect();
    out.push_str("...");
    out
}
