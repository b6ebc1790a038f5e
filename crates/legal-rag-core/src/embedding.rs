//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for similarity computation and the pgvector text
//! literal encoding.
//!
//! Concrete HTTP embedders (OpenAI, Ollama) live in the `legal-rag` app
//! crate.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Trait for embedding backends.
///
/// Implementors provide [`request_embeddings`](Embedder::request_embeddings),
/// the raw provider call. Callers use [`embed`](Embedder::embed) and
/// [`embed_single`](Embedder::embed_single), which add the empty-input
/// short-circuit and validate the response shape.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Perform the provider call for a non-empty batch.
    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a batch of texts, preserving input order.
    ///
    /// Empty input returns an empty result without calling the provider.
    /// A response with the wrong number of vectors, or any vector whose
    /// length differs from [`dims`](Embedder::dims), is an
    /// [`RagError::Embedding`].
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.request_embeddings(texts).await?;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors from {}, got {}",
                texts.len(),
                self.model_name(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims()) {
            return Err(RagError::Embedding(format!(
                "model {} returned a {}-dimensional vector, expected {}",
                self.model_name(),
                bad.len(),
                self.dims()
            )));
        }

        Ok(vectors)
    }

    /// Embed one text (e.g. a query).
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a vector as a pgvector text literal, e.g. `[0.5,-1,2.25]`.
///
/// Most SQL drivers have no native vector bind type, so vectors are bound
/// as text and cast with `::vector`. Non-finite components are rejected
/// because pgvector cannot store them.
///
/// ```rust
/// use legal_rag_core::embedding::to_vector_literal;
///
/// assert_eq!(to_vector_literal(&[0.5, -1.0, 2.25]).unwrap(), "[0.5,-1,2.25]");
/// ```
pub fn to_vector_literal(vector: &[f32]) -> Result<String> {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if !v.is_finite() {
            return Err(RagError::Embedding(format!(
                "vector component {} is not finite",
                i
            )));
        }
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    Ok(out)
}

/// Decode a pgvector text literal back into a vector.
pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| RagError::Embedding(format!("malformed vector literal: {}", literal)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| RagError::Embedding(format!("bad vector component '{}': {}", part, e)))
        })
        .collect()
}
