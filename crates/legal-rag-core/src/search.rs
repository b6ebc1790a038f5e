//! Hybrid (lexical + vector) retrieval over one knowledge node.
//!
//! The retriever operates entirely through the [`Store`] and [`Embedder`]
//! traits, which the caller injects.
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Embed the query once.
//! 2. Concurrently fetch up to `top_k` lexical candidates (trigram
//!    similarity) and up to `top_k` vector candidates (`1 - cosine
//!    distance`), both scoped to the node.
//! 3. Union by chunk id; a chunk missing from one set scores `0` there.
//! 4. Fuse: `score = α × vector + (1 - α) × lexical`.
//! 5. Group by chunk id (MAX of each component).
//! 6. Sort by score (desc), chunk id (asc); truncate to `return_k`.
//!
//! Both component scores already live in `[0, 1]`, so no normalization is
//! applied: a lexical-only hit keeps exactly `(1 - α) × lexical`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::RetrievalResult;
use crate::store::{ChunkCandidate, Store};

/// Retrieval tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParams {
    /// Candidates kept per underlying search before fusion.
    pub top_k: usize,
    /// Maximum results returned after fusion.
    pub return_k: usize,
    /// Weight of the vector score: `fused = α·vector + (1-α)·lexical`.
    pub alpha: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 20,
            return_k: 5,
            alpha: 0.5,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RagError::InvalidInput(format!(
                "alpha must be in [0.0, 1.0], got {}",
                self.alpha
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidInput("topK must be >= 1".to_string()));
        }
        if self.return_k == 0 {
            return Err(RagError::InvalidInput("returnK must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Runs lexical and vector candidate searches against one node and fuses
/// their scores.
#[derive(Clone)]
pub struct HybridRetriever {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Retrieve the best chunks of `node_id` for `query`.
    ///
    /// An empty list is a normal outcome meaning "no relevant material".
    /// A whitespace-only query returns an empty list without any call.
    pub async fn retrieve(
        &self,
        node_id: &str,
        query: &str,
        params: &RetrievalParams,
    ) -> Result<Vec<RetrievalResult>> {
        params.validate()?;

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // The vector search depends on this; the lexical one does not, but
        // both are issued together once it is ready.
        let query_vec = self.embedder.embed_single(query).await?;

        let (lexical, vector) = try_join(
            self.store.lexical_search(node_id, query, params.top_k),
            self.store.vector_search(node_id, &query_vec, params.top_k),
        )
        .await?;

        tracing::debug!(
            node_id,
            lexical_candidates = lexical.len(),
            vector_candidates = vector.len(),
            "hybrid candidates fetched"
        );

        Ok(fuse_candidates(lexical, vector, params))
    }
}

/// Per-chunk component scores accumulated during fusion.
struct Fused {
    candidate: ChunkCandidate,
    lexical: f64,
    vector: f64,
}

/// Merge lexical and vector candidates into a fused, ranked list.
pub fn fuse_candidates(
    mut lexical: Vec<ChunkCandidate>,
    mut vector: Vec<ChunkCandidate>,
    params: &RetrievalParams,
) -> Vec<RetrievalResult> {
    if lexical.is_empty() && vector.is_empty() {
        return Vec::new();
    }

    // Backends are asked for `top_k`, but the bound is part of the contract.
    lexical.truncate(params.top_k);
    vector.truncate(params.top_k);

    let mut by_chunk: HashMap<String, Fused> = HashMap::new();

    for c in lexical {
        let score = c.score;
        let entry = by_chunk.entry(c.chunk_id.clone()).or_insert_with(|| Fused {
            candidate: c,
            lexical: 0.0,
            vector: 0.0,
        });
        entry.lexical = entry.lexical.max(score);
    }
    for c in vector {
        let score = c.score;
        let entry = by_chunk.entry(c.chunk_id.clone()).or_insert_with(|| Fused {
            candidate: c,
            lexical: 0.0,
            vector: 0.0,
        });
        entry.vector = entry.vector.max(score);
    }

    let alpha = params.alpha;
    let mut results: Vec<RetrievalResult> = by_chunk
        .into_values()
        .map(|f| RetrievalResult {
            score: alpha * f.vector + (1.0 - alpha) * f.lexical,
            lexical_score: f.lexical,
            vector_score: f.vector,
            chunk_id: f.candidate.chunk_id,
            document_id: f.candidate.document_id,
            filename: f.candidate.filename,
            content: f.candidate.content,
            start_offset: f.candidate.start_offset,
            metadata: f.candidate.metadata,
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(params.return_k);
    results
}
