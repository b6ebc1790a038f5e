//! Storage abstraction for legal-rag.
//!
//! The [`Store`] trait is the whole contract the engine has with its
//! persistence layer: node/document/chunk/embedding writes, plus the two
//! node-scoped candidate searches used by hybrid retrieval. Backends (the
//! PostgreSQL gateway in the app crate, [`memory::InMemoryStore`] here)
//! are injected as `Arc<dyn Store>`.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, Document, DocumentStatus, Embedding, KnowledgeNode};

/// A candidate chunk returned from lexical or vector search.
///
/// Carries everything needed to build a
/// [`RetrievalResult`](crate::models::RetrievalResult) without another
/// round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub content: String,
    pub start_offset: usize,
    pub metadata: Option<serde_json::Value>,
    /// Similarity in the backend's native scale: trigram similarity for
    /// lexical search, `1 - cosine distance` for vector search.
    pub score: f64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_node`](Store::create_node) | Create a knowledge node |
/// | [`delete_node`](Store::delete_node) | Delete a node and everything under it |
/// | [`insert_document`](Store::insert_document) | Record an uploaded document |
/// | [`set_document_status`](Store::set_document_status) | Track embedding progress |
/// | [`insert_chunks`](Store::insert_chunks) | Write a document's chunks in ordinal order |
/// | [`insert_embeddings`](Store::insert_embeddings) | Attach vectors to chunks |
/// | [`lexical_search`](Store::lexical_search) | Trigram similarity within a node |
/// | [`vector_search`](Store::vector_search) | Cosine similarity within a node |
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_node(&self, name: &str, description: Option<&str>) -> Result<KnowledgeNode>;

    async fn get_node(&self, id: &str) -> Result<Option<KnowledgeNode>>;

    async fn list_nodes(&self) -> Result<Vec<KnowledgeNode>>;

    /// Delete a node, cascading to its documents, chunks, and embeddings.
    ///
    /// Returns `false` if the node did not exist.
    async fn delete_node(&self, id: &str) -> Result<bool>;

    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Delete a document, cascading to its chunks and embeddings.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()>;

    /// Documents in the given status, oldest first.
    async fn documents_with_status(&self, status: DocumentStatus) -> Result<Vec<Document>>;

    /// Insert all chunks of one document in a single write, in the order
    /// given (which must be ordinal order).
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// All chunks of a document, by ascending index.
    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Store or replace vectors for chunks.
    async fn insert_embeddings(&self, embeddings: &[Embedding]) -> Result<()>;

    /// Top `limit` chunks of the node by trigram similarity to `query`.
    /// Chunks with zero similarity are not returned.
    async fn lexical_search(
        &self,
        node_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Top `limit` embedded chunks of the node by `1 - cosine distance`.
    async fn vector_search(
        &self,
        node_id: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>>;
}
