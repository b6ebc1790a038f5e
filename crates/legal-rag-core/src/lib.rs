//! # Legal RAG Core
//!
//! Runtime-independent logic of the legal-rag engine: data models, the
//! error taxonomy, chunking, the store and embedder abstractions, hybrid
//! retrieval, grounding prompts, citation extraction, and the ingestion
//! and answer pipelines.
//!
//! This crate contains no sqlx, HTTP client, or filesystem I/O. Concrete
//! backends (PostgreSQL, OpenAI/Ollama embedders, model providers) are
//! supplied by the `legal-rag` application crate through the [`store::Store`],
//! [`embedding::Embedder`], and [`llm::LanguageModel`] traits.

pub mod answer;
pub mod chunk;
pub mod citation;
pub mod cost;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod search;
pub mod store;
pub mod trigram;

pub use error::{RagError, Result};
