//! # legal-rag
//!
//! Retrieval-augmented answers over the documents of a legal knowledge base,
//! grounded in the retrieved text and returned with citations.
//!
//! The domain logic (chunking, hybrid retrieval, prompts, citations, answer
//! orchestration) lives in [`legal_rag_core`]. This crate wires it to
//! PostgreSQL with pgvector and pg_trgm, HTTP embedding and chat providers,
//! a CLI, and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │   Ingest    │──▶│ Chunk+Embed │──▶│    PostgreSQL    │
//! │  CLI/HTTP   │   │             │   │ pg_trgm+pgvector │
//! └─────────────┘   └─────────────┘   └────────┬─────────┘
//!                                              │
//!                 ┌──────────────────┐         │
//!                 │ Hybrid retrieval │◀────────┘
//!                 └────────┬─────────┘
//!                          ▼
//!                 ┌──────────────────┐   ┌──────────┐
//!                 │ Prompt + LLM     │──▶│ Citations│
//!                 └──────────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Connection pool |
//! | [`migrate`] | Schema creation |
//! | [`pg_store`] | PostgreSQL storage gateway |
//! | [`embedding`] | Embedding provider clients |
//! | [`llm`] | Chat model provider clients |
//! | [`app`] | Shared engine handle for the CLI and server |
//! | [`nodes`] | Knowledge node commands |
//! | [`ingest`] | Document ingestion command |
//! | [`embed_cmd`] | Embedding backfill command |
//! | [`ask`] | Question answering command |
//! | [`server`] | HTTP server |

pub mod app;
pub mod ask;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod nodes;
pub mod pg_store;
pub mod server;
