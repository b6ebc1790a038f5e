//! Wiring of concrete backends into the core pipelines.
//!
//! [`App`] is what the CLI commands and the HTTP server share: one store,
//! one embedder, the model registry, and the pipelines built on them.

use std::sync::Arc;

use anyhow::Result;

use legal_rag_core::answer::{AnswerEngine, AnswerOptions, AnswerResponse};
use legal_rag_core::embedding::Embedder;
use legal_rag_core::error::RagError;
use legal_rag_core::ingest::Ingestor;
use legal_rag_core::llm::ModelRegistry;
use legal_rag_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::build_registry;
use crate::pg_store::PgStore;

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub engine: AnswerEngine,
    pub ingestor: Ingestor,
}

impl App {
    /// Connect to PostgreSQL and build the configured providers.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        let models = build_registry(&config.llm)?;
        Ok(Self::from_parts(config.clone(), store, embedder, models))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        models: ModelRegistry,
    ) -> Self {
        let engine = AnswerEngine::new(
            store.clone(),
            embedder.clone(),
            models,
            config.pricing_table(),
        );
        let ingestor = Ingestor::new(store.clone(), embedder);
        Self {
            config: Arc::new(config),
            store,
            engine,
            ingestor,
        }
    }

    /// Answer under the `llm.timeout_secs` wall-clock cap.
    ///
    /// On timeout the in-flight future is dropped, which cancels any
    /// outstanding HTTP call.
    pub async fn answer(
        &self,
        node_ids: &[String],
        question: &str,
        options: &AnswerOptions,
    ) -> legal_rag_core::Result<AnswerResponse> {
        let cap = self.config.llm.answer_timeout();
        match tokio::time::timeout(cap, self.engine.answer_nodes(node_ids, question, options)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout_secs = cap.as_secs(), "answer timed out");
                Err(RagError::Timeout(cap))
            }
        }
    }
}
