//! Answer orchestration: retrieve, prompt, generate, cite.
//!
//! ```text
//! Retrieving ──► EmptyResult ─────────────────────────────────► (done)
//!     │
//!     └────────► Prompting ─► Generating ─► ExtractingCitations ─► Done
//!
//! any stage ──► Failed
//! ```
//!
//! When retrieval finds nothing the model is never called: the caller gets
//! the fixed no-information answer with zero usage and zero cost.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::citation::{extract_citations, CitationWarning};
use crate::cost::PricingTable;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::llm::{GenerationRequest, ModelRegistry};
use crate::models::{Citation, RetrievalResult, TokenUsage};
use crate::prompt::{build_system_prompt, build_user_prompt, NO_INFORMATION_ANSWER};
use crate::search::{HybridRetriever, RetrievalParams};
use crate::store::Store;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Per-request options. JSON keys match the platform's query contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerOptions {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(rename = "topK")]
    pub top_k: usize,
    #[serde(rename = "returnK")]
    pub return_k: usize,
    pub alpha: f64,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        let retrieval = RetrievalParams::default();
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_k: retrieval.top_k,
            return_k: retrieval.return_k,
            alpha: retrieval.alpha,
        }
    }
}

impl AnswerOptions {
    pub fn retrieval(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            return_k: self.return_k,
            alpha: self.alpha,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(RagError::InvalidInput("provider is required".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(RagError::InvalidInput("model is required".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidInput(format!(
                "temperature must be in [0.0, 2.0], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(RagError::InvalidInput("max_tokens must be >= 1".to_string()));
        }
        self.retrieval().validate()
    }
}

/// Wall-clock timings of one answer, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub total_ms: u64,
    pub retrieval_ms: u64,
    pub model_call_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub contexts: Vec<RetrievalResult>,
    pub usage: TokenUsage,
    /// USD, from the pricing table.
    pub cost: f64,
    pub telemetry: Telemetry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CitationWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStage {
    Retrieving,
    EmptyResult,
    Prompting,
    Generating,
    ExtractingCitations,
    Done,
    Failed,
}

impl AnswerStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStage::Retrieving => "retrieving",
            AnswerStage::EmptyResult => "empty_result",
            AnswerStage::Prompting => "prompting",
            AnswerStage::Generating => "generating",
            AnswerStage::ExtractingCitations => "extracting_citations",
            AnswerStage::Done => "done",
            AnswerStage::Failed => "failed",
        }
    }
}

fn enter(stage: AnswerStage, node_id: &str) {
    tracing::debug!(stage = stage.as_str(), node_id, "answer stage");
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Answers questions against one knowledge node.
#[derive(Clone)]
pub struct AnswerEngine {
    store: Arc<dyn Store>,
    retriever: HybridRetriever,
    models: ModelRegistry,
    pricing: PricingTable,
}

impl AnswerEngine {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        models: ModelRegistry,
        pricing: PricingTable,
    ) -> Self {
        Self {
            retriever: HybridRetriever::new(store.clone(), embedder),
            store,
            models,
            pricing,
        }
    }

    /// Answer `question` using the first node of `node_ids`.
    ///
    /// Ranking across several nodes is not supported; extra ids are logged
    /// and ignored.
    pub async fn answer_nodes(
        &self,
        node_ids: &[String],
        question: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerResponse> {
        let Some(first) = node_ids.first() else {
            return Err(RagError::InvalidInput(
                "at least one node id is required".to_string(),
            ));
        };
        if node_ids.len() > 1 {
            tracing::warn!(
                honored = %first,
                ignored = node_ids.len() - 1,
                "multiple nodes requested, only the first is queried"
            );
        }
        self.answer(first, question, options).await
    }

    pub async fn answer(
        &self,
        node_id: &str,
        question: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerResponse> {
        match self.run(node_id, question, options).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(
                    stage = AnswerStage::Failed.as_str(),
                    node_id,
                    kind = e.kind(),
                    error = %e,
                    "answer failed"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        node_id: &str,
        question: &str,
        options: &AnswerOptions,
    ) -> Result<AnswerResponse> {
        let started = Instant::now();

        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question is empty".to_string()));
        }
        options.validate()?;
        if self.store.get_node(node_id).await?.is_none() {
            return Err(RagError::NotFound {
                kind: "node",
                id: node_id.to_string(),
            });
        }

        enter(AnswerStage::Retrieving, node_id);
        let retrieval_started = Instant::now();
        let contexts = self
            .retriever
            .retrieve(node_id, question, &options.retrieval())
            .await?;
        let retrieval_ms = elapsed_ms(retrieval_started);

        if contexts.is_empty() {
            enter(AnswerStage::EmptyResult, node_id);
            return Ok(AnswerResponse {
                answer: NO_INFORMATION_ANSWER.to_string(),
                citations: Vec::new(),
                contexts,
                usage: TokenUsage::default(),
                cost: 0.0,
                telemetry: Telemetry {
                    total_ms: elapsed_ms(started),
                    retrieval_ms,
                    model_call_ms: 0,
                },
                warnings: Vec::new(),
            });
        }

        enter(AnswerStage::Prompting, node_id);
        let request = GenerationRequest {
            system_prompt: build_system_prompt().to_string(),
            user_prompt: build_user_prompt(question, &contexts),
            model: options.model.clone(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        enter(AnswerStage::Generating, node_id);
        let model = self.models.resolve(&options.provider)?;
        let model_started = Instant::now();
        let generation = model.generate(&request).await?;
        let model_call_ms = elapsed_ms(model_started);
        let cost = self
            .pricing
            .cost(&options.provider, &options.model, &generation.usage);

        enter(AnswerStage::ExtractingCitations, node_id);
        let extraction = extract_citations(&generation.text, &contexts);

        enter(AnswerStage::Done, node_id);
        let telemetry = Telemetry {
            total_ms: elapsed_ms(started),
            retrieval_ms,
            model_call_ms,
        };
        tracing::info!(
            node_id,
            provider = %options.provider,
            model = %options.model,
            contexts = contexts.len(),
            citations = extraction.citations.len(),
            prompt_tokens = generation.usage.prompt_tokens,
            completion_tokens = generation.usage.completion_tokens,
            cost,
            total_ms = telemetry.total_ms,
            "answer generated"
        );

        Ok(AnswerResponse {
            answer: generation.text,
            citations: extraction.citations,
            contexts,
            usage: generation.usage,
            cost,
            telemetry,
            warnings: extraction.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let o = AnswerOptions::default();
        assert_eq!(o.provider, "openai");
        assert_eq!(o.temperature, 0.1);
        assert_eq!(o.max_tokens, 1024);
        assert_eq!(o.retrieval(), RetrievalParams::default());
        assert!(o.validate().is_ok());
    }

    #[test]
    fn test_options_json_keys() {
        let o: AnswerOptions = serde_json::from_str(
            r#"{"provider":"anthropic","max_tokens":256,"topK":8,"returnK":3,"alpha":0.2}"#,
        )
        .unwrap();
        assert_eq!(o.provider, "anthropic");
        assert_eq!(o.max_tokens, 256);
        assert_eq!(o.top_k, 8);
        assert_eq!(o.return_k, 3);
        assert_eq!(o.alpha, 0.2);
        assert_eq!(o.model, DEFAULT_MODEL);

        let v = serde_json::to_value(&o).unwrap();
        assert!(v.get("topK").is_some());
        assert!(v.get("returnK").is_some());
        assert!(v.get("max_tokens").is_some());
    }

    #[test]
    fn test_options_validation() {
        let o = AnswerOptions {
            temperature: 3.0,
            ..Default::default()
        };
        assert!(matches!(o.validate(), Err(RagError::InvalidInput(_))));
        let o = AnswerOptions {
            alpha: 2.0,
            ..Default::default()
        };
        assert!(o.validate().is_err());
        let o = AnswerOptions {
            provider: " ".to_string(),
            ..Default::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let r = AnswerResponse {
            answer: "x".to_string(),
            citations: vec![],
            contexts: vec![],
            usage: TokenUsage::default(),
            cost: 0.0,
            telemetry: Telemetry::default(),
            warnings: vec![],
        };
        let v = serde_json::to_value(&r).unwrap();
        assert!(v["telemetry"].get("modelCallMs").is_some());
        assert!(v["usage"].get("promptTokens").is_some());
        assert!(v.get("warnings").is_none());
    }
}
