//! HTTP language-model providers.
//!
//! The provider set is closed: [`ProviderClient::ChatCompletions`] speaks
//! the OpenAI `/chat/completions` protocol and [`ProviderClient::Messages`]
//! speaks the Anthropic `/messages` protocol. Each variant owns its request
//! and response translation behind [`LanguageModel::generate`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use legal_rag_core::error::{truncate_body, RagError, Result};
use legal_rag_core::llm::{Generation, GenerationRequest, LanguageModel, ModelRegistry};
use legal_rag_core::models::TokenUsage;

use crate::config::{LlmConfig, ProviderEndpoint};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection details shared by both protocols.
pub struct Endpoint {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key_env: &'static str,
    api_key: Option<String>,
}

impl Endpoint {
    pub fn new(
        name: &str,
        config: &ProviderEndpoint,
        api_key_env: &'static str,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            name: name.to_string(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_env,
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RagError::Configuration(format!("{} environment variable not set", self.api_key_env))
        })
    }
}

pub enum ProviderClient {
    ChatCompletions(Endpoint),
    Messages(Endpoint),
}

impl ProviderClient {
    fn endpoint(&self) -> &Endpoint {
        match self {
            ProviderClient::ChatCompletions(e) | ProviderClient::Messages(e) => e,
        }
    }
}

/// Registry with the `openai` and `anthropic` providers.
///
/// Keys are read from the environment here; a missing key only fails the
/// calls that need it.
pub fn build_registry(config: &LlmConfig) -> Result<ModelRegistry> {
    let openai = Endpoint::new(
        "openai",
        &config.openai,
        "OPENAI_API_KEY",
        std::env::var("OPENAI_API_KEY").ok(),
    )?;
    let anthropic = Endpoint::new(
        "anthropic",
        &config.anthropic,
        "ANTHROPIC_API_KEY",
        std::env::var("ANTHROPIC_API_KEY").ok(),
    )?;

    Ok(ModelRegistry::new()
        .with(Arc::new(ProviderClient::ChatCompletions(openai)))
        .with(Arc::new(ProviderClient::Messages(anthropic))))
}

#[async_trait]
impl LanguageModel for ProviderClient {
    fn provider(&self) -> &str {
        &self.endpoint().name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let endpoint = self.endpoint();
        let api_key = endpoint.api_key()?;

        let builder = match self {
            ProviderClient::ChatCompletions(e) => e
                .client
                .post(format!("{}/chat/completions", e.base_url))
                .bearer_auth(api_key)
                .json(&chat_completions_body(request)),
            ProviderClient::Messages(e) => e
                .client
                .post(format!("{}/messages", e.base_url))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&messages_body(request)),
        };

        let response = builder.send().await.map_err(|e| {
            RagError::ModelCall(format!("{} request failed: {}", endpoint.name, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if status.as_u16() == 429 {
                "rate limited"
            } else {
                "API error"
            };
            return Err(RagError::ModelCall(format!(
                "{} {} {}: {}",
                endpoint.name,
                reason,
                status,
                truncate_body(&body)
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::ModelCall(format!("{} returned invalid JSON: {}", endpoint.name, e))
        })?;

        match self {
            ProviderClient::ChatCompletions(_) => parse_chat_completion(&json),
            ProviderClient::Messages(_) => parse_messages(&json),
        }
    }
}

pub fn chat_completions_body(request: &GenerationRequest) -> serde_json::Value {
    json!({
        "model": request.model,
        "messages": [
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": request.user_prompt},
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

pub fn messages_body(request: &GenerationRequest) -> serde_json::Value {
    json!({
        "model": request.model,
        "system": request.system_prompt,
        "messages": [
            {"role": "user", "content": request.user_prompt},
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

fn token_count(json: &serde_json::Value, key: &str) -> u32 {
    json.get("usage")
        .and_then(|u| u.get(key))
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// `choices[0].message.content` plus `usage.{prompt,completion}_tokens`.
pub fn parse_chat_completion(json: &serde_json::Value) -> Result<Generation> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            RagError::ModelCall("malformed chat completion: missing choices[0].message.content".to_string())
        })?;

    Ok(Generation {
        text: text.to_string(),
        usage: TokenUsage::new(
            token_count(json, "prompt_tokens"),
            token_count(json, "completion_tokens"),
        ),
    })
}

/// Concatenated `text` blocks of `content[]` plus
/// `usage.{input,output}_tokens`.
pub fn parse_messages(json: &serde_json::Value) -> Result<Generation> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| RagError::ModelCall("malformed messages response: missing content".to_string()))?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(RagError::ModelCall(
            "malformed messages response: no text content".to_string(),
        ));
    }

    Ok(Generation {
        text,
        usage: TokenUsage::new(
            token_count(json, "input_tokens"),
            token_count(json, "output_tokens"),
        ),
    })
}
