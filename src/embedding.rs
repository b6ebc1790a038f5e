//! HTTP embedding backends.
//!
//! Implementations of [`Embedder`]:
//! - **[`DisabledEmbedder`]**: every call fails; used when
//!   `embedding.provider = "disabled"`.
//! - **[`OpenAiEmbedder`]**: `POST {url}/embeddings` (default
//!   `https://api.openai.com/v1`), key from `OPENAI_API_KEY`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama
//!   (default `http://localhost:11434`).
//!
//! Batches larger than `embedding.batch_size` are split into sequential
//! sub-requests. Failed requests are not retried; retry policy belongs to
//! the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use legal_rag_core::embedding::Embedder;
use legal_rag_core::error::{truncate_body, RagError, Result};

use crate::config::EmbeddingConfig;

/// Build the embedder selected by `[embedding]`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(RagError::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))
}

fn required_model_and_dims(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config.model.clone().ok_or_else(|| {
        RagError::Configuration(format!("embedding.model required for {}", config.provider))
    })?;
    let dims = config.dims.filter(|d| *d > 0).ok_or_else(|| {
        RagError::Configuration(format!("embedding.dims required for {}", config.provider))
    })?;
    Ok((model, dims))
}

/// Send one JSON request and return the parsed body, or an embedding
/// error carrying the status and a truncated body.
async fn post_json(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .map_err(|e| RagError::Embedding(format!("{} request failed: {}", provider, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::Embedding(format!(
            "{} API error {}: {}",
            provider,
            status,
            truncate_body(&body)
        )));
    }

    response
        .json()
        .await
        .map_err(|e| RagError::Embedding(format!("{} returned invalid JSON: {}", provider, e)))
}

fn parse_vector(value: &serde_json::Value, provider: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| RagError::Embedding(format!("invalid {} response: embedding is not an array", provider)))?
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                RagError::Embedding(format!("invalid {} response: non-numeric component", provider))
            })
        })
        .collect()
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn request_embeddings(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Configuration(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ))
    }
}

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config)?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model,
            dims,
            batch_size: config.batch_size.max(1),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let request = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body);
            let json = post_json(request, "OpenAI").await?;
            out.extend(parse_openai_response(&json)?);
        }

        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
pub fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            RagError::Embedding("invalid OpenAI response: missing data array".to_string())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item.get("embedding").ok_or_else(|| {
            RagError::Embedding("invalid OpenAI response: missing embedding".to_string())
        })?;
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config)?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            dims,
            batch_size: config.batch_size.max(1),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = post_json(self.client.post(&url).json(&body), "Ollama").await?;
            out.extend(parse_ollama_response(&json)?);
        }

        Ok(out)
    }
}

/// Extract the `embeddings` array of an `/api/embed` response.
pub fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::Embedding("invalid Ollama response: missing embeddings array".to_string())
        })?
        .iter()
        .map(|v| parse_vector(v, "Ollama"))
        .collect()
}
