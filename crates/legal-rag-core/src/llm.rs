//! Language-model capability and provider registry.
//!
//! Every provider adapter exposes one capability, [`LanguageModel::generate`],
//! and owns its own request/response translation. The HTTP adapters live
//! in the `legal-rag` app crate; tests inject doubles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::TokenUsage;

/// One non-streaming generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text produced by a model plus its token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used for registry lookup and pricing (e.g. `"openai"`).
    fn provider(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

/// Provider name → model adapter.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    providers: HashMap<String, Arc<dyn LanguageModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own provider name, replacing any
    /// previous one.
    pub fn register(&mut self, model: Arc<dyn LanguageModel>) {
        self.providers.insert(model.provider().to_string(), model);
    }

    pub fn with(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.register(model);
        self
    }

    pub fn resolve(&self, provider: &str) -> Result<Arc<dyn LanguageModel>> {
        self.providers.get(provider).cloned().ok_or_else(|| {
            RagError::Configuration(format!("unsupported model provider: {}", provider))
        })
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl LanguageModel for Echo {
        fn provider(&self) -> &str {
            self.0
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
            Ok(Generation {
                text: request.user_prompt.clone(),
                usage: TokenUsage::new(1, 1),
            })
        }
    }

    #[tokio::test]
    async fn test_resolve_registered_provider() {
        let registry = ModelRegistry::new()
            .with(Arc::new(Echo("openai")))
            .with(Arc::new(Echo("anthropic")));
        assert_eq!(registry.providers(), vec!["anthropic", "openai"]);

        let model = registry.resolve("openai").unwrap();
        let out = model
            .generate(&GenerationRequest {
                system_prompt: String::new(),
                user_prompt: "ciao".to_string(),
                model: "m".to_string(),
                temperature: 0.1,
                max_tokens: 16,
            })
            .await
            .unwrap();
        assert_eq!(out.text, "ciao");
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let registry = ModelRegistry::new();
        let err = registry.resolve("mistral").err().unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
