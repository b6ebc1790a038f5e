//! Per-model token pricing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::TokenUsage;

/// USD price per million tokens of each class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// `(provider, model)` → pricing. Unknown models cost nothing.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    rates: HashMap<(String, String), ModelPricing>,
}

impl PricingTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Published list prices for the models the platform ships with.
    pub fn with_defaults() -> Self {
        let mut t = Self::empty();
        t.insert("openai", "gpt-4o-mini", 0.15, 0.60);
        t.insert("openai", "gpt-4o", 2.50, 10.00);
        t.insert("openai", "gpt-4.1-mini", 0.40, 1.60);
        t.insert("anthropic", "claude-3-5-haiku-latest", 0.80, 4.00);
        t.insert("anthropic", "claude-3-5-sonnet-latest", 3.00, 15.00);
        t
    }

    pub fn insert(&mut self, provider: &str, model: &str, input_per_million: f64, output_per_million: f64) {
        self.rates.insert(
            (provider.to_string(), model.to_string()),
            ModelPricing {
                input_per_million,
                output_per_million,
            },
        );
    }

    pub fn get(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        self.rates
            .get(&(provider.to_string(), model.to_string()))
            .copied()
    }

    pub fn cost(&self, provider: &str, model: &str, usage: &TokenUsage) -> f64 {
        match self.get(provider, model) {
            Some(p) => p.cost(usage),
            None => {
                tracing::debug!(provider, model, "no pricing entry, cost reported as 0");
                0.0
            }
        }
    }
}
