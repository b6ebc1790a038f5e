//! `lrag ask`: answer a question against a knowledge node from the
//! command line.

use anyhow::Result;

use legal_rag_core::answer::{AnswerOptions, AnswerResponse};

use crate::app::App;
use crate::config::Config;
use crate::nodes::resolve_node;

/// Command-line overrides of the configured answer defaults.
#[derive(Debug, Clone, Default)]
pub struct AskOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_k: Option<usize>,
    pub return_k: Option<usize>,
    pub alpha: Option<f64>,
}

impl AskOverrides {
    pub fn apply(self, mut options: AnswerOptions) -> AnswerOptions {
        if let Some(v) = self.provider {
            options.provider = v;
        }
        if let Some(v) = self.model {
            options.model = v;
        }
        if let Some(v) = self.temperature {
            options.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            options.max_tokens = v;
        }
        if let Some(v) = self.top_k {
            options.top_k = v;
        }
        if let Some(v) = self.return_k {
            options.return_k = v;
        }
        if let Some(v) = self.alpha {
            options.alpha = v;
        }
        options
    }
}

pub async fn run_ask(
    config: &Config,
    node: &str,
    question: &str,
    overrides: AskOverrides,
    json: bool,
) -> Result<()> {
    let app = App::connect(config).await?;
    let node = resolve_node(app.store.as_ref(), node).await?;
    let options = overrides.apply(config.answer_defaults());

    let response = app.answer(&[node.id], question, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &AnswerResponse) {
    println!("{}", response.answer);

    if !response.citations.is_empty() {
        println!();
        println!("Fonti:");
        for (i, c) in response.citations.iter().enumerate() {
            match c.page {
                Some(page) => println!("  {}. {} (pag. {})", i + 1, c.filename, page),
                None => println!("  {}. {}", i + 1, c.filename),
            }
        }
    }

    println!();
    println!(
        "tokens: {} prompt + {} completion | cost: ${:.6} | {} ms (retrieval {} ms, model {} ms)",
        response.usage.prompt_tokens,
        response.usage.completion_tokens,
        response.cost,
        response.telemetry.total_ms,
        response.telemetry.retrieval_ms,
        response.telemetry.model_call_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_only_given_fields() {
        let base = AnswerOptions::default();
        let out = AskOverrides {
            provider: Some("anthropic".to_string()),
            alpha: Some(0.8),
            ..Default::default()
        }
        .apply(base.clone());

        assert_eq!(out.provider, "anthropic");
        assert_eq!(out.alpha, 0.8);
        assert_eq!(out.model, base.model);
        assert_eq!(out.top_k, base.top_k);
    }
}
