//! Anthropic Messages API provider.
//!
//! Options: ANTHROPIC_API_KEY, ANTHROPIC_MODEL.

use anyhow::anyhow;
use serde_json::json;
use std::collections::HashMap;

use fuzzsmith_core::error::{CoreError, Result};
use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

use super::{agent, option, HEALTH_TIMEOUT, REQUEST_TIMEOUT};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.2;

pub struct AnthropicProvider {
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        Self {
            api_key: option(options, &["ANTHROPIC_API_KEY", "api_key"]).unwrap_or_default(),
            model: option(options, &["ANTHROPIC_MODEL", "model"])
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn request(
        &self,
        prompt: &str,
        options: &LlmOptions,
        timeout: std::time::Duration,
    ) -> Result<String> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "messages": [{"role": "user", "content": prompt}],
        });

        let response: serde_json::Value = agent(timeout)
            .post(API_URL)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", API_VERSION)
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| CoreError::Other(anyhow!("Anthropic request failed: {e}")))?
            .into_json()
            .map_err(|e| CoreError::Other(anyhow!("Anthropic returned invalid JSON: {e}")))?;

        // Content blocks can be text or other types; join the text ones.
        let parts: Vec<&str> = response["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect()
            })
            .unwrap_or_default();
        Ok(parts.join("\n").trim().to_string())
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<String> {
        self.request(prompt, options, REQUEST_TIMEOUT)
    }

    fn check_health(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        let probe = LlmOptions {
            max_tokens: Some(5),
            ..Default::default()
        };
        self.request("Hi", &probe, HEALTH_TIMEOUT).is_ok()
    }
}
