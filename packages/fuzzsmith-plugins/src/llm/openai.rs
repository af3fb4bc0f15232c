//! OpenAI-compatible chat-completions provider.
//!
//! Options (from the provider environment): OPENAI_API_KEY, OPENAI_MODEL,
//! OPENAI_BASE_URL (for compatible endpoints).

use anyhow::anyhow;
use serde_json::json;
use std::collections::HashMap;

use fuzzsmith_core::error::{CoreError, Result};
use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

use super::{agent, option, HEALTH_TIMEOUT, REQUEST_TIMEOUT};

const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.2;

pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        Self {
            api_key: option(options, &["OPENAI_API_KEY", "api_key"]).unwrap_or_default(),
            model: option(options, &["OPENAI_MODEL", "model"])
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: option(options, &["OPENAI_BASE_URL", "base_url"])
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn request(&self, prompt: &str, options: &LlmOptions, timeout: std::time::Duration) -> Result<String> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });

        let response: serde_json::Value = agent(timeout)
            .post(&format!("{}/chat/completions", self.base_url))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| CoreError::Other(anyhow!("OpenAI request failed: {e}")))?
            .into_json()
            .map_err(|e| CoreError::Other(anyhow!("OpenAI returned invalid JSON: {e}")))?;

        Ok(response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
