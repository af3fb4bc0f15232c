//! Ollama provider (local inference server, no API key).
//!
//! Options: OLLAMA_MODEL, OLLAMA_BASE_URL.

use anyhow::anyhow;
use serde_json::json;
use std::collections::HashMap;

use fuzzsmith_core::error::{CoreError, Result};
use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

use super::{agent, option, HEALTH_TIMEOUT, REQUEST_TIMEOUT};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.2;

pub struct OllamaProvider {
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        Self {
            model: option(options, &["OLLAMA_MODEL", "model"])
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: option(options, &["OLLAMA_BASE_URL", "base_url"])
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<String> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                "num_predict": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            },
        });

        let response: serde_json::Value = agent(REQUEST_TIMEOUT)
            .post(&format!("{}/api/generate", self.base_url))
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| CoreError::Other(anyhow!("Ollama request failed: {e}")))?
            .into_json()
            .map_err(|e| CoreError::Other(anyhow!("Ollama returned invalid JSON: {e}")))?;

        Ok(response["response"].as_str().unwrap_or_default().trim().to_string())
    }

    fn check_health(&self) -> bool {
        agent(HEALTH_TIMEOUT)
            .get(&format!("{}/api/tags", self.base_url))
            .call()
            .map(|resp| resp.status() == 200)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let provider = OllamaProvider::from_options(&HashMap::new());
        assert_eq!(provider.model, "llama3");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_model_override() {
        let mut options = HashMap::new();
        options.insert("OLLAMA_MODEL".to_string(), "codellama".to_string());
        let provider = OllamaProvider::from_options(&options);
        assert_eq!(provider.model, "codellama");
    }
}
