//! Built-in LLM providers, all speaking plain HTTP through a blocking
//! agent to match the sequential pipeline model.

mod anthropic;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use std::collections::HashMap;
use std::time::Duration;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub(crate) const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .timeout_connect(Duration::from_secs(10))
        .build()
}

/// First non-empty option among the given keys.
pub(crate) fn option(options: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| options.get(*k))
        .find(|v| !v.is_empty())
        .cloned()
}
