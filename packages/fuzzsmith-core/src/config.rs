//! Layered application configuration: defaults, then YAML file, then
//! environment variables (env wins).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default stage order for a full pipeline run.
pub const DEFAULT_STAGES: [&str; 7] = [
    "build",
    "analyze",
    "generate",
    "fuzz_build",
    "compile",
    "fuzz",
    "report",
];

/// Environment variable prefixes forwarded to component factories
/// (API keys, base URLs, model overrides).
const PROVIDER_ENV_PREFIXES: [&str; 4] = ["OPENAI_", "OLLAMA_", "ANTHROPIC_", "CODEQL_"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfigModel {
    pub stages: Vec<String>,
    pub skip_stages: Vec<String>,
    pub stop_on_failure: bool,
}

impl Default for PipelineConfigModel {
    fn default() -> Self {
        Self {
            stages: DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            skip_stages: Vec::new(),
            stop_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_retries: 3,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzerConfig {
    pub timeout: u64,
    pub max_total_time: u64,
    pub fork: u32,
    pub rss_limit_mb: u64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            max_total_time: 300,
            fork: 1,
            rss_limit_mb: 2048,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm_provider: String,
    pub fuzzer_engine: String,
    pub language: String,
    pub reporters: Vec<String>,
    pub llm: LlmConfig,
    pub fuzzer: FuzzerConfig,
    pub pipeline: PipelineConfigModel,
    pub codeql_home: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_provider: "openai".to_string(),
            fuzzer_engine: "libfuzzer".to_string(),
            language: "cpp".to_string(),
            reporters: vec!["json".to_string(), "sarif".to_string()],
            llm: LlmConfig::default(),
            fuzzer: FuzzerConfig::default(),
            pipeline: PipelineConfigModel::default(),
            codeql_home: None,
        }
    }
}

impl AppConfig {
    /// Resolve the codeql binary path. A bundle install keeps the binary at
    /// the home root, other installs under bin/.
    pub fn codeql_bin(&self) -> String {
        if let Some(home) = &self.codeql_home {
            let home = PathBuf::from(home);
            for sub in ["codeql", "bin/codeql"] {
                let candidate = home.join(sub);
                if candidate.exists() {
                    return candidate.to_string_lossy().into_owned();
                }
            }
            return home.join("bin/codeql").to_string_lossy().into_owned();
        }
        "codeql".to_string()
    }
}

/// Loads and merges configuration from a YAML file and the environment.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    env: HashMap<String, String>,
}

impl ConfigManager {
    /// Load from an optional YAML path plus the process environment.
    pub fn load(config_path: Option<&Path>) -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(config_path, env)
    }

    /// Load with an explicit environment snapshot (testable seam).
    pub fn from_sources(config_path: Option<&Path>, env: HashMap<String, String>) -> Self {
        let yaml_text = config_path.and_then(|p| {
            if !p.exists() {
                return None;
            }
            match std::fs::read_to_string(p) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Failed to read config file {}: {}", p.display(), e);
                    None
                }
            }
        });

        let mut config = match yaml_text {
            Some(text) => match serde_yaml::from_str::<AppConfig>(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Malformed YAML config: {}", e);
                    AppConfig::default()
                }
            },
            None => AppConfig::default(),
        };

        // Environment variables override YAML values.
        if let Some(v) = non_empty(&env, "FUZZSMITH_LLM_PROVIDER") {
            config.llm_provider = v;
        }
        if let Some(v) = non_empty(&env, "FUZZSMITH_FUZZER_ENGINE") {
            config.fuzzer_engine = v;
        }
        if let Some(v) = non_empty(&env, "FUZZSMITH_LANGUAGE") {
            config.language = v;
        }
        if let Some(v) = non_empty(&env, "CODEQL_HOME") {
            config.codeql_home = Some(v);
        }

        let provider_env = env
            .into_iter()
            .filter(|(k, _)| PROVIDER_ENV_PREFIXES.iter().any(|p| k.starts_with(p)))
            .collect();

        Self {
            config,
            env: provider_env,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Whitelisted provider environment (API keys, endpoints, models),
    /// passed to component factories as constructor options.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

fn non_empty(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm_provider, "openai");
        assert_eq!(cfg.fuzzer_engine, "libfuzzer");
        assert_eq!(cfg.language, "cpp");
        assert_eq!(cfg.reporters, vec!["json", "sarif"]);
        assert_eq!(cfg.pipeline.stages, DEFAULT_STAGES.to_vec());
        assert!(cfg.pipeline.stop_on_failure);
    }

    #[test]
    fn test_env_overrides_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "llm_provider: ollama\nlanguage: c\n").unwrap();

        let mut env = HashMap::new();
        env.insert("FUZZSMITH_LLM_PROVIDER".to_string(), "anthropic".to_string());
        let mgr = ConfigManager::from_sources(Some(&path), env);

        assert_eq!(mgr.config().llm_provider, "anthropic");
        assert_eq!(mgr.config().language, "c");
    }

    #[test]
    fn test_malformed_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, ": not yaml [").unwrap();

        let mgr = ConfigManager::from_sources(Some(&path), HashMap::new());
        assert_eq!(mgr.config().llm_provider, "openai");
    }

    #[test]
    fn test_provider_env_is_whitelisted() {
        let mut env = HashMap::new();
        env.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        let mgr = ConfigManager::from_sources(None, env);

        assert_eq!(mgr.env().get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
        assert!(!mgr.env().contains_key("PATH"));
    }

    #[test]
    fn test_yaml_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "llm:\n  max_retries: 5\npipeline:\n  stop_on_failure: false\n")
            .unwrap();

        let mgr = ConfigManager::from_sources(Some(&path), HashMap::new());
        assert_eq!(mgr.config().llm.max_retries, 5);
        assert!(!mgr.config().pipeline.stop_on_failure);
        // Untouched sections keep their defaults.
        assert_eq!(mgr.config().fuzzer.rss_limit_mb, 2048);
    }
}
