//! Health checks for the external collaborators: CodeQL CLI, the configured
//! LLM provider, and the configured fuzzer engine's toolchain.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::config::ConfigManager;
use crate::process::run_checked;
use crate::registry::ComponentRegistry;
use crate::schema::HealthCheckResult;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthChecker<'a> {
    config: &'a ConfigManager,
    registry: &'a ComponentRegistry,
}

impl<'a> HealthChecker<'a> {
    pub fn new(config: &'a ConfigManager, registry: &'a ComponentRegistry) -> Self {
        Self { config, registry }
    }

    /// Check that the CodeQL CLI is available and reports a version.
    pub fn check_codeql(&self) -> HealthCheckResult {
        let bin = self.config.config().codeql_bin();
        if self.config.config().codeql_home.is_some() && !Path::new(&bin).exists() {
            return HealthCheckResult {
                name: "codeql".to_string(),
                ok: false,
                message: format!("CODEQL_HOME set but codeql binary not found: {bin}"),
            };
        }
        let mut cmd = Command::new(&bin);
        cmd.args(["version", "--quiet"]);
        let (ok, out) = run_checked(&mut cmd, CHECK_TIMEOUT);
        if ok {
            HealthCheckResult {
                name: "codeql".to_string(),
                ok: true,
                message: if out.is_empty() { "OK".to_string() } else { out },
            }
        } else {
            HealthCheckResult {
                name: "codeql".to_string(),
                ok: false,
                message: format!(
                    "{out}. Install the CodeQL CLI bundle or set CODEQL_HOME."
                ),
            }
        }
    }

    /// Check the configured LLM provider is registered and reachable.
    pub fn check_llm(&self) -> HealthCheckResult {
        let provider_name = &self.config.config().llm_provider;
        let avail = self.registry.list_available();
        if !avail.llm_providers.iter().any(|n| n == provider_name) {
            return HealthCheckResult {
                name: "llm".to_string(),
                ok: false,
                message: format!(
                    "No LLM provider '{provider_name}' registered. Registered: {}",
                    join_or_none(&avail.llm_providers)
                ),
            };
        }
        match self.registry.get_llm(provider_name, self.config.env()) {
            Ok(provider) => {
                if provider.check_health() {
                    HealthCheckResult {
                        name: "llm".to_string(),
                        ok: true,
                        message: format!("{provider_name} OK"),
                    }
                } else {
                    HealthCheckResult {
                        name: "llm".to_string(),
                        ok: false,
                        message: format!("{provider_name} health check failed"),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                name: "llm".to_string(),
                ok: false,
                message: e.to_string(),
            },
        }
    }

    /// Check the configured fuzzer engine is registered and its toolchain
    /// requirements are met (clang for libFuzzer).
    pub fn check_fuzzer(&self) -> HealthCheckResult {
        let engine_name = &self.config.config().fuzzer_engine;
        let avail = self.registry.list_available();
        if !avail.fuzzer_engines.iter().any(|n| n == engine_name) {
            return HealthCheckResult {
                name: "fuzzer".to_string(),
                ok: false,
                message: format!("No fuzzer engine '{engine_name}' registered."),
            };
        }
        if engine_name == "libfuzzer" {
            let mut cmd = Command::new("clang");
            cmd.arg("--version");
            let (ok, _) = run_checked(&mut cmd, CHECK_TIMEOUT);
            return if ok {
                HealthCheckResult {
                    name: "fuzzer".to_string(),
                    ok: true,
                    message: "clang found".to_string(),
                }
            } else {
                HealthCheckResult {
                    name: "fuzzer".to_string(),
                    ok: false,
                    message: "clang not found. libFuzzer requires clang; install LLVM."
                        .to_string(),
                }
            };
        }
        HealthCheckResult {
            name: "fuzzer".to_string(),
            ok: true,
            message: format!("{engine_name} registered"),
        }
    }

    pub fn check_all(&self, skip_llm: bool, skip_fuzzer: bool) -> Vec<HealthCheckResult> {
        let mut results = vec![self.check_codeql()];
        if !skip_llm {
            results.push(self.check_llm());
        }
        if !skip_fuzzer {
            results.push(self.check_fuzzer());
        }
        results
    }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_check_llm_reports_unregistered_provider() {
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let registry = ComponentRegistry::new();
        let checker = HealthChecker::new(&mgr, &registry);
        let result = checker.check_llm();
        assert!(!result.ok);
        assert!(result.message.contains("openai"));
        assert!(result.message.contains("(none)"));
    }

    #[test]
    fn test_check_fuzzer_unregistered_engine() {
        let mut env = HashMap::new();
        env.insert("FUZZSMITH_FUZZER_ENGINE".to_string(), "aflpp".to_string());
        let mgr = ConfigManager::from_sources(None, env);
        let registry = ComponentRegistry::new();
        let checker = HealthChecker::new(&mgr, &registry);
        let result = checker.check_fuzzer();
        assert!(!result.ok);
        assert!(result.message.contains("aflpp"));
    }

    #[test]
    fn test_check_all_respects_skips() {
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let registry = ComponentRegistry::new();
        let checker = HealthChecker::new(&mgr, &registry);
        let results = checker.check_all(true, true);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "codeql");
    }
}
