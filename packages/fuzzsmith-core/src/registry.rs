//! Central registry for all pluggable components.
//!
//! A name-to-factory map per component kind. Re-registering a name
//! overwrites the previous entry (last writer wins, so callers can override
//! built-ins) with a logged warning.

use std::collections::HashMap;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::traits::{FuzzerEngine, LanguageAnalyzer, LlmProvider, PipelineStage, Reporter};

type Options = HashMap<String, String>;

type LlmFactory = Box<dyn Fn(&Options) -> Box<dyn LlmProvider> + Send + Sync>;
type FuzzerFactory = Box<dyn Fn(&Options) -> Box<dyn FuzzerEngine> + Send + Sync>;
type AnalyzerFactory = Box<dyn Fn() -> Box<dyn LanguageAnalyzer> + Send + Sync>;
type ReporterFactory = Box<dyn Fn() -> Box<dyn Reporter> + Send + Sync>;
type StageFactory = Box<dyn Fn() -> Box<dyn PipelineStage> + Send + Sync>;

/// Registered component names, per kind, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableComponents {
    pub llm_providers: Vec<String>,
    pub fuzzer_engines: Vec<String>,
    pub language_analyzers: Vec<String>,
    pub reporters: Vec<String>,
    pub stages: Vec<String>,
}

#[derive(Default)]
pub struct ComponentRegistry {
    llm_providers: HashMap<String, LlmFactory>,
    llm_defaults: HashMap<String, Options>,
    fuzzer_engines: HashMap<String, FuzzerFactory>,
    fuzzer_defaults: HashMap<String, Options>,
    language_analyzers: HashMap<String, AnalyzerFactory>,
    reporters: HashMap<String, ReporterFactory>,
    stages: HashMap<String, StageFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an LLM provider factory with per-name default options.
    /// Call-site options win over these defaults at `get_llm` time.
    pub fn register_llm<F>(&mut self, name: &str, factory: F, defaults: Options)
    where
        F: Fn(&Options) -> Box<dyn LlmProvider> + Send + Sync + 'static,
    {
        if self
            .llm_providers
            .insert(name.to_string(), Box::new(factory))
            .is_some()
        {
            warn!("Overwriting LLM provider registration: {}", name);
        }
        if !defaults.is_empty() {
            self.llm_defaults.insert(name.to_string(), defaults);
        }
    }

    pub fn register_fuzzer<F>(&mut self, name: &str, factory: F, defaults: Options)
    where
        F: Fn(&Options) -> Box<dyn FuzzerEngine> + Send + Sync + 'static,
    {
        if self
            .fuzzer_engines
            .insert(name.to_string(), Box::new(factory))
            .is_some()
        {
            warn!("Overwriting fuzzer engine registration: {}", name);
        }
        if !defaults.is_empty() {
            self.fuzzer_defaults.insert(name.to_string(), defaults);
        }
    }

    pub fn register_language<F>(&mut self, lang: &str, factory: F)
    where
        F: Fn() -> Box<dyn LanguageAnalyzer> + Send + Sync + 'static,
    {
        if self
            .language_analyzers
            .insert(lang.to_string(), Box::new(factory))
            .is_some()
        {
            warn!("Overwriting language analyzer registration: {}", lang);
        }
    }

    pub fn register_reporter<F>(&mut self, fmt: &str, factory: F)
    where
        F: Fn() -> Box<dyn Reporter> + Send + Sync + 'static,
    {
        if self
            .reporters
            .insert(fmt.to_string(), Box::new(factory))
            .is_some()
        {
            warn!("Overwriting reporter registration: {}", fmt);
        }
    }

    pub fn register_stage<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn PipelineStage> + Send + Sync + 'static,
    {
        if self
            .stages
            .insert(name.to_string(), Box::new(factory))
            .is_some()
        {
            warn!("Overwriting pipeline stage registration: {}", name);
        }
    }

    /// Instantiate an LLM provider. Stored defaults are merged under the
    /// call-site options (call-site wins on conflict).
    pub fn get_llm(&self, name: &str, options: &Options) -> Result<Box<dyn LlmProvider>> {
        let factory = self
            .llm_providers
            .get(name)
            .ok_or_else(|| CoreError::Registry(format!("Unknown LLM provider: {name}")))?;
        let merged = self.merge_options(self.llm_defaults.get(name), options);
        Ok(factory(&merged))
    }

    pub fn get_fuzzer(&self, name: &str, options: &Options) -> Result<Box<dyn FuzzerEngine>> {
        let factory = self
            .fuzzer_engines
            .get(name)
            .ok_or_else(|| CoreError::Registry(format!("Unknown fuzzer engine: {name}")))?;
        let merged = self.merge_options(self.fuzzer_defaults.get(name), options);
        Ok(factory(&merged))
    }

    pub fn get_language(&self, lang: &str) -> Result<Box<dyn LanguageAnalyzer>> {
        let factory = self
            .language_analyzers
            .get(lang)
            .ok_or_else(|| CoreError::Registry(format!("Unknown language: {lang}")))?;
        Ok(factory())
    }

    pub fn get_reporter(&self, fmt: &str) -> Result<Box<dyn Reporter>> {
        let factory = self
            .reporters
            .get(fmt)
            .ok_or_else(|| CoreError::Registry(format!("Unknown reporter format: {fmt}")))?;
        Ok(factory())
    }

    pub fn get_stage(&self, name: &str) -> Result<Box<dyn PipelineStage>> {
        let factory = self
            .stages
            .get(name)
            .ok_or_else(|| CoreError::Registry(format!("Unknown pipeline stage: {name}")))?;
        Ok(factory())
    }

    /// All registered component names by kind, sorted for stable output.
    pub fn list_available(&self) -> AvailableComponents {
        fn sorted<V>(map: &HashMap<String, V>) -> Vec<String> {
            let mut names: Vec<String> = map.keys().cloned().collect();
            names.sort();
            names
        }
        AvailableComponents {
            llm_providers: sorted(&self.llm_providers),
            fuzzer_engines: sorted(&self.fuzzer_engines),
            language_analyzers: sorted(&self.language_analyzers),
            reporters: sorted(&self.reporters),
            stages: sorted(&self.stages),
        }
    }

    fn merge_options(&self, defaults: Option<&Options>, options: &Options) -> Options {
        let mut merged = defaults.cloned().unwrap_or_default();
        for (k, v) in options {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::traits::LlmOptions;

    struct FakeLlm {
        model: String,
    }

    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }
        fn complete(&self, _prompt: &str, _options: &LlmOptions) -> Result<String> {
            Ok(self.model.clone())
        }
        fn check_health(&self) -> bool {
            true
        }
    }

    fn fake_factory(options: &Options) -> Box<dyn LlmProvider> {
        Box::new(FakeLlm {
            model: options.get("model").cloned().unwrap_or_default(),
        })
    }

    #[test]
    fn test_unregistered_lookup_fails_with_registry_error() {
        let registry = ComponentRegistry::new();
        let err = registry
            .get_llm("unregistered-name", &Options::new())
            .err()
            .expect("expected an error");
        assert!(matches!(err, CoreError::Registry(_)));
        assert!(err.to_string().contains("unregistered-name"));
    }

    #[test]
    fn test_register_then_get_returns_instance() {
        let mut registry = ComponentRegistry::new();
        registry.register_llm("x", fake_factory, Options::new());
        let provider = registry.get_llm("x", &Options::new()).unwrap();
        assert_eq!(provider.name(), "fake");
        assert!(provider.check_health());
    }

    #[test]
    fn test_call_site_options_win_over_defaults() {
        let mut registry = ComponentRegistry::new();
        let mut defaults = Options::new();
        defaults.insert("model".to_string(), "default-model".to_string());
        registry.register_llm("x", fake_factory, defaults);

        let provider = registry.get_llm("x", &Options::new()).unwrap();
        assert_eq!(
            provider.complete("", &LlmOptions::default()).unwrap(),
            "default-model"
        );

        let mut overrides = Options::new();
        overrides.insert("model".to_string(), "override".to_string());
        let provider = registry.get_llm("x", &overrides).unwrap();
        assert_eq!(
            provider.complete("", &LlmOptions::default()).unwrap(),
            "override"
        );
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = ComponentRegistry::new();
        registry.register_llm(
            "x",
            |_| {
                Box::new(FakeLlm {
                    model: "first".to_string(),
                })
            },
            Options::new(),
        );
        registry.register_llm(
            "x",
            |_| {
                Box::new(FakeLlm {
                    model: "second".to_string(),
                })
            },
            Options::new(),
        );
        let provider = registry.get_llm("x", &Options::new()).unwrap();
        assert_eq!(
            provider.complete("", &LlmOptions::default()).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_list_available_is_sorted_per_kind() {
        let mut registry = ComponentRegistry::new();
        registry.register_llm("zeta", fake_factory, Options::new());
        registry.register_llm("alpha", fake_factory, Options::new());
        let avail = registry.list_available();
        assert_eq!(avail.llm_providers, vec!["alpha", "zeta"]);
        assert!(avail.stages.is_empty());
    }
}
