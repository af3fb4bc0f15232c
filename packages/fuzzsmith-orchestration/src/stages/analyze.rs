//! Analyze stage: extract candidate functions and usage contexts from the
//! analysis database via the configured language analyzer.

use tracing::{debug, info, warn};

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{PipelineContext, StageData, StageResult};
use fuzzsmith_core::traits::{PipelineStage, StageDeps};

use crate::context_builder::enrich_functions;
use crate::llm_analyze::suggest_usage_contexts;
use crate::util::get_llm_provider;

pub struct AnalyzeStage;

impl PipelineStage for AnalyzeStage {
    fn name(&self) -> &str {
        "analyze"
    }

    fn depends_on(&self) -> &[&str] {
        &["build"]
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult> {
        let Some(db_path) = &context.db_path else {
            return Ok(StageResult::failed(
                self.name(),
                "db_path not set in context (run build stage first or pass --db).",
            ));
        };

        let cfg = deps.app();
        let language = if context.language.is_empty() {
            cfg.language.clone()
        } else {
            context.language.clone()
        };

        let avail = deps.registry.list_available();
        if !avail.language_analyzers.iter().any(|l| l == &language) {
            let known = if avail.language_analyzers.is_empty() {
                "none".to_string()
            } else {
                avail.language_analyzers.join(", ")
            };
            return Ok(StageResult::failed(
                self.name(),
                format!("No language analyzer registered for '{language}'. Available: {known}."),
            ));
        }

        if !db_path.is_dir() {
            return Ok(StageResult::failed(
                self.name(),
                format!(
                    "CodeQL database not found or not a directory: {}",
                    db_path.display()
                ),
            ));
        }

        let analyzer = deps.registry.get_language(&language)?;
        let mut functions = match analyzer.extract_functions(db_path) {
            Ok(functions) => functions,
            Err(e) => {
                return Ok(StageResult::failed(
                    self.name(),
                    format!("Function extraction failed: {e}"),
                ));
            }
        };
        let mut usage_contexts = analyzer
            .extract_usage_contexts(db_path)
            .unwrap_or_default();
        info!(
            "Extracted {} function(s), {} usage context(s)",
            functions.len(),
            usage_contexts.len()
        );

        if let Some(repo_path) = &context.repo_path {
            if !functions.is_empty() {
                functions = enrich_functions(functions, repo_path);
            }
        }

        match get_llm_provider(deps) {
            Some(llm) if !functions.is_empty() => {
                let extra = suggest_usage_contexts(llm.as_ref(), &functions, &usage_contexts);
                if !extra.is_empty() {
                    info!("LLM suggested {} additional usage context(s)", extra.len());
                    usage_contexts.extend(extra);
                }
            }
            _ => {
                if !functions.is_empty() {
                    debug!("LLM analysis skipped (no LLM configured)");
                }
            }
        }

        let mut data = StageData::default();
        if let Some(output_path) = &context.options.analyze.output {
            if avail.reporters.iter().any(|r| r == "json") {
                match deps.registry.get_reporter("json") {
                    Ok(reporter) => {
                        if let Err(e) =
                            reporter.report_analysis(&functions, &usage_contexts, output_path)
                        {
                            warn!("Failed to write analysis output: {}", e);
                        }
                    }
                    Err(e) => warn!("Failed to instantiate json reporter: {}", e),
                }
            }
            data.analyze_output = Some(output_path.clone());
        }

        data.functions = Some(functions);
        data.usage_contexts = Some(usage_contexts);
        Ok(StageResult::ok_with(self.name(), "", data))
    }

    /// Never skip; analysis is cheap and the database may have changed.
    fn can_skip(&self, _context: &PipelineContext) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzsmith_core::config::ConfigManager;
    use fuzzsmith_core::registry::ComponentRegistry;
    use fuzzsmith_core::schema::{FunctionInfo, UsageContext};
    use fuzzsmith_core::traits::LanguageAnalyzer;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    struct FakeAnalyzer;

    impl LanguageAnalyzer for FakeAnalyzer {
        fn language(&self) -> &str {
            "cpp"
        }
        fn extract_functions(&self, _db: &Path) -> Result<Vec<FunctionInfo>> {
            Ok(vec![FunctionInfo {
                name: "parse".to_string(),
                signature: "int parse(const char* s)".to_string(),
                parameters: vec!["const char* s".to_string()],
                ..Default::default()
            }])
        }
        fn extract_usage_contexts(&self, _db: &Path) -> Result<Vec<UsageContext>> {
            Ok(Vec::new())
        }
    }

    fn deps_with_analyzer(
        registry: &mut ComponentRegistry,
    ) -> ConfigManager {
        registry.register_language("cpp", || Box::new(FakeAnalyzer));
        ConfigManager::from_sources(None, HashMap::new())
    }

    #[test]
    fn test_missing_db_path_fails() {
        let registry = ComponentRegistry::new();
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let result = AnalyzeStage
            .execute(&PipelineContext::default(), &deps)
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("db_path"));
    }

    #[test]
    fn test_unregistered_language_fails_with_actionable_message() {
        let registry = ComponentRegistry::new();
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let ctx = PipelineContext {
            db_path: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        let result = AnalyzeStage.execute(&ctx, &deps).unwrap();
        assert!(!result.success);
        assert!(result.message.contains("No language analyzer registered for 'cpp'"));
        assert!(result.message.contains("none"));
    }

    #[test]
    fn test_extracts_functions_into_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ComponentRegistry::new();
        let mgr = deps_with_analyzer(&mut registry);
        let deps = StageDeps::new(&registry, &mgr);
        let ctx = PipelineContext {
            db_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = AnalyzeStage.execute(&ctx, &deps).unwrap();
        assert!(result.success);
        let functions = result.data.functions.as_ref().unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "parse");
    }

    #[test]
    fn test_missing_db_dir_fails() {
        let mut registry = ComponentRegistry::new();
        let mgr = deps_with_analyzer(&mut registry);
        let deps = StageDeps::new(&registry, &mgr);
        let ctx = PipelineContext {
            db_path: Some(PathBuf::from("/no/such/db")),
            ..Default::default()
        };
        let result = AnalyzeStage.execute(&ctx, &deps).unwrap();
        assert!(!result.success);
        assert!(result.message.contains("not a directory"));
    }
}
