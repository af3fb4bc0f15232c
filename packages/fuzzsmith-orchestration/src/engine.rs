//! Pipeline engine: sequential stage execution with skip and
//! stop-on-failure semantics.

use tracing::{info, warn};

use fuzzsmith_core::config::PipelineConfigModel;
use fuzzsmith_core::registry::ComponentRegistry;
use fuzzsmith_core::schema::{PipelineContext, PipelineResult, StageResult};
use fuzzsmith_core::traits::StageDeps;

use crate::error::{OrchestrationError, Result};

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stages: Vec<String>,
    pub skip_stages: Vec<String>,
    pub stop_on_failure: bool,
}

impl From<&PipelineConfigModel> for PipelineConfig {
    fn from(model: &PipelineConfigModel) -> Self {
        Self {
            stages: model.stages.clone(),
            skip_stages: model.skip_stages.clone(),
            stop_on_failure: model.stop_on_failure,
        }
    }
}

/// Executes pipeline stages strictly in configured order.
///
/// Later stages depend on context fields earlier stages wrote, so there is
/// no concurrent stage execution; the context is the only shared mutable
/// state and the engine is its only writer.
pub struct PipelineEngine<'r> {
    registry: &'r ComponentRegistry,
    config: PipelineConfig,
}

impl<'r> PipelineEngine<'r> {
    pub fn new(registry: &'r ComponentRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all non-skipped stages and return the final aggregate result.
    ///
    /// With `stop_on_failure`, a resolution failure or unexpected stage
    /// error aborts the whole run; otherwise both are downgraded to a
    /// failed stage result and the loop continues. A stage whose
    /// `can_skip` returns true leaves no trace in the results.
    pub fn run(
        &self,
        mut context: PipelineContext,
        deps: &StageDeps<'_>,
    ) -> Result<PipelineResult> {
        for stage_name in &self.config.stages {
            if self.config.skip_stages.iter().any(|s| s == stage_name) {
                info!("Stage {} skipped (configured)", stage_name);
                continue;
            }

            let stage = match self.registry.get_stage(stage_name) {
                Ok(stage) => stage,
                Err(e) => {
                    if self.config.stop_on_failure {
                        return Err(OrchestrationError::Pipeline(format!(
                            "Failed to get stage {stage_name}: {e}"
                        )));
                    }
                    warn!("Failed to get stage {}: {}", stage_name, e);
                    context.update(StageResult::failed(stage_name, e.to_string()));
                    continue;
                }
            };

            if stage.can_skip(&context) {
                info!("Stage {} skipped (work product present)", stage_name);
                continue;
            }

            info!("Running stage: {}", stage_name);
            let result = match stage.execute(&context, deps) {
                Ok(result) => result,
                Err(e) => {
                    if self.config.stop_on_failure {
                        return Err(OrchestrationError::Pipeline(format!(
                            "Stage {stage_name} failed: {e}"
                        )));
                    }
                    warn!("Stage {} failed unexpectedly: {}", stage_name, e);
                    StageResult::failed(stage_name, e.to_string())
                }
            };

            let success = result.success;
            if success {
                info!("Stage {} succeeded: {}", stage_name, result.message);
            } else {
                warn!("Stage {} failed: {}", stage_name, result.message);
            }
            context.update(result);

            if self.config.stop_on_failure && !success {
                break;
            }
        }

        Ok(context.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzsmith_core::config::ConfigManager;
    use fuzzsmith_core::error::Result as CoreResult;
    use fuzzsmith_core::schema::StageData;
    use fuzzsmith_core::traits::PipelineStage;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct SuccessStage {
        executions: Arc<AtomicUsize>,
    }

    impl PipelineStage for SuccessStage {
        fn name(&self) -> &str {
            "success_stage"
        }
        fn execute(
            &self,
            _context: &PipelineContext,
            _deps: &StageDeps<'_>,
        ) -> CoreResult<StageResult> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let mut data = StageData::default();
            data.db_path = Some(PathBuf::from("/tmp/db"));
            Ok(StageResult::ok_with("success_stage", "", data))
        }
    }

    struct FailStage;

    impl PipelineStage for FailStage {
        fn name(&self) -> &str {
            "fail_stage"
        }
        fn execute(
            &self,
            _context: &PipelineContext,
            _deps: &StageDeps<'_>,
        ) -> CoreResult<StageResult> {
            Ok(StageResult::failed("fail_stage", "failed"))
        }
    }

    struct ErrorStage;

    impl PipelineStage for ErrorStage {
        fn name(&self) -> &str {
            "error_stage"
        }
        fn execute(
            &self,
            _context: &PipelineContext,
            _deps: &StageDeps<'_>,
        ) -> CoreResult<StageResult> {
            Err(fuzzsmith_core::error::CoreError::Config(
                "stage error".to_string(),
            ))
        }
    }

    struct SkippableStage;

    impl PipelineStage for SkippableStage {
        fn name(&self) -> &str {
            "skippable"
        }
        fn execute(
            &self,
            _context: &PipelineContext,
            _deps: &StageDeps<'_>,
        ) -> CoreResult<StageResult> {
            Ok(StageResult::ok("skippable"))
        }
        fn can_skip(&self, _context: &PipelineContext) -> bool {
            true
        }
    }

    fn config(stages: &[&str], skip: &[&str], stop_on_failure: bool) -> PipelineConfig {
        PipelineConfig {
            stages: stages.iter().map(|s| s.to_string()).collect(),
            skip_stages: skip.iter().map(|s| s.to_string()).collect(),
            stop_on_failure,
        }
    }

    fn run_with(
        registry: &ComponentRegistry,
        cfg: PipelineConfig,
    ) -> Result<PipelineResult> {
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(registry, &mgr);
        PipelineEngine::new(registry, cfg).run(PipelineContext::default(), &deps)
    }

    #[test]
    fn test_empty_stage_list_succeeds() {
        let registry = ComponentRegistry::new();
        let result = run_with(&registry, config(&[], &[], true)).unwrap();
        assert!(result.success);
        assert!(result.stage_results.is_empty());
    }

    #[test]
    fn test_single_stage_runs_and_merges() {
        let mut registry = ComponentRegistry::new();
        let executions = Arc::new(AtomicUsize::new(0));
        let handle = executions.clone();
        registry.register_stage("success", move || {
            Box::new(SuccessStage {
                executions: handle.clone(),
            })
        });

        let result = run_with(&registry, config(&["success"], &[], true)).unwrap();
        assert!(result.success);
        assert_eq!(result.stage_results.len(), 1);
        assert_eq!(result.stage_results[0].stage_name, "success_stage");
        assert_eq!(result.db_path.as_deref(), Some(std::path::Path::new("/tmp/db")));
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_configured_skip_leaves_no_result() {
        let mut registry = ComponentRegistry::new();
        let executions = Arc::new(AtomicUsize::new(0));
        let handle = executions.clone();
        registry.register_stage("success", move || {
            Box::new(SuccessStage {
                executions: handle.clone(),
            })
        });

        let result = run_with(&registry, config(&["success"], &["success"], true)).unwrap();
        assert!(result.success);
        assert!(result.stage_results.is_empty());
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_can_skip_leaves_no_result() {
        let mut registry = ComponentRegistry::new();
        registry.register_stage("skippable", || Box::new(SkippableStage));
        let result = run_with(&registry, config(&["skippable"], &[], true)).unwrap();
        assert!(result.success);
        assert!(result.stage_results.is_empty());
    }

    #[test]
    fn test_stop_on_failure_halts_after_failed_stage() {
        let mut registry = ComponentRegistry::new();
        let executions = Arc::new(AtomicUsize::new(0));
        let handle = executions.clone();
        registry.register_stage("fail", || Box::new(FailStage));
        registry.register_stage("success", move || {
            Box::new(SuccessStage {
                executions: handle.clone(),
            })
        });

        let result = run_with(&registry, config(&["fail", "success"], &[], true)).unwrap();
        assert!(!result.success);
        assert_eq!(result.stage_results.len(), 1);
        assert_eq!(result.stage_results[0].stage_name, "fail_stage");
        assert!(!result.stage_results[0].success);
        // The later stage never ran.
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_continue_on_failure_records_both_stages() {
        let mut registry = ComponentRegistry::new();
        let executions = Arc::new(AtomicUsize::new(0));
        let handle = executions.clone();
        registry.register_stage("fail", || Box::new(FailStage));
        registry.register_stage("success", move || {
            Box::new(SuccessStage {
                executions: handle.clone(),
            })
        });

        let result = run_with(&registry, config(&["fail", "success"], &[], false)).unwrap();
        assert!(!result.success);
        assert_eq!(result.stage_results.len(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_stage_errors_when_stopping_on_failure() {
        let registry = ComponentRegistry::new();
        let err = run_with(&registry, config(&["nonexistent"], &[], true)).unwrap_err();
        assert!(err.to_string().contains("Failed to get stage nonexistent"));
    }

    #[test]
    fn test_unknown_stage_recorded_when_continuing() {
        let registry = ComponentRegistry::new();
        let result = run_with(&registry, config(&["nonexistent"], &[], false)).unwrap();
        assert!(!result.success);
        assert_eq!(result.stage_results.len(), 1);
        assert!(result.stage_results[0].message.contains("nonexistent"));
    }

    #[test]
    fn test_stage_error_wrapped_when_stopping_on_failure() {
        let mut registry = ComponentRegistry::new();
        registry.register_stage("error", || Box::new(ErrorStage));
        let err = run_with(&registry, config(&["error"], &[], true)).unwrap_err();
        assert!(err.to_string().contains("Stage error failed"));
    }

    #[test]
    fn test_stage_error_downgraded_when_continuing() {
        let mut registry = ComponentRegistry::new();
        registry.register_stage("error", || Box::new(ErrorStage));
        let result = run_with(&registry, config(&["error"], &[], false)).unwrap();
        assert!(!result.success);
        assert_eq!(result.stage_results.len(), 1);
        assert!(result.stage_results[0].message.contains("stage error"));
    }
}
