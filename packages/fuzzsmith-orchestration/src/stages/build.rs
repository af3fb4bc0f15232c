//! Build stage: create the CodeQL analysis database from the repo.

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{PipelineContext, StageData, StageResult};
use fuzzsmith_core::traits::{PipelineStage, StageDeps};

use crate::build_log::BuildLog;
use crate::build_orchestrator::BuildOrchestrator;
use crate::util::get_llm_provider;

pub struct BuildStage;

impl PipelineStage for BuildStage {
    fn name(&self) -> &str {
        "build"
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult> {
        let Some(repo_path) = &context.repo_path else {
            return Ok(StageResult::failed(
                self.name(),
                "repo_path not set in context",
            ));
        };

        let cfg = deps.app();
        let language = if context.language.is_empty() {
            cfg.language.clone()
        } else {
            context.language.clone()
        };
        let llm = get_llm_provider(deps);

        let opts = &context.options.build;
        let log_file = opts
            .log_file
            .clone()
            .unwrap_or_else(|| repo_path.join("fuzzsmith-build.log"));
        let mut log = BuildLog::open(&log_file, opts.verbose);

        log.info("=== Build stage started ===");
        log.info(&format!("repo_path={}", repo_path.display()));
        let db_path = context
            .db_path
            .clone()
            .unwrap_or_else(|| repo_path.join("codeql-db"));
        log.info(&format!("db_path={}", db_path.display()));
        log.info(&format!("language={} overwrite={}", language, opts.overwrite));
        log.info(&format!("LLM configured={}", llm.is_some()));

        let orchestrator =
            BuildOrchestrator::new(llm.as_deref(), &cfg.codeql_bin(), cfg.llm.max_retries);
        let outcome = orchestrator.build(
            repo_path,
            Some(&db_path),
            &language,
            opts.overwrite,
            None,
            opts.build_script.as_deref(),
            opts.configure_options.as_deref(),
            &mut log,
        );

        if outcome.success {
            log.info("=== Build stage finished: success ===");
            let db = outcome.db_path.unwrap_or(db_path);
            log.info(&format!("CodeQL database: {}", db.display()));
            let data = StageData {
                db_path: Some(db),
                build_log_file: Some(log_file),
                ..Default::default()
            };
            return Ok(StageResult::ok_with(self.name(), "", data));
        }

        log.warn("=== Build stage finished: failed ===");
        let mut message = outcome.message;
        if message.is_empty() {
            message = "Build failed".to_string();
        }
        log.warn(&format!("message:\n{message}"));
        if llm.is_none() {
            message.push_str(
                "\n\n(No LLM configured: register an LLM provider and set its API key \
                 for automatic fix suggestions.)",
            );
        }
        let data = StageData {
            build_log_file: Some(log_file),
            suggested_fix_command: outcome.suggested_fix_command,
            ..Default::default()
        };
        Ok(StageResult::failed_with(self.name(), message, data))
    }

    /// Skip when a database path is already set and exists.
    fn can_skip(&self, context: &PipelineContext) -> bool {
        context.db_path.as_ref().is_some_and(|db| db.exists())
    }
}
