//! Fuzz-build stage: rebuild the library with debug and sanitizer flags
//! (no CodeQL) and install it to a dedicated prefix for harness linking.

use std::process::Command;
use std::time::Duration;

use fuzzsmith_core::error::Result;
use fuzzsmith_core::process::run_with_timeout;
use fuzzsmith_core::schema::{PipelineContext, StageData, StageResult};
use fuzzsmith_core::traits::{PipelineStage, StageDeps};

use crate::build_log::BuildLog;
use crate::codeql::build_command_to_shell;
use crate::readme::{inject_configure_options, ReadmeAnalyzer};

const FUZZ_BUILD_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_OUTPUT_EXCERPT: usize = 8000;

const FUZZ_CFLAGS: &str = "-g -O1 -fsanitize=address,undefined -fno-omit-frame-pointer";
const FUZZ_LDFLAGS: &str = "-fsanitize=address,undefined -fno-omit-frame-pointer";

pub struct FuzzBuildStage;

impl PipelineStage for FuzzBuildStage {
    fn name(&self) -> &str {
        "fuzz_build"
    }

    fn depends_on(&self) -> &[&str] {
        &["build"]
    }

    fn execute(&self, context: &PipelineContext, _deps: &StageDeps<'_>) -> Result<StageResult> {
        let Some(repo_path) = &context.repo_path else {
            return Ok(StageResult::failed(
                self.name(),
                "repo_path not set in context",
            ));
        };
        if !repo_path.is_dir() {
            return Ok(StageResult::failed(
                self.name(),
                format!("repo_path is not a directory: {}", repo_path.display()),
            ));
        }

        let opts = &context.options.fuzz_build;
        let fuzz_prefix = opts
            .install_prefix
            .clone()
            .unwrap_or_else(|| repo_path.join("install-fuzz"));
        let log_file = opts
            .log_file
            .clone()
            .unwrap_or_else(|| repo_path.join("fuzzsmith-fuzz-build.log"));
        let mut log = BuildLog::open(&log_file, opts.verbose);

        log.info("=== Fuzz Build stage started ===");
        log.info(&format!(
            "repo_path={} fuzz_install_prefix={}",
            repo_path.display(),
            fuzz_prefix.display()
        ));

        // Build commands without LLM involvement; this is a plain rebuild.
        let analyzer = ReadmeAnalyzer::new(None);
        let mut commands =
            analyzer.extract_build_commands(repo_path, Some(&fuzz_prefix), &mut log);
        if let Some(configure_options) = &opts.configure_options {
            commands = inject_configure_options(&commands, configure_options);
            log.info(&format!(
                "Configure options applied: {}",
                configure_options.trim()
            ));
        }
        let full_cmd = build_command_to_shell(&commands, repo_path);

        let mut cmd = Command::new("sh");
        cmd.args(["-c", &full_cmd]).current_dir(repo_path);
        for (var, flags) in [
            ("CFLAGS", FUZZ_CFLAGS),
            ("CXXFLAGS", FUZZ_CFLAGS),
            ("LDFLAGS", FUZZ_LDFLAGS),
        ] {
            let existing = std::env::var(var).unwrap_or_default();
            let value = if existing.is_empty() {
                flags.to_string()
            } else {
                format!("{existing} {flags}")
            };
            cmd.env(var, value);
        }

        log.info(&format!("Full build command: {full_cmd}"));
        log.info(&format!(
            "CFLAGS={FUZZ_CFLAGS} CXXFLAGS={FUZZ_CFLAGS} LDFLAGS={FUZZ_LDFLAGS}"
        ));

        let output = match run_with_timeout(&mut cmd, FUZZ_BUILD_TIMEOUT) {
            Ok(output) => output,
            Err(e) => {
                log.warn(&format!("Fuzz build failed: {e}"));
                let data = StageData {
                    build_log_file: Some(log_file),
                    ..Default::default()
                };
                return Ok(StageResult::failed_with(self.name(), e.to_string(), data));
            }
        };

        if output.timed_out {
            log.warn(&format!(
                "Fuzz build timed out ({}s)",
                FUZZ_BUILD_TIMEOUT.as_secs()
            ));
            let data = StageData {
                build_log_file: Some(log_file),
                ..Default::default()
            };
            return Ok(StageResult::failed_with(
                self.name(),
                format!("Fuzz build timed out ({}s)", FUZZ_BUILD_TIMEOUT.as_secs()),
                data,
            ));
        }

        if !output.success() {
            let err = output.error_text();
            log.warn(&format!(
                "Fuzz build failed (exit {:?}):\n{err}",
                output.status
            ));
            let data = StageData {
                build_log_file: Some(log_file),
                stderr_excerpt: Some(excerpt(&output.stderr)),
                stdout_excerpt: Some(excerpt(&output.stdout)),
                ..Default::default()
            };
            return Ok(StageResult::failed_with(
                self.name(),
                format!("Fuzz build failed (exit {:?})", output.status),
                data,
            ));
        }

        log.info("=== Fuzz Build stage finished: success ===");
        log.info(&format!("Instrumented install: {}", fuzz_prefix.display()));
        let data = StageData {
            fuzz_install_prefix: Some(fuzz_prefix),
            build_log_file: Some(log_file),
            ..Default::default()
        };
        Ok(StageResult::ok_with(self.name(), "", data))
    }

    /// Skip when the install prefix already looks like a valid install.
    fn can_skip(&self, context: &PipelineContext) -> bool {
        let prefix = context
            .fuzz_install_prefix
            .clone()
            .or_else(|| context.options.fuzz_build.install_prefix.clone());
        match prefix {
            Some(p) if p.is_dir() => p.join("lib").is_dir() || p.join("include").is_dir(),
            _ => false,
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(MAX_OUTPUT_EXCERPT).collect()
}
