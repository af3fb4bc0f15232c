//! Fuzz stage: run compiled harnesses through the configured fuzzer engine
//! and aggregate crash and coverage results.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{CrashInfo, FuzzResult, PipelineContext, StageData, StageResult};
use fuzzsmith_core::traits::{FuzzOptions, PipelineStage, StageDeps};

use crate::util::resolve_output_dir;

pub struct FuzzStage;

impl PipelineStage for FuzzStage {
    fn name(&self) -> &str {
        "fuzz"
    }

    fn depends_on(&self) -> &[&str] {
        &["compile"]
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult> {
        let cfg = deps.app();
        let opts = &context.options.fuzz;

        let engine_name = opts.engine.clone().unwrap_or_else(|| cfg.fuzzer_engine.clone());
        let avail = deps.registry.list_available();
        if !avail.fuzzer_engines.iter().any(|n| n == &engine_name) {
            return Ok(StageResult::failed(
                self.name(),
                format!(
                    "Fuzzer engine not registered: '{engine_name}'. Available: {:?}",
                    avail.fuzzer_engines
                ),
            ));
        }
        let engine = match deps.registry.get_fuzzer(&engine_name, deps.env()) {
            Ok(engine) => engine,
            Err(e) => {
                return Ok(StageResult::failed(
                    self.name(),
                    format!("Failed to instantiate fuzzer engine '{engine_name}': {e}"),
                ));
            }
        };

        let binaries = discover_binaries(context);
        if binaries.is_empty() {
            return Ok(StageResult::failed(
                self.name(),
                "No compiled fuzz binaries found (run compile stage first).",
            ));
        }

        let results_dir =
            resolve_output_dir(context, opts.results_dir.as_deref(), None, "fuzz_results")?;

        let fuzz_options = FuzzOptions {
            timeout_secs: opts.timeout_secs,
            max_total_time_secs: opts.max_total_time_secs,
            fork: opts.fork,
            rss_limit_mb: opts.rss_limit_mb,
            artifact_prefix: None,
        };

        let mut all_results: Vec<FuzzResult> = Vec::new();
        let mut all_crashes: Vec<CrashInfo> = Vec::new();
        let mut total_duration = 0.0_f64;

        for binary in &binaries {
            let binary_name = binary
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "binary".to_string());
            let corpus_dir = results_dir.join(&binary_name).join("corpus");
            let artifact_dir = results_dir.join(&binary_name).join("artifacts");
            std::fs::create_dir_all(&corpus_dir)?;
            std::fs::create_dir_all(&artifact_dir)?;

            info!(
                "Fuzzing {} (max_total_time={}s)",
                binary_name, fuzz_options.max_total_time_secs
            );
            let per_binary = FuzzOptions {
                artifact_prefix: Some(format!("{}/", artifact_dir.display())),
                ..fuzz_options.clone()
            };
            let mut fuzz_result = engine.fuzz(binary, &corpus_dir, &per_binary);

            let crashes = engine.parse_crashes(&artifact_dir);
            if !crashes.is_empty() {
                fuzz_result.crashes.extend(crashes);
            }

            if opts.coverage {
                let profraw = results_dir.join(&binary_name).join("default.profraw");
                let profdata = results_dir.join(&binary_name).join("default.profdata");
                if profraw.exists() || profdata.exists() {
                    fuzz_result.coverage = Some(engine.get_coverage(binary, &profdata));
                }
            }

            total_duration += fuzz_result.duration_seconds;
            all_crashes.extend(fuzz_result.crashes.iter().cloned());
            all_results.push(fuzz_result);
        }

        let unique_crashes = deduplicate_crashes(&all_crashes);
        info!(
            "Fuzzing complete: {} binaries, {} total crashes ({} unique), {:.0}s total",
            binaries.len(),
            all_crashes.len(),
            unique_crashes.len(),
            total_duration
        );

        let ok = all_results.iter().filter(|r| r.success).count();
        let failed = all_results.len() - ok;
        let any_success = ok > 0;
        let message = format!(
            "Fuzzed {} binaries: {} OK, {} failed, {} unique crashes.",
            binaries.len(),
            ok,
            failed,
            unique_crashes.len()
        );

        let data = StageData {
            fuzz_results: Some(all_results),
            results_dir: Some(results_dir),
            binaries_fuzzed: Some(binaries.len()),
            total_crashes: Some(all_crashes.len()),
            unique_crashes,
            total_duration_seconds: Some(total_duration),
            ..Default::default()
        };

        if any_success {
            Ok(StageResult::ok_with(self.name(), message, data))
        } else {
            Ok(StageResult::failed_with(self.name(), message, data))
        }
    }

    /// Skip when fuzz results are already populated.
    fn can_skip(&self, context: &PipelineContext) -> bool {
        !context.fuzz_results.is_empty()
    }
}

/// Find compiled fuzz binaries: first from the compile stage's recorded
/// results, then by scanning the binaries directory.
fn discover_binaries(context: &PipelineContext) -> Vec<PathBuf> {
    let mut binaries: Vec<PathBuf> = Vec::new();

    for sr in &context.stage_results {
        if sr.stage_name == "compile" {
            for item in &sr.data.compiled {
                if item.binary_path.is_file() {
                    binaries.push(item.binary_path.clone());
                }
            }
        }
    }
    if !binaries.is_empty() {
        binaries.sort();
        binaries.dedup();
        return binaries;
    }

    if let Some(dir) = &context.binaries_dir {
        if dir.is_dir() {
            if let Ok(entries) = std::fs::read_dir(dir) {
                let mut found: Vec<PathBuf> = entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && p.extension().is_none())
                    .collect();
                found.sort();
                binaries = found;
            }
        }
    }
    binaries
}

/// Deduplicate crashes by (crash_file, crash_line, warn_class); when those
/// are empty, fall back to a hash of the backtrace or summary.
fn deduplicate_crashes(crashes: &[CrashInfo]) -> Vec<CrashInfo> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();
    for crash in crashes {
        let key = if !crash.crash_file.is_empty() && crash.crash_line > 0 {
            format!("{}:{}:{}", crash.crash_file, crash.crash_line, crash.warn_class)
        } else if !crash.backtrace.is_empty() {
            content_hash(&crash.backtrace)
        } else if !crash.summary.is_empty() {
            content_hash(&crash.summary)
        } else {
            crash.artifact_path.clone()
        };
        if seen.insert(key) {
            unique.push(crash.clone());
        }
    }
    unique
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
