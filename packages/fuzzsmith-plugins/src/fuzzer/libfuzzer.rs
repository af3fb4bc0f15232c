//! libFuzzer engine: runs instrumented binaries with libFuzzer flags,
//! parses crash artifacts, and collects coverage via llvm-profdata and
//! llvm-cov.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

use fuzzsmith_core::process::run_with_timeout;
use fuzzsmith_core::schema::{CoverageReport, CrashInfo, FuzzResult};
use fuzzsmith_core::traits::{FuzzOptions, FuzzerEngine};

const COVERAGE_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// Extra wall-clock margin beyond -max_total_time before the process is
/// killed from the outside.
const KILL_MARGIN: Duration = Duration::from_secs(30);

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Done\s+\d+\s+runs\s+in\s+(\d+)\s+second").unwrap());
static EXECS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"exec/s:\s+(\d+)").unwrap());

const ARTIFACT_PREFIXES: [&str; 4] = ["crash-", "leak-", "timeout-", "oom-"];

#[derive(Default)]
pub struct LibFuzzerEngine;

impl LibFuzzerEngine {
    pub fn new() -> Self {
        Self
    }
}

impl FuzzerEngine for LibFuzzerEngine {
    fn name(&self) -> &str {
        "libfuzzer"
    }

    fn fuzz(&self, binary: &Path, corpus_dir: &Path, options: &FuzzOptions) -> FuzzResult {
        if std::fs::create_dir_all(corpus_dir).is_err() {
            return FuzzResult {
                binary_path: binary.display().to_string(),
                corpus_dir: corpus_dir.display().to_string(),
                success: false,
                ..Default::default()
            };
        }

        let artifact_prefix = options
            .artifact_prefix
            .clone()
            .unwrap_or_else(|| format!("{}/crash-", corpus_dir.display()));

        let mut cmd = Command::new(binary);
        cmd.arg(corpus_dir)
            .arg(format!("-timeout={}", options.timeout_secs))
            .arg(format!("-max_total_time={}", options.max_total_time_secs))
            .arg(format!("-rss_limit_mb={}", options.rss_limit_mb))
            .arg(format!("-artifact_prefix={artifact_prefix}"));
        if options.fork > 1 {
            cmd.arg(format!("-fork={}", options.fork));
        }

        // Profile output lands next to the per-binary results directory
        // for later llvm-cov processing.
        let profraw = corpus_dir
            .parent()
            .map(|p| p.join("default.profraw"))
            .unwrap_or_else(|| corpus_dir.join("default.profraw"));
        cmd.env("LLVM_PROFILE_FILE", &profraw);

        info!("Running libFuzzer: {}", binary.display());
        let timeout = Duration::from_secs(options.max_total_time_secs) + KILL_MARGIN;
        let output = match run_with_timeout(&mut cmd, timeout) {
            Ok(output) => output,
            Err(e) => {
                warn!("libFuzzer binary not runnable {}: {}", binary.display(), e);
                return FuzzResult {
                    binary_path: binary.display().to_string(),
                    corpus_dir: corpus_dir.display().to_string(),
                    success: false,
                    ..Default::default()
                };
            }
        };

        if output.timed_out {
            warn!("libFuzzer timed out for {}", binary.display());
            return FuzzResult {
                binary_path: binary.display().to_string(),
                corpus_dir: corpus_dir.display().to_string(),
                success: false,
                duration_seconds: options.max_total_time_secs as f64,
                ..Default::default()
            };
        }

        let duration = parse_duration(&output.stderr);
        let execs_per_sec = parse_execs_per_sec(&output.stderr);

        // Exit code 0 = clean finish, 1 = crash found; both are useful runs.
        let success = matches!(output.status, Some(0) | Some(1));

        FuzzResult {
            binary_path: binary.display().to_string(),
            corpus_dir: corpus_dir.display().to_string(),
            success,
            duration_seconds: if duration > 0.0 {
                duration
            } else {
                options.max_total_time_secs as f64
            },
            execs_per_sec,
            ..Default::default()
        }
    }

    fn parse_crashes(&self, artifact_dir: &Path) -> Vec<CrashInfo> {
        let Ok(entries) = std::fs::read_dir(artifact_dir) else {
            return Vec::new();
        };
        let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        let mut crashes = Vec::new();
        for path in paths {
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if let Some(prefix) = ARTIFACT_PREFIXES.iter().find(|p| name.starts_with(*p)) {
                let warn_class = prefix.trim_end_matches('-').to_uppercase();
                crashes.push(CrashInfo {
                    artifact_path: path.display().to_string(),
                    summary: format!("{warn_class} artifact: {name}"),
                    warn_class,
                    ..Default::default()
                });
            }
        }
        crashes
    }

    fn get_coverage(&self, binary: &Path, profdata: &Path) -> CoverageReport {
        let mut report = CoverageReport {
            binary_path: binary.display().to_string(),
            profdata_path: profdata.display().to_string(),
            ..Default::default()
        };

        let profraw = profdata
            .parent()
            .map(|p| p.join("default.profraw"))
            .unwrap_or_default();

        if profraw.exists() && !profdata.exists() {
            let mut merge = Command::new("llvm-profdata");
            merge
                .args(["merge", "-sparse"])
                .arg(&profraw)
                .arg("-o")
                .arg(profdata);
            match run_with_timeout(&mut merge, COVERAGE_TOOL_TIMEOUT) {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    warn!("llvm-profdata merge failed: {}", out.error_text());
                    return report;
                }
                Err(e) => {
                    warn!("llvm-profdata not available: {}", e);
                    return report;
                }
            }
        }
        if !profdata.exists() {
            return report;
        }

        let mut export = Command::new("llvm-cov");
        export
            .args(["export", "-summary-only", "-instr-profile"])
            .arg(profdata)
            .arg(binary);
        let json_text = match run_with_timeout(&mut export, COVERAGE_TOOL_TIMEOUT) {
            Ok(out) if out.success() => out.stdout,
            Ok(out) => {
                warn!("llvm-cov export failed: {}", out.error_text());
                return report;
            }
            Err(e) => {
                warn!("llvm-cov not available: {}", e);
                return report;
            }
        };

        match serde_json::from_str::<serde_json::Value>(&json_text) {
            Ok(value) => {
                let totals = &value["data"][0]["totals"];
                report.lines_covered = totals["lines"]["covered"].as_u64().unwrap_or(0);
                report.lines_total = totals["lines"]["count"].as_u64().unwrap_or(0);
                report.regions_covered = totals["regions"]["covered"].as_u64().unwrap_or(0);
                report.regions_total = totals["regions"]["count"].as_u64().unwrap_or(0);
            }
            Err(e) => warn!("Coverage parsing failed: {}", e),
        }
        report
    }
}

fn parse_duration(stderr: &str) -> f64 {
    DURATION_RE
        .captures(stderr)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0)
}

/// Last reported exec/s value wins.
fn parse_execs_per_sec(stderr: &str) -> f64 {
    EXECS_RE
        .captures_iter(stderr)
        .last()
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_libfuzzer_stats() {
        let stderr = "\
#2      INITED cov: 5 ft: 5 corp: 1/1b exec/s: 0 rss: 26Mb
#65536  pulse  cov: 7 ft: 8 corp: 2/3b exec/s: 32768 rss: 27Mb
Done 131072 runs in 4 second(s)
";
        assert_eq!(parse_duration(stderr), 4.0);
        assert_eq!(parse_execs_per_sec(stderr), 32768.0);
    }

    #[test]
    fn test_parse_crashes_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["crash-abc", "leak-def", "timeout-1", "oom-2", "README", "corpus-x"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let engine = LibFuzzerEngine::new();
        let crashes = engine.parse_crashes(dir.path());
        assert_eq!(crashes.len(), 4);
        let classes: Vec<&str> = crashes.iter().map(|c| c.warn_class.as_str()).collect();
        assert!(classes.contains(&"CRASH"));
        assert!(classes.contains(&"LEAK"));
        assert!(classes.contains(&"TIMEOUT"));
        assert!(classes.contains(&"OOM"));
    }

    #[test]
    fn test_missing_binary_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LibFuzzerEngine::new();
        let result = engine.fuzz(
            Path::new("/no/such/fuzz_binary"),
            &dir.path().join("corpus"),
            &FuzzOptions::default(),
        );
        assert!(!result.success);
    }

    #[test]
    fn test_coverage_without_tools_is_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LibFuzzerEngine::new();
        let report = engine.get_coverage(
            Path::new("/no/such/binary"),
            &dir.path().join("default.profdata"),
        );
        assert_eq!(report.lines_total, 0);
        assert_eq!(report.lines_covered, 0);
    }
}
