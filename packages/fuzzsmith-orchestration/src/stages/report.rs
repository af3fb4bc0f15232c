//! Report stage: write functions/crashes/coverage reports through every
//! requested reporter format.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{
    CoverageReport, CrashInfo, PipelineContext, StageData, StageResult,
};
use fuzzsmith_core::traits::{PipelineStage, StageDeps};

pub struct ReportStage;

impl PipelineStage for ReportStage {
    fn name(&self) -> &str {
        "report"
    }

    fn depends_on(&self) -> &[&str] {
        &["fuzz"]
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult> {
        let avail = deps.registry.list_available();
        if avail.reporters.is_empty() {
            return Ok(StageResult::failed(
                self.name(),
                "No reporter plugins registered.",
            ));
        }

        let requested = &context.options.report.formats;
        let formats: Vec<String> = if requested.is_empty() {
            avail.reporters.clone()
        } else {
            let missing: Vec<&String> = requested
                .iter()
                .filter(|f| !avail.reporters.contains(f))
                .collect();
            if !missing.is_empty() {
                warn!("Requested report formats not available: {:?}", missing);
            }
            requested
                .iter()
                .filter(|f| avail.reporters.contains(f))
                .cloned()
                .collect()
        };
        if formats.is_empty() {
            return Ok(StageResult::failed(
                self.name(),
                format!(
                    "None of the requested formats are available. Registered: {:?}",
                    avail.reporters
                ),
            ));
        }

        let output_dir = resolve_report_dir(context)?;

        let functions = &context.functions;
        let crashes = gather_crashes(context);
        let coverage = gather_coverage(context);

        let mut written_files: Vec<PathBuf> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for fmt in &formats {
            let reporter = match deps.registry.get_reporter(fmt) {
                Ok(reporter) => reporter,
                Err(e) => {
                    errors.push(format!("Failed to instantiate reporter '{fmt}': {e}"));
                    continue;
                }
            };

            let fmt_dir = output_dir.join(fmt);
            std::fs::create_dir_all(&fmt_dir)?;

            if !functions.is_empty() {
                let out_path = fmt_dir.join(format!("functions.{}", extension(fmt)));
                match reporter.report_functions(functions, &out_path) {
                    Ok(()) => {
                        info!("Wrote functions report: {}", out_path.display());
                        written_files.push(out_path);
                    }
                    Err(e) => errors.push(format!("{fmt}: report_functions failed: {e}")),
                }
            }

            if !crashes.is_empty() {
                let out_path = fmt_dir.join(format!("crashes.{}", extension(fmt)));
                match reporter.report_crashes(&crashes, &out_path) {
                    Ok(()) => {
                        info!("Wrote crashes report: {}", out_path.display());
                        written_files.push(out_path);
                    }
                    Err(e) => errors.push(format!("{fmt}: report_crashes failed: {e}")),
                }
            }

            if let Some(coverage) = &coverage {
                let out_path = fmt_dir.join(format!("coverage.{}", extension(fmt)));
                match reporter.report_coverage(coverage, &out_path) {
                    Ok(()) => {
                        info!("Wrote coverage report: {}", out_path.display());
                        written_files.push(out_path);
                    }
                    Err(e) => errors.push(format!("{fmt}: report_coverage failed: {e}")),
                }
            }
        }

        if written_files.is_empty() && errors.is_empty() {
            let data = StageData {
                report_output: Some(output_dir),
                ..Default::default()
            };
            return Ok(StageResult::ok_with(
                self.name(),
                "No data to report (no functions, crashes, or coverage).",
                data,
            ));
        }

        let message = format!(
            "Generated {} report file(s) in {} format(s).{}",
            written_files.len(),
            formats.len(),
            if errors.is_empty() {
                String::new()
            } else {
                format!(" {} error(s).", errors.len())
            }
        );
        let success = !written_files.is_empty();
        let data = StageData {
            report_output: Some(output_dir),
            written_paths: written_files,
            report_formats: formats,
            report_errors: errors,
            ..Default::default()
        };
        if success {
            Ok(StageResult::ok_with(self.name(), message, data))
        } else {
            Ok(StageResult::failed_with(self.name(), message, data))
        }
    }

    /// Skip when the reports directory already contains files.
    fn can_skip(&self, context: &PipelineContext) -> bool {
        let Some(results_dir) = &context.results_dir else {
            return false;
        };
        let reports_dir = results_dir.join("reports");
        dir_has_files(&reports_dir)
    }
}

fn resolve_report_dir(context: &PipelineContext) -> std::io::Result<PathBuf> {
    let output_dir = if let Some(explicit) = &context.options.report.output {
        explicit.clone()
    } else if let Some(results_dir) = &context.results_dir {
        results_dir.join("reports")
    } else if let Some(repo) = &context.repo_path {
        repo.join("reports")
    } else {
        std::env::current_dir()?.join("reports")
    };
    std::fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

/// Crashes from fuzz results, falling back to the fuzz stage's recorded
/// deduplicated crash list.
fn gather_crashes(context: &PipelineContext) -> Vec<CrashInfo> {
    let mut crashes: Vec<CrashInfo> = context
        .fuzz_results
        .iter()
        .flat_map(|fr| fr.crashes.iter().cloned())
        .collect();

    if crashes.is_empty() {
        for sr in &context.stage_results {
            if sr.stage_name == "fuzz" {
                crashes.extend(sr.data.unique_crashes.iter().cloned());
            }
        }
    }
    crashes
}

/// The coverage report with the most line data.
fn gather_coverage(context: &PipelineContext) -> Option<CoverageReport> {
    context
        .fuzz_results
        .iter()
        .filter_map(|fr| fr.coverage.as_ref())
        .max_by_key(|c| c.lines_total)
        .cloned()
}

fn extension(fmt: &str) -> &str {
    match fmt {
        "json" => "json",
        "sarif" => "sarif",
        "html" => "html",
        "svres" => "svres",
        "csv" => "csv",
        other => other,
    }
}

fn dir_has_files(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() || (path.is_dir() && dir_has_files(&path)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzsmith_core::config::ConfigManager;
    use fuzzsmith_core::registry::ComponentRegistry;
    use fuzzsmith_core::schema::{FunctionInfo, FuzzResult};
    use fuzzsmith_core::traits::Reporter;
    use std::collections::HashMap;

    struct StubReporter;

    impl Reporter for StubReporter {
        fn format_name(&self) -> &str {
            "json"
        }
        fn report_functions(&self, _functions: &[FunctionInfo], output: &Path) -> Result<()> {
            std::fs::write(output, "[]")?;
            Ok(())
        }
        fn report_crashes(&self, _crashes: &[CrashInfo], output: &Path) -> Result<()> {
            std::fs::write(output, "[]")?;
            Ok(())
        }
        fn report_coverage(&self, _coverage: &CoverageReport, output: &Path) -> Result<()> {
            std::fs::write(output, "{}")?;
            Ok(())
        }
    }

    #[test]
    fn test_no_reporters_registered_fails() {
        let registry = ComponentRegistry::new();
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let result = ReportStage
            .execute(&PipelineContext::default(), &deps)
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("No reporter plugins"));
    }

    #[test]
    fn test_writes_function_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ComponentRegistry::new();
        registry.register_reporter("json", || Box::new(StubReporter));
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);

        let mut ctx = PipelineContext {
            results_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        ctx.functions.push(FunctionInfo {
            name: "f".to_string(),
            ..Default::default()
        });

        let result = ReportStage.execute(&ctx, &deps).unwrap();
        assert!(result.success);
        assert_eq!(result.data.written_paths.len(), 1);
        assert!(result.data.written_paths[0].ends_with("json/functions.json"));
        assert!(result.data.written_paths[0].exists());
    }

    #[test]
    fn test_nothing_to_report_is_trivial_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ComponentRegistry::new();
        registry.register_reporter("json", || Box::new(StubReporter));
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let ctx = PipelineContext {
            results_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = ReportStage.execute(&ctx, &deps).unwrap();
        assert!(result.success);
        assert!(result.message.contains("No data to report"));
    }

    #[test]
    fn test_unknown_requested_format_fails_when_none_remain() {
        let mut registry = ComponentRegistry::new();
        registry.register_reporter("json", || Box::new(StubReporter));
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = PipelineContext {
            results_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        ctx.options.report.formats = vec!["html".to_string()];
        let result = ReportStage.execute(&ctx, &deps).unwrap();
        assert!(!result.success);
        assert!(result.message.contains("None of the requested formats"));
    }

    #[test]
    fn test_gather_coverage_picks_largest() {
        let mut ctx = PipelineContext::default();
        for lines_total in [10, 100, 50] {
            ctx.fuzz_results.push(FuzzResult {
                coverage: Some(CoverageReport {
                    lines_total,
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        assert_eq!(gather_coverage(&ctx).unwrap().lines_total, 100);
    }
}
