//! JSON reporter: functions, usage contexts, crashes, and coverage as
//! plain JSON; also the analysis interchange payload used between the
//! analyze and generate stages when run as separate invocations.

use serde_json::json;
use std::path::Path;

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{CoverageReport, CrashInfo, FunctionInfo, UsageContext};
use fuzzsmith_core::traits::Reporter;

#[derive(Default)]
pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }
}

fn write_pretty<T: serde::Serialize>(value: &T, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

impl Reporter for JsonReporter {
    fn format_name(&self) -> &str {
        "json"
    }

    fn report_functions(&self, functions: &[FunctionInfo], output: &Path) -> Result<()> {
        write_pretty(&functions, output)
    }

    fn report_crashes(&self, crashes: &[CrashInfo], output: &Path) -> Result<()> {
        write_pretty(&crashes, output)
    }

    fn report_coverage(&self, coverage: &CoverageReport, output: &Path) -> Result<()> {
        write_pretty(coverage, output)
    }

    fn report_analysis(
        &self,
        functions: &[FunctionInfo],
        usage_contexts: &[UsageContext],
        output: &Path,
    ) -> Result<()> {
        let payload = json!({
            "functions": functions,
            "usage_contexts": usage_contexts,
        });
        write_pretty(&payload, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_interchange_shape() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("analysis.json");
        let reporter = JsonReporter::new();
        let functions = vec![FunctionInfo {
            name: "f".to_string(),
            ..Default::default()
        }];
        let contexts = vec![UsageContext {
            name: "seq".to_string(),
            calls: vec!["f".to_string()],
            ..Default::default()
        }];
        reporter
            .report_analysis(&functions, &contexts, &output)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value["functions"][0]["name"], "f");
        assert_eq!(value["usage_contexts"][0]["calls"][0], "f");
    }

    #[test]
    fn test_overwrite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("crashes.json");
        let reporter = JsonReporter::new();
        reporter.report_crashes(&[], &output).unwrap();
        reporter.report_crashes(&[], &output).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "[]");
    }
}
