//! SARIF 2.1 reporter: crashes as error results, functions and coverage as
//! informational notes.

use serde_json::{json, Value};
use std::path::Path;

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{CoverageReport, CrashInfo, FunctionInfo};
use fuzzsmith_core::traits::Reporter;

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA: &str =
    "https://docs.oasis-open.org/sarif/sarif/v2.1.0/cos02/schemas/sarif-schema-2.1.0.json";
const TOOL_NAME: &str = "fuzzsmith";

#[derive(Default)]
pub struct SarifReporter;

impl SarifReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for SarifReporter {
    fn format_name(&self) -> &str {
        "sarif"
    }

    fn report_functions(&self, functions: &[FunctionInfo], output: &Path) -> Result<()> {
        let results: Vec<Value> = functions
            .iter()
            .map(|fn_info| {
                json!({
                    "ruleId": "fuzzsmith/function-info",
                    "level": "note",
                    "message": {"text": format!("Function: {}", fn_info.signature)},
                    "locations": [location(&fn_info.file_path, fn_info.line)],
                    "properties": {
                        "name": fn_info.name,
                        "return_type": fn_info.return_type,
                        "parameters": fn_info.parameters,
                        "is_api": fn_info.is_api,
                        "is_fuzz_candidate": fn_info.is_fuzz_candidate,
                    },
                })
            })
            .collect();
        write_sarif(
            results,
            "fuzzsmith/function-info",
            "Extracted function information",
            output,
        )
    }

    fn report_crashes(&self, crashes: &[CrashInfo], output: &Path) -> Result<()> {
        let results: Vec<Value> = crashes
            .iter()
            .map(|crash| {
                let class = if crash.warn_class.is_empty() {
                    "unknown".to_string()
                } else {
                    crash.warn_class.to_lowercase()
                };
                let message = if crash.summary.is_empty() {
                    format!("Crash: {}", crash.warn_class)
                } else {
                    crash.summary.clone()
                };
                let mut result = json!({
                    "ruleId": format!("fuzzsmith/crash/{class}"),
                    "level": "error",
                    "message": {"text": message},
                    "locations": [],
                    "properties": {
                        "warn_class": crash.warn_class,
                        "artifact_path": crash.artifact_path,
                    },
                });
                if !crash.crash_file.is_empty() {
                    result["locations"] = json!([location(&crash.crash_file, crash.crash_line)]);
                }
                if !crash.backtrace.is_empty() {
                    result["properties"]["backtrace"] = json!(crash.backtrace);
                }
                result
            })
            .collect();
        write_sarif(results, "fuzzsmith/crash", "Fuzzer crash report", output)
    }

    fn report_coverage(&self, coverage: &CoverageReport, output: &Path) -> Result<()> {
        let pct = if coverage.lines_total > 0 {
            coverage.lines_covered as f64 / coverage.lines_total as f64 * 100.0
        } else {
            0.0
        };
        let result = json!({
            "ruleId": "fuzzsmith/coverage",
            "level": "note",
            "message": {
                "text": format!(
                    "Coverage: {}/{} lines ({:.1}%)",
                    coverage.lines_covered, coverage.lines_total, pct
                )
            },
            "properties": {
                "binary_path": coverage.binary_path,
                "lines_covered": coverage.lines_covered,
                "lines_total": coverage.lines_total,
                "regions_covered": coverage.regions_covered,
                "regions_total": coverage.regions_total,
            },
        });
        write_sarif(
            vec![result],
            "fuzzsmith/coverage",
            "Code coverage summary",
            output,
        )
    }
}

fn location(file_path: &str, line: u32) -> Value {
    let mut physical = json!({
        "artifactLocation": {"uri": file_path},
    });
    if line > 0 {
        physical["region"] = json!({"startLine": line});
    }
    json!({"physicalLocation": physical})
}

fn write_sarif(results: Vec<Value>, rule_id: &str, rule_desc: &str, output: &Path) -> Result<()> {
    let sarif = json!({
        "version": SARIF_VERSION,
        "$schema": SARIF_SCHEMA,
        "runs": [{
            "tool": {
                "driver": {
                    "name": TOOL_NAME,
                    "rules": [{
                        "id": rule_id,
                        "shortDescription": {"text": rule_desc},
                    }],
                }
            },
            "results": results,
        }],
    });
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, serde_json::to_string_pretty(&sarif)?)?;
    Ok(())
}
