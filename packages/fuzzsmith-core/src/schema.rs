//! Data model shared by every stage of the harness-generation pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::options::RunOptions;

/// Semantic role attached to a function parameter by upstream analysis.
///
/// Overrides the purely syntactic classification during harness synthesis
/// (e.g. a `const char*` that is actually a file path).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParamRole {
    FilePath,
    FileHandle,
    Callback,
    UserData,
    ConfigPath,
    Url,
    #[default]
    Unknown,
}

impl ParamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamRole::FilePath => "FILE_PATH",
            ParamRole::FileHandle => "FILE_HANDLE",
            ParamRole::Callback => "CALLBACK",
            ParamRole::UserData => "USERDATA",
            ParamRole::ConfigPath => "CONFIG_PATH",
            ParamRole::Url => "URL",
            ParamRole::Unknown => "UNKNOWN",
        }
    }

    /// Parse the wire name used by the analysis queries; anything
    /// unrecognized maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "FILE_PATH" => ParamRole::FilePath,
            "FILE_HANDLE" => ParamRole::FileHandle,
            "CALLBACK" => ParamRole::Callback,
            "USERDATA" => ParamRole::UserData,
            "CONFIG_PATH" => ParamRole::ConfigPath,
            "URL" => ParamRole::Url,
            _ => ParamRole::Unknown,
        }
    }
}

/// One candidate function found by the analysis phase.
///
/// Immutable once produced; later stages only read it or build derived
/// structures from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub return_type: String,
    /// Raw parameter declaration strings, in signature order.
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub includes: Vec<String>,
    /// Surrounding source code, filled in by the context builder.
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub is_api: bool,
    #[serde(default)]
    pub is_fuzz_candidate: bool,
    /// One role per parameter, aligned by index.
    #[serde(default)]
    pub parameter_semantics: Vec<ParamRole>,
}

/// Ordered sequence of function calls for multi-call harness generation.
///
/// Every name in `calls` must reference a known function from the same
/// analysis run; sequences that fail this check are discarded at the
/// parsing boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageContext {
    #[serde(default)]
    pub name: String,
    /// Function names in call order.
    #[serde(default)]
    pub calls: Vec<String>,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub source_line: u32,
    #[serde(default)]
    pub description: String,
}

/// Information about a single fuzzer crash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrashInfo {
    #[serde(default)]
    pub artifact_path: String,
    #[serde(default)]
    pub backtrace: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub warn_class: String,
    #[serde(default)]
    pub crash_file: String,
    #[serde(default)]
    pub crash_line: u32,
}

/// Coverage summary from a fuzzing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    #[serde(default)]
    pub binary_path: String,
    #[serde(default)]
    pub profdata_path: String,
    #[serde(default)]
    pub lines_covered: u64,
    #[serde(default)]
    pub lines_total: u64,
    #[serde(default)]
    pub regions_covered: u64,
    #[serde(default)]
    pub regions_total: u64,
    #[serde(default)]
    pub html_path: String,
    #[serde(default)]
    pub csv_path: String,
}

/// Result of fuzzing one binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzResult {
    #[serde(default)]
    pub binary_path: String,
    #[serde(default)]
    pub corpus_dir: String,
    #[serde(default)]
    pub crashes: Vec<CrashInfo>,
    #[serde(default)]
    pub coverage: Option<CoverageReport>,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub execs_per_sec: f64,
    pub success: bool,
}

impl Default for FuzzResult {
    fn default() -> Self {
        Self {
            binary_path: String::new(),
            corpus_dir: String::new(),
            crashes: Vec::new(),
            coverage: None,
            duration_seconds: 0.0,
            execs_per_sec: 0.0,
            success: true,
        }
    }
}

/// A synthesized fuzz harness.
///
/// `is_valid` and `validation_errors` are kept private so the invariant
/// "non-empty errors implies invalid" holds at all times, not just by
/// convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedHarness {
    pub function_name: String,
    /// File name relative to the harness output directory.
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub source_code: String,
    #[serde(default)]
    pub includes: Vec<String>,
    /// Output subdirectory tag: "api", "usage_contexts", "other", or empty.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub compile_flags: Vec<String>,
    #[serde(default)]
    pub link_flags: Vec<String>,
    #[serde(default)]
    is_valid: bool,
    #[serde(default)]
    validation_errors: Vec<String>,
}

impl GeneratedHarness {
    /// A freshly generated harness, considered valid until validation says
    /// otherwise.
    pub fn new(
        function_name: impl Into<String>,
        file_path: impl Into<String>,
        source_code: impl Into<String>,
        includes: Vec<String>,
        compile_flags: Vec<String>,
        link_flags: Vec<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            file_path: file_path.into(),
            source_code: source_code.into(),
            includes,
            category: String::new(),
            compile_flags,
            link_flags,
            is_valid: true,
            validation_errors: Vec::new(),
        }
    }

    /// A harness that failed to generate; carries the error, no source.
    pub fn invalid(function_name: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            function_name: function_name.into(),
            is_valid: false,
            validation_errors: errors,
            ..Default::default()
        }
    }

    /// Set validity explicitly. Non-empty errors force `is_valid` to false
    /// regardless of the flag.
    pub fn with_validation(mut self, is_valid: bool, errors: Vec<String>) -> Self {
        self.is_valid = is_valid && errors.is_empty();
        self.validation_errors = errors;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    /// Append validation errors; any error marks the harness invalid.
    pub fn record_errors(&mut self, errors: Vec<String>) {
        if !errors.is_empty() {
            self.is_valid = false;
            self.validation_errors.extend(errors);
        }
    }

    /// Mark the harness valid and clear previous validation errors.
    pub fn mark_valid(&mut self) {
        self.is_valid = true;
        self.validation_errors.clear();
    }
}

/// One compiled harness binary, recorded by the compile stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledBinary {
    pub function_name: String,
    pub binary_path: PathBuf,
    pub source_path: PathBuf,
}

/// One harness that failed to compile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileFailure {
    pub function_name: String,
    pub source_path: PathBuf,
    pub error: String,
}

/// Typed payload a stage hands back to the engine.
///
/// The engine's merge step moves the `Option`/list fields onto the matching
/// context fields; everything else stays on the recorded result for
/// diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageData {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub functions: Option<Vec<FunctionInfo>>,
    #[serde(default)]
    pub usage_contexts: Option<Vec<UsageContext>>,
    #[serde(default)]
    pub fuzz_targets_dir: Option<PathBuf>,
    #[serde(default)]
    pub binaries_dir: Option<PathBuf>,
    #[serde(default)]
    pub fuzz_install_prefix: Option<PathBuf>,
    #[serde(default)]
    pub generated_harnesses: Option<Vec<GeneratedHarness>>,
    #[serde(default)]
    pub fuzz_results: Option<Vec<FuzzResult>>,

    // Per-stage diagnostics, kept on the recorded result.
    #[serde(default)]
    pub build_log_file: Option<PathBuf>,
    #[serde(default)]
    pub suggested_fix_command: Option<String>,
    #[serde(default)]
    pub analyze_output: Option<PathBuf>,
    #[serde(default)]
    pub valid_count: Option<usize>,
    #[serde(default)]
    pub written_paths: Vec<PathBuf>,
    #[serde(default)]
    pub compiled: Vec<CompiledBinary>,
    #[serde(default)]
    pub compile_failures: Vec<CompileFailure>,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default)]
    pub binaries_fuzzed: Option<usize>,
    #[serde(default)]
    pub total_crashes: Option<usize>,
    #[serde(default)]
    pub unique_crashes: Vec<CrashInfo>,
    #[serde(default)]
    pub total_duration_seconds: Option<f64>,
    #[serde(default)]
    pub report_output: Option<PathBuf>,
    #[serde(default)]
    pub report_formats: Vec<String>,
    #[serde(default)]
    pub report_errors: Vec<String>,
    #[serde(default)]
    pub stderr_excerpt: Option<String>,
    #[serde(default)]
    pub stdout_excerpt: Option<String>,
}

/// Result produced by a pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: StageData,
}

impl StageResult {
    pub fn ok(stage_name: &str) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with(stage_name: &str, message: impl Into<String>, data: StageData) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failed(stage_name: &str, message: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            success: false,
            message: message.into(),
            data: StageData::default(),
        }
    }

    pub fn failed_with(stage_name: &str, message: impl Into<String>, data: StageData) -> Self {
        Self {
            stage_name: stage_name.to_string(),
            success: false,
            message: message.into(),
            data,
        }
    }
}

/// Mutable context threaded through all pipeline stages.
///
/// Stages read fields written by earlier stages and hand new values back
/// through `StageResult.data`; the engine's merge step is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    #[serde(default)]
    pub repo_path: Option<PathBuf>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    #[serde(default)]
    pub usage_contexts: Vec<UsageContext>,
    #[serde(default)]
    pub fuzz_targets_dir: Option<PathBuf>,
    #[serde(default)]
    pub binaries_dir: Option<PathBuf>,
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default)]
    pub fuzz_install_prefix: Option<PathBuf>,
    #[serde(default)]
    pub generated_harnesses: Vec<GeneratedHarness>,
    #[serde(default)]
    pub fuzz_results: Vec<FuzzResult>,
    #[serde(default)]
    pub stage_results: Vec<StageResult>,
    #[serde(default)]
    pub options: RunOptions,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self {
            repo_path: None,
            db_path: None,
            language: "cpp".to_string(),
            functions: Vec::new(),
            usage_contexts: Vec::new(),
            fuzz_targets_dir: None,
            binaries_dir: None,
            results_dir: None,
            fuzz_install_prefix: None,
            generated_harnesses: Vec::new(),
            fuzz_results: Vec::new(),
            stage_results: Vec::new(),
            options: RunOptions::default(),
        }
    }
}

impl PipelineContext {
    /// Append a stage result and merge its well-known data fields.
    ///
    /// List payloads are *moved* out of the result into the context, so no
    /// two stages ever alias the same list.
    pub fn update(&mut self, mut result: StageResult) {
        let data = &mut result.data;
        if let Some(p) = data.db_path.take() {
            self.db_path = Some(p);
        }
        if let Some(f) = data.functions.take() {
            self.functions = f;
        }
        if let Some(u) = data.usage_contexts.take() {
            self.usage_contexts = u;
        }
        if let Some(d) = data.fuzz_targets_dir.take() {
            self.fuzz_targets_dir = Some(d);
        }
        if let Some(d) = data.binaries_dir.take() {
            self.binaries_dir = Some(d);
        }
        if let Some(p) = data.fuzz_install_prefix.take() {
            self.fuzz_install_prefix = Some(p);
        }
        if let Some(h) = data.generated_harnesses.take() {
            self.generated_harnesses = h;
        }
        if let Some(r) = data.fuzz_results.take() {
            self.fuzz_results = r;
        }
        if let Some(d) = data.results_dir.take() {
            self.results_dir = Some(d);
        }
        self.stage_results.push(result);
    }

    /// Build the final pipeline result. Overall success is the AND of every
    /// recorded stage result; skipped stages contribute nothing.
    pub fn finalize(self) -> PipelineResult {
        PipelineResult {
            success: self.stage_results.iter().all(|r| r.success),
            stage_results: self.stage_results,
            db_path: self.db_path,
            functions: self.functions,
            usage_contexts: self.usage_contexts,
            fuzz_targets_dir: self.fuzz_targets_dir,
            binaries_dir: self.binaries_dir,
            fuzz_results: self.fuzz_results,
        }
    }
}

/// Final result of a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(default)]
    pub stage_results: Vec<StageResult>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    #[serde(default)]
    pub usage_contexts: Vec<UsageContext>,
    #[serde(default)]
    pub fuzz_targets_dir: Option<PathBuf>,
    #[serde(default)]
    pub binaries_dir: Option<PathBuf>,
    #[serde(default)]
    pub fuzz_results: Vec<FuzzResult>,
}

/// Result of a single health check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_invariant_at_construction() {
        let h = GeneratedHarness::default().with_validation(true, vec!["bad".to_string()]);
        assert!(!h.is_valid());

        let h = GeneratedHarness::default().with_validation(true, vec![]);
        assert!(h.is_valid());

        let h = GeneratedHarness::invalid("f", vec!["no source".to_string()]);
        assert!(!h.is_valid());
        assert_eq!(h.validation_errors(), ["no source"]);
    }

    #[test]
    fn test_harness_record_errors_marks_invalid() {
        let mut h = GeneratedHarness::new("f", "harness_f.cpp", "int x;", vec![], vec![], vec![]);
        assert!(h.is_valid());
        h.record_errors(vec!["Unbalanced braces".to_string()]);
        assert!(!h.is_valid());
        h.record_errors(vec![]);
        assert!(!h.is_valid());
        h.mark_valid();
        assert!(h.is_valid());
        assert!(h.validation_errors().is_empty());
    }

    #[test]
    fn test_context_update_merges_well_known_fields() {
        let mut ctx = PipelineContext::default();
        let mut data = StageData::default();
        data.db_path = Some(PathBuf::from("/tmp/db"));
        data.functions = Some(vec![FunctionInfo {
            name: "f".to_string(),
            ..Default::default()
        }]);
        ctx.update(StageResult::ok_with("analyze", "", data));

        assert_eq!(ctx.db_path.as_deref(), Some(std::path::Path::new("/tmp/db")));
        assert_eq!(ctx.functions.len(), 1);
        assert_eq!(ctx.stage_results.len(), 1);
        // Moved, not copied: the recorded result no longer holds the list.
        assert!(ctx.stage_results[0].data.functions.is_none());
    }

    #[test]
    fn test_finalize_success_is_and_of_stage_results() {
        let mut ctx = PipelineContext::default();
        ctx.update(StageResult::ok("a"));
        ctx.update(StageResult::failed("b", "boom"));
        let result = ctx.finalize();
        assert!(!result.success);
        assert_eq!(result.stage_results.len(), 2);
    }

    #[test]
    fn test_finalize_empty_is_success() {
        let result = PipelineContext::default().finalize();
        assert!(result.success);
        assert!(result.stage_results.is_empty());
    }

    #[test]
    fn test_param_role_parse_roundtrip() {
        for role in [
            ParamRole::FilePath,
            ParamRole::FileHandle,
            ParamRole::Callback,
            ParamRole::UserData,
            ParamRole::ConfigPath,
            ParamRole::Url,
        ] {
            assert_eq!(ParamRole::parse(role.as_str()), role);
        }
        assert_eq!(ParamRole::parse("something-else"), ParamRole::Unknown);
    }
}
