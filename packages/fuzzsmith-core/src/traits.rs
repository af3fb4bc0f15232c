//! Contracts for the five pluggable component kinds.
//!
//! Implementations live in the plugins crate (or downstream code) and are
//! resolved by name through the `ComponentRegistry`.

use std::path::Path;

use crate::config::{AppConfig, ConfigManager};
use crate::error::Result;
use crate::registry::ComponentRegistry;
use crate::schema::{
    CoverageReport, CrashInfo, FunctionInfo, FuzzResult, PipelineContext, StageResult,
    UsageContext,
};

/// Options for a single LLM completion call.
#[derive(Debug, Clone, Default)]
pub struct LlmOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// LLM backend (OpenAI-compatible, Ollama, Anthropic, ...).
pub trait LlmProvider {
    fn name(&self) -> &str;

    /// Send a prompt and return the completion text. Transport and auth
    /// failures surface as errors; callers decide whether that is fatal.
    fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<String>;

    /// Verify the provider is reachable and working.
    fn check_health(&self) -> bool;
}

/// Options for a single fuzzing run.
#[derive(Debug, Clone)]
pub struct FuzzOptions {
    pub timeout_secs: u64,
    pub max_total_time_secs: u64,
    pub fork: u32,
    pub rss_limit_mb: u64,
    pub artifact_prefix: Option<String>,
}

impl Default for FuzzOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_total_time_secs: 60,
            fork: 1,
            rss_limit_mb: 2048,
            artifact_prefix: None,
        }
    }
}

/// Fuzzing engine (libFuzzer, AFL++, ...).
///
/// All methods degrade gracefully: when the underlying tool is absent they
/// return an unsuccessful or empty result rather than an error.
pub trait FuzzerEngine {
    fn name(&self) -> &str;

    /// Run the fuzzer on a binary with an optional seed corpus.
    fn fuzz(&self, binary: &Path, corpus_dir: &Path, options: &FuzzOptions) -> FuzzResult;

    /// Parse crash artifacts from a directory.
    fn parse_crashes(&self, artifact_dir: &Path) -> Vec<CrashInfo>;

    /// Generate a coverage report from profiling data.
    fn get_coverage(&self, binary: &Path, profdata: &Path) -> CoverageReport;
}

/// Language-specific analysis (C/C++, ...).
pub trait LanguageAnalyzer {
    fn language(&self) -> &str;

    /// Extract candidate functions from an analysis database. An empty list
    /// means "no candidates", not an error.
    fn extract_functions(&self, db_path: &Path) -> Result<Vec<FunctionInfo>>;

    /// Extract call-sequence usage contexts from an analysis database.
    fn extract_usage_contexts(&self, _db_path: &Path) -> Result<Vec<UsageContext>> {
        Ok(Vec::new())
    }

    /// Compiler flags for building fuzz targets in this language.
    fn get_compiler_flags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Output format writer (JSON, SARIF, ...). Writes must be idempotent
/// overwrites.
pub trait Reporter {
    fn format_name(&self) -> &str;

    fn report_functions(&self, functions: &[FunctionInfo], output: &Path) -> Result<()>;

    fn report_crashes(&self, crashes: &[CrashInfo], output: &Path) -> Result<()>;

    fn report_coverage(&self, coverage: &CoverageReport, output: &Path) -> Result<()>;

    /// Combined analysis interchange payload:
    /// `{"functions": [...], "usage_contexts": [...]}`. Default: functions
    /// only, for formats without a combined form.
    fn report_analysis(
        &self,
        functions: &[FunctionInfo],
        _usage_contexts: &[UsageContext],
        output: &Path,
    ) -> Result<()> {
        self.report_functions(functions, output)
    }
}

/// Collaborators handed to every stage alongside the context.
pub struct StageDeps<'a> {
    pub registry: &'a ComponentRegistry,
    pub config: &'a ConfigManager,
}

impl<'a> StageDeps<'a> {
    pub fn new(registry: &'a ComponentRegistry, config: &'a ConfigManager) -> Self {
        Self { registry, config }
    }

    pub fn app(&self) -> &AppConfig {
        self.config.config()
    }

    pub fn env(&self) -> &std::collections::HashMap<String, String> {
        self.config.env()
    }
}

/// One named unit of pipeline work.
///
/// Stages report expected failures through an unsuccessful `StageResult`
/// with a human-readable message; only truly unexpected faults are returned
/// as errors, and the engine decides whether those abort the run.
pub trait PipelineStage {
    fn name(&self) -> &str;

    /// Stages that must run before this one. Documentation only: the engine
    /// executes stages in configured order and does not topo-sort.
    fn depends_on(&self) -> &[&str] {
        &[]
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult>;

    /// True when the stage's work product already exists and execution can
    /// be skipped entirely (no stage result is recorded).
    fn can_skip(&self, _context: &PipelineContext) -> bool {
        false
    }
}
