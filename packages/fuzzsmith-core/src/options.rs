//! Typed per-stage run options carried on the pipeline context.
//!
//! Each stage reads its own section; cross-cutting collaborators (registry,
//! settings) are passed separately through `StageDeps`, never stored here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub build: BuildOptions,
    pub analyze: AnalyzeOptions,
    pub generate: GenerateOptions,
    pub fuzz_build: FuzzBuildOptions,
    pub compile: CompileOptions,
    pub fuzz: FuzzStageOptions,
    pub report: ReportOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Overwrite an existing analysis database.
    pub overwrite: bool,
    /// Custom build script, relative to the repo root unless absolute.
    pub build_script: Option<PathBuf>,
    /// Extra options appended to the configure invocation.
    pub configure_options: Option<String>,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    /// Optional JSON interchange file for the analysis results.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    pub output: Option<PathBuf>,
    pub use_llm: bool,
    pub max_targets: Option<usize>,
    pub validate: bool,
    /// Full compiler-backed validation instead of structural checks.
    pub full_validate: bool,
    pub write_harnesses: bool,
    /// Place harnesses under per-category subdirectories.
    pub use_subdirs: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            output: None,
            use_llm: true,
            max_targets: None,
            validate: true,
            full_validate: false,
            write_harnesses: true,
            use_subdirs: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzBuildOptions {
    pub install_prefix: Option<PathBuf>,
    pub configure_options: Option<String>,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub output: Option<PathBuf>,
    pub use_llm: bool,
    /// LLM-assisted fix retries; falls back to the config's llm.max_retries.
    pub max_retries: Option<u32>,
    pub compiler: String,
    pub timeout_secs: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: None,
            use_llm: true,
            max_retries: None,
            compiler: "clang++".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzStageOptions {
    /// Engine name override; falls back to the configured fuzzer_engine.
    pub engine: Option<String>,
    pub max_total_time_secs: u64,
    pub timeout_secs: u64,
    pub fork: u32,
    pub rss_limit_mb: u64,
    pub coverage: bool,
    pub results_dir: Option<PathBuf>,
}

impl Default for FuzzStageOptions {
    fn default() -> Self {
        Self {
            engine: None,
            max_total_time_secs: 60,
            timeout_secs: 30,
            fork: 1,
            rss_limit_mb: 2048,
            coverage: true,
            results_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub output: Option<PathBuf>,
    /// Formats to emit; all registered reporters when empty.
    pub formats: Vec<String>,
}
