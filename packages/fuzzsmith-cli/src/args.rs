//! Command-line surface: the full pipeline plus one standalone subcommand
//! per stage, mapping `StageResult.success` to the process exit code.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fuzzsmith",
    version,
    about = "Fuzz-harness generation pipeline driven by CodeQL and LLMs"
)]
pub struct Cli {
    /// Path to a YAML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Verify CodeQL, LLM, and fuzzer setup.
    Check {
        /// Show detailed output.
        #[arg(short, long)]
        verbose: bool,
        /// Skip the LLM connectivity check.
        #[arg(long)]
        skip_llm: bool,
        /// Skip the fuzzer engine check.
        #[arg(long)]
        skip_fuzzer: bool,
    },

    /// List registered components.
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },

    /// Run the full pipeline.
    Run {
        #[command(flatten)]
        target: TargetArgs,
        /// Stage names to skip (repeatable).
        #[arg(long = "skip-stage")]
        skip_stages: Vec<String>,
        /// Keep running later stages after a failure.
        #[arg(long)]
        no_stop_on_failure: bool,
        /// Disable LLM use in all stages.
        #[arg(long)]
        no_llm: bool,
        /// Cap the number of generated harnesses.
        #[arg(long)]
        max_targets: Option<usize>,
    },

    /// Create the CodeQL database (build stage only).
    Build {
        #[command(flatten)]
        target: TargetArgs,
        /// Overwrite an existing database.
        #[arg(long)]
        overwrite: bool,
        /// Custom build script, relative to the repo root.
        #[arg(long)]
        build_script: Option<PathBuf>,
        /// Extra options for the configure step.
        #[arg(long)]
        configure_options: Option<String>,
    },

    /// Extract functions from a CodeQL database (analyze stage only).
    Analyze {
        #[command(flatten)]
        target: TargetArgs,
        /// Write the analysis interchange JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate fuzz harnesses (generate stage only).
    Generate {
        #[command(flatten)]
        target: TargetArgs,
        /// Analysis interchange JSON produced by `analyze --output`.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Harness output directory.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Cap the number of generated harnesses.
        #[arg(long)]
        max_targets: Option<usize>,
        /// Template-only generation.
        #[arg(long)]
        no_llm: bool,
        /// Compiler-backed validation instead of structural checks.
        #[arg(long)]
        full_validate: bool,
    },

    /// Rebuild with sanitizers into an install prefix (fuzz_build stage only).
    FuzzBuild {
        #[command(flatten)]
        target: TargetArgs,
        /// Install prefix for the instrumented build.
        #[arg(long)]
        prefix: Option<PathBuf>,
        /// Extra options for the configure step.
        #[arg(long)]
        configure_options: Option<String>,
    },

    /// Compile generated harnesses (compile stage only).
    Compile {
        #[command(flatten)]
        target: TargetArgs,
        /// Directory containing generated harness sources.
        #[arg(long)]
        targets_dir: Option<PathBuf>,
        /// Output directory for compiled binaries.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Disable LLM-assisted compile fixing.
        #[arg(long)]
        no_llm: bool,
    },

    /// Fuzz compiled binaries (fuzz stage only).
    Fuzz {
        #[command(flatten)]
        target: TargetArgs,
        /// Directory containing compiled fuzz binaries.
        #[arg(long)]
        binaries_dir: Option<PathBuf>,
        /// Fuzzer engine override.
        #[arg(long)]
        engine: Option<String>,
        /// Total fuzzing time per binary, in seconds.
        #[arg(long)]
        max_total_time: Option<u64>,
        /// Skip coverage collection.
        #[arg(long)]
        no_coverage: bool,
    },

    /// Write reports (report stage only).
    Report {
        #[command(flatten)]
        target: TargetArgs,
        /// Results directory from the fuzz stage.
        #[arg(long)]
        results_dir: Option<PathBuf>,
        /// Report formats (repeatable); all registered when omitted.
        #[arg(long = "format")]
        formats: Vec<String>,
        /// Report output directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PluginsCommand {
    /// List available components by kind.
    List,
}

/// Target selection shared by the pipeline subcommands.
#[derive(Args)]
pub struct TargetArgs {
    /// Path to the repository to analyze.
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Path to an existing CodeQL database.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Target language.
    #[arg(long)]
    pub language: Option<String>,
}
