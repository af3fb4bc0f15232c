//! fuzzsmith-core
//!
//! Shared foundation of the fuzzsmith pipeline: the data model threaded
//! between stages, the component registry, the contracts for pluggable
//! components, configuration, and health checks.

pub mod config;
pub mod error;
pub mod health;
pub mod options;
pub mod process;
pub mod registry;
pub mod schema;
pub mod traits;

pub use config::{AppConfig, ConfigManager, FuzzerConfig, LlmConfig, PipelineConfigModel};
pub use error::{CoreError, Result};
pub use health::HealthChecker;
pub use options::RunOptions;
pub use registry::{AvailableComponents, ComponentRegistry};
pub use schema::{
    CompileFailure, CompiledBinary, CoverageReport, CrashInfo, FunctionInfo, FuzzResult,
    GeneratedHarness, HealthCheckResult, ParamRole, PipelineContext, PipelineResult, StageData,
    StageResult, UsageContext,
};
pub use traits::{
    FuzzOptions, FuzzerEngine, LanguageAnalyzer, LlmOptions, LlmProvider, PipelineStage,
    Reporter, StageDeps,
};
