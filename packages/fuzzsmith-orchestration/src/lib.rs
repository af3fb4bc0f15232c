//! fuzzsmith-orchestration
//!
//! The pipeline engine and the built-in stages, plus the analysis and
//! build helpers they delegate to: CodeQL CLI wrappers, source-context
//! enrichment, LLM-assisted usage-context suggestion, and build-command
//! extraction.

pub mod build_log;
pub mod build_orchestrator;
pub mod codeql;
pub mod context_builder;
pub mod engine;
pub mod error;
pub mod llm_analyze;
pub mod readme;
pub mod stages;
pub mod util;

pub use build_log::BuildLog;
pub use build_orchestrator::{BuildOrchestrator, BuildOutcome};
pub use codeql::CodeQlRunner;
pub use engine::{PipelineConfig, PipelineEngine};
pub use error::{OrchestrationError, Result};
pub use stages::register_stages;
