//! Built-in pipeline stages, in default execution order:
//! build, analyze, generate, fuzz_build, compile, fuzz, report.

mod analyze;
mod build;
mod compile;
mod fuzz;
mod fuzz_build;
mod generate;
mod report;

pub use analyze::AnalyzeStage;
pub use build::BuildStage;
pub use compile::CompileStage;
pub use fuzz::FuzzStage;
pub use fuzz_build::FuzzBuildStage;
pub use generate::GenerateStage;
pub use report::ReportStage;

use fuzzsmith_core::registry::ComponentRegistry;

/// Register all built-in stages under their canonical names.
pub fn register_stages(registry: &mut ComponentRegistry) {
    registry.register_stage("build", || Box::new(BuildStage));
    registry.register_stage("analyze", || Box::new(AnalyzeStage));
    registry.register_stage("generate", || Box::new(GenerateStage));
    registry.register_stage("fuzz_build", || Box::new(FuzzBuildStage));
    registry.register_stage("compile", || Box::new(CompileStage));
    registry.register_stage("fuzz", || Box::new(FuzzStage));
    registry.register_stage("report", || Box::new(ReportStage));
}
