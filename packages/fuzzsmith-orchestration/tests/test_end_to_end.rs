//! End-to-end pipeline tests: a mock analyze stage feeding the real
//! generate stage through the engine, exercising context merge, batch
//! ordering, and template synthesis.

use std::collections::HashMap;
use std::path::Path;

use fuzzsmith_core::config::ConfigManager;
use fuzzsmith_core::error::Result as CoreResult;
use fuzzsmith_core::registry::ComponentRegistry;
use fuzzsmith_core::schema::{
    FunctionInfo, PipelineContext, StageData, StageResult, UsageContext,
};
use fuzzsmith_core::traits::{PipelineStage, StageDeps};
use fuzzsmith_orchestration::engine::{PipelineConfig, PipelineEngine};
use fuzzsmith_orchestration::stages::GenerateStage;

fn func(name: &str, return_type: &str, params: &[&str]) -> FunctionInfo {
    FunctionInfo {
        name: name.to_string(),
        signature: format!("{return_type} {name}({})", params.join(", ")),
        return_type: return_type.to_string(),
        parameters: params.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// Stands in for the analyze stage: hands the engine a fixed function list
/// and one usage context through StageResult data.
struct FixedAnalyzeStage;

impl PipelineStage for FixedAnalyzeStage {
    fn name(&self) -> &str {
        "analyze"
    }

    fn execute(
        &self,
        _context: &PipelineContext,
        _deps: &StageDeps<'_>,
    ) -> CoreResult<StageResult> {
        let data = StageData {
            functions: Some(vec![
                func("init", "void", &[]),
                func("process", "int", &["uint8_t* buf", "size_t len"]),
                func("cleanup", "void", &[]),
            ]),
            usage_contexts: Some(vec![UsageContext {
                name: "lifecycle".to_string(),
                calls: vec![
                    "init".to_string(),
                    "process".to_string(),
                    "cleanup".to_string(),
                ],
                ..Default::default()
            }]),
            ..Default::default()
        };
        Ok(StageResult::ok_with("analyze", "", data))
    }
}

fn run_pipeline(repo: &Path) -> fuzzsmith_core::schema::PipelineResult {
    let mut registry = ComponentRegistry::new();
    registry.register_stage("analyze", || Box::new(FixedAnalyzeStage));
    registry.register_stage("generate", || Box::new(GenerateStage));

    let mgr = ConfigManager::from_sources(None, HashMap::new());
    let deps = StageDeps::new(&registry, &mgr);
    let engine = PipelineEngine::new(
        &registry,
        PipelineConfig {
            stages: vec!["analyze".to_string(), "generate".to_string()],
            skip_stages: Vec::new(),
            stop_on_failure: true,
        },
    );

    let context = PipelineContext {
        repo_path: Some(repo.to_path_buf()),
        ..Default::default()
    };
    engine.run(context, &deps).unwrap()
}

#[test]
fn test_analyze_then_generate_produces_sequence_harness() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_pipeline(dir.path());

    assert!(result.success);
    assert_eq!(result.stage_results.len(), 2);
    assert_eq!(result.functions.len(), 3);

    // The usage-context harness was written with the three call sites in
    // declared order and a consume-pair for (buf, len).
    let seq_path = dir
        .path()
        .join("fuzz_targets/usage_contexts/harness_seq_lifecycle.cpp");
    assert!(seq_path.is_file(), "missing {}", seq_path.display());
    let source = std::fs::read_to_string(&seq_path).unwrap();

    let init_pos = source.find("init();").unwrap();
    let process_pos = source.find("process(step1_buf, step1_len)").unwrap();
    let cleanup_pos = source.find("cleanup();").unwrap();
    assert!(init_pos < process_pos);
    assert!(process_pos < cleanup_pos);
    assert!(source.contains("size_t step1_len = fdp.ConsumeIntegralInRange<size_t>"));
    assert!(source.contains("ConsumeBytes<uint8_t>(step1_len)"));
}

#[test]
fn test_generated_harnesses_land_in_category_subdirs() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_pipeline(dir.path());
    assert!(result.success);

    // Plain functions land under other/, the sequence under
    // usage_contexts/.
    let other = dir.path().join("fuzz_targets/other");
    assert!(other.join("harness_init.cpp").is_file());
    assert!(other.join("harness_process.cpp").is_file());
    assert!(other.join("harness_cleanup.cpp").is_file());
    assert!(dir
        .path()
        .join("fuzz_targets/usage_contexts/harness_seq_lifecycle.cpp")
        .is_file());
}

#[test]
fn test_single_function_template_harness_consumes_string_with_length() {
    let dir = tempfile::tempdir().unwrap();

    let mut registry = ComponentRegistry::new();
    registry.register_stage("generate", || Box::new(GenerateStage));
    let mgr = ConfigManager::from_sources(None, HashMap::new());
    let deps = StageDeps::new(&registry, &mgr);

    let mut context = PipelineContext {
        repo_path: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    context.functions = vec![func("f", "int", &["const char* data", "size_t size"])];

    let engine = PipelineEngine::new(
        &registry,
        PipelineConfig {
            stages: vec!["generate".to_string()],
            skip_stages: Vec::new(),
            stop_on_failure: true,
        },
    );
    let result = engine.run(context, &deps).unwrap();
    assert!(result.success);

    let source = std::fs::read_to_string(
        dir.path().join("fuzz_targets/other/harness_f.cpp"),
    )
    .unwrap();
    // Length-bounded string consumption, then a two-argument call; reserved
    // parameter names are prefixed.
    let consume_pos = source.find("ConsumeBytesAsString(fuzz_size)").unwrap();
    let call_pos = source.find("f(fuzz_data, fuzz_size)").unwrap();
    assert!(consume_pos < call_pos);
}
