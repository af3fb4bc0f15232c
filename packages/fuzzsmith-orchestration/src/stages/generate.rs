//! Generate stage: synthesize fuzz harnesses from analyzed functions and
//! usage contexts.

use std::path::Path;
use tracing::{info, warn};

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{PipelineContext, StageData, StageResult};
use fuzzsmith_core::traits::{LlmOptions, PipelineStage, StageDeps};
use fuzzsmith_generation::{HarnessGenerator, SyntaxValidator};

use crate::util::{get_llm_provider, resolve_output_dir};

pub struct GenerateStage;

impl PipelineStage for GenerateStage {
    fn name(&self) -> &str {
        "generate"
    }

    fn depends_on(&self) -> &[&str] {
        &["analyze"]
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult> {
        if context.functions.is_empty() {
            return Ok(StageResult::failed(
                self.name(),
                "No functions in context (run analyze stage first).",
            ));
        }

        let cfg = deps.app();
        let opts = &context.options.generate;

        let output_dir =
            resolve_output_dir(context, opts.output.as_deref(), None, "fuzz_targets")?;

        let llm = if opts.use_llm {
            get_llm_provider(deps)
        } else {
            None
        };
        if let Some(llm) = &llm {
            info!("Using LLM provider: {}", llm.name());
        }

        let llm_options = LlmOptions {
            model: Some(cfg.llm.model.clone()),
            temperature: Some(cfg.llm.temperature),
            max_tokens: None,
        };
        let generator = HarnessGenerator::new(llm.as_deref(), Some(output_dir.clone()))
            .with_llm_options(llm_options);

        info!(
            "Generating harnesses for {} function(s){}",
            context.functions.len(),
            opts.max_targets
                .map(|m| format!(" (max {m})"))
                .unwrap_or_default()
        );
        let mut harnesses = generator.generate_batch(
            &context.functions,
            &context.usage_contexts,
            llm.is_some(),
            opts.max_targets,
            opts.use_subdirs,
        );

        if opts.validate {
            let language = if context.language.is_empty() {
                cfg.language.clone()
            } else {
                context.language.clone()
            };
            let validator = SyntaxValidator::new("clang++", &language, Vec::new());
            if opts.full_validate {
                validator.validate_batch(&mut harnesses);
            } else {
                for harness in harnesses.iter_mut() {
                    validator.quick_validate(harness);
                }
            }
        }

        let valid_count = harnesses.iter().filter(|h| h.is_valid()).count();
        info!("Generated {} harnesses ({} valid)", harnesses.len(), valid_count);

        let mut written_paths = Vec::new();
        if opts.write_harnesses {
            match generator.write_harnesses(&harnesses, Some(&output_dir), opts.use_subdirs) {
                Ok(paths) => {
                    info!("Wrote {} harness files to {}", paths.len(), output_dir.display());
                    written_paths = paths;
                }
                Err(e) => warn!("Failed to write harnesses: {}", e),
            }
        }

        let total = harnesses.len();
        let data = StageData {
            generated_harnesses: Some(harnesses),
            fuzz_targets_dir: Some(output_dir),
            valid_count: Some(valid_count),
            written_paths,
            ..Default::default()
        };
        Ok(StageResult::ok_with(
            self.name(),
            format!("Generated {total} harnesses ({valid_count} valid)"),
            data,
        ))
    }

    /// Skip when harnesses are already in context or the output directory
    /// already contains harness sources.
    fn can_skip(&self, context: &PipelineContext) -> bool {
        if !context.generated_harnesses.is_empty() {
            return true;
        }
        match &context.fuzz_targets_dir {
            Some(dir) if dir.is_dir() => contains_harness_sources(dir),
            _ => false,
        }
    }
}

fn contains_harness_sources(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if contains_harness_sources(&path) {
                return true;
            }
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with("harness_") && name.ends_with(".cpp") {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzsmith_core::config::ConfigManager;
    use fuzzsmith_core::registry::ComponentRegistry;
    use fuzzsmith_core::schema::FunctionInfo;
    use std::collections::HashMap;

    fn make_context(dir: &Path) -> PipelineContext {
        let mut ctx = PipelineContext {
            repo_path: Some(dir.to_path_buf()),
            ..Default::default()
        };
        ctx.functions = vec![FunctionInfo {
            name: "f".to_string(),
            signature: "int f(const char* data, size_t size)".to_string(),
            return_type: "int".to_string(),
            parameters: vec!["const char* data".to_string(), "size_t size".to_string()],
            ..Default::default()
        }];
        ctx
    }

    #[test]
    fn test_no_functions_fails() {
        let registry = ComponentRegistry::new();
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let result = GenerateStage
            .execute(&PipelineContext::default(), &deps)
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("No functions"));
    }

    #[test]
    fn test_template_generation_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ComponentRegistry::new();
        let mgr = ConfigManager::from_sources(None, HashMap::new());
        let deps = StageDeps::new(&registry, &mgr);
        let ctx = make_context(dir.path());

        let result = GenerateStage.execute(&ctx, &deps).unwrap();
        assert!(result.success);
        let harnesses = result.data.generated_harnesses.as_ref().unwrap();
        assert_eq!(harnesses.len(), 1);
        assert!(harnesses[0].is_valid());
        // Length-bounded string consumption, then the two-argument call.
        assert!(harnesses[0].source_code.contains("ConsumeBytesAsString"));
        assert!(harnesses[0].source_code.contains("f(fuzz_data, fuzz_size)"));
        // Files were written under the category subdirectory.
        assert_eq!(result.data.written_paths.len(), 1);
        assert!(result.data.written_paths[0].exists());
    }

    #[test]
    fn test_can_skip_when_harnesses_present() {
        let mut ctx = PipelineContext::default();
        assert!(!GenerateStage.can_skip(&ctx));
        ctx.generated_harnesses = vec![fuzzsmith_core::schema::GeneratedHarness::new(
            "f",
            "harness_f.cpp",
            "x",
            vec![],
            vec![],
            vec![],
        )];
        assert!(GenerateStage.can_skip(&ctx));
    }

    #[test]
    fn test_can_skip_scans_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("api");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("harness_f.cpp"), "// x").unwrap();

        let ctx = PipelineContext {
            fuzz_targets_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(GenerateStage.can_skip(&ctx));
    }
}
