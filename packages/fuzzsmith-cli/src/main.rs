//! fuzzsmith CLI: drives the pipeline engine or a single stage and maps
//! the stage outcome to the process exit code.

mod args;

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use fuzzsmith_core::config::ConfigManager;
use fuzzsmith_core::health::HealthChecker;
use fuzzsmith_core::registry::ComponentRegistry;
use fuzzsmith_core::schema::{FunctionInfo, GeneratedHarness, PipelineContext, UsageContext};
use fuzzsmith_core::traits::StageDeps;
use fuzzsmith_orchestration::engine::{PipelineConfig, PipelineEngine};
use fuzzsmith_plugins::register_builtins;

use args::{Cli, Command, PluginsCommand, TargetArgs};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = ConfigManager::load(cli.config.as_deref());
    let mut registry = ComponentRegistry::new();
    register_builtins(&mut registry);

    match dispatch(cli.command, &registry, &config) {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(
    command: Command,
    registry: &ComponentRegistry,
    config: &ConfigManager,
) -> Result<bool> {
    match command {
        Command::Check {
            verbose,
            skip_llm,
            skip_fuzzer,
        } => {
            let checker = HealthChecker::new(config, registry);
            let results = checker.check_all(skip_llm, skip_fuzzer);
            let all_ok = results.iter().all(|r| r.ok);
            for result in &results {
                let status = if result.ok { "OK" } else { "FAIL" };
                println!("  {}: {}", result.name, status);
                if verbose || !result.ok {
                    println!("    {}", result.message);
                }
            }
            if all_ok {
                println!("All checks passed.");
            } else {
                eprintln!("Some checks failed.");
            }
            Ok(all_ok)
        }

        Command::Plugins { command } => match command {
            PluginsCommand::List => {
                let avail = registry.list_available();
                println!("Available components:");
                for (label, names) in [
                    ("Llm Providers", &avail.llm_providers),
                    ("Fuzzer Engines", &avail.fuzzer_engines),
                    ("Language Analyzers", &avail.language_analyzers),
                    ("Reporters", &avail.reporters),
                    ("Stages", &avail.stages),
                ] {
                    let joined = if names.is_empty() {
                        "(none)".to_string()
                    } else {
                        names.join(", ")
                    };
                    println!("  {label}: {joined}");
                }
                Ok(true)
            }
        },

        Command::Run {
            target,
            skip_stages,
            no_stop_on_failure,
            no_llm,
            max_targets,
        } => {
            let mut context = base_context(&target, config);
            if no_llm {
                context.options.generate.use_llm = false;
                context.options.compile.use_llm = false;
            }
            context.options.generate.max_targets = max_targets;

            let mut pipeline_config = PipelineConfig::from(&config.config().pipeline);
            pipeline_config.skip_stages.extend(skip_stages);
            if no_stop_on_failure {
                pipeline_config.stop_on_failure = false;
            }

            let deps = StageDeps::new(registry, config);
            let engine = PipelineEngine::new(registry, pipeline_config);
            let result = engine.run(context, &deps)?;

            for stage_result in &result.stage_results {
                let status = if stage_result.success { "ok" } else { "FAILED" };
                let message = if stage_result.message.is_empty() {
                    String::new()
                } else {
                    format!(" - {}", stage_result.message)
                };
                println!("  {}: {}{}", stage_result.stage_name, status, message);
            }
            if !result.success {
                if let Some(failed) = result.stage_results.iter().find(|r| !r.success) {
                    eprintln!("{}", failed.message);
                }
            }
            Ok(result.success)
        }

        Command::Build {
            target,
            overwrite,
            build_script,
            configure_options,
        } => {
            let mut context = base_context(&target, config);
            context.options.build.overwrite = overwrite;
            context.options.build.build_script = build_script;
            context.options.build.configure_options = configure_options;
            run_single_stage("build", context, registry, config)
        }

        Command::Analyze { target, output } => {
            let mut context = base_context(&target, config);
            context.options.analyze.output = output;
            run_single_stage("analyze", context, registry, config)
        }

        Command::Generate {
            target,
            input,
            output,
            max_targets,
            no_llm,
            full_validate,
        } => {
            let mut context = base_context(&target, config);
            if let Some(input) = &input {
                let (functions, usage_contexts) = load_analysis(input)?;
                context.functions = functions;
                context.usage_contexts = usage_contexts;
            }
            context.options.generate.output = output;
            context.options.generate.max_targets = max_targets;
            context.options.generate.use_llm = !no_llm;
            context.options.generate.full_validate = full_validate;
            run_single_stage("generate", context, registry, config)
        }

        Command::FuzzBuild {
            target,
            prefix,
            configure_options,
        } => {
            let mut context = base_context(&target, config);
            context.options.fuzz_build.install_prefix = prefix;
            context.options.fuzz_build.configure_options = configure_options;
            run_single_stage("fuzz_build", context, registry, config)
        }

        Command::Compile {
            target,
            targets_dir,
            output,
            no_llm,
        } => {
            let mut context = base_context(&target, config);
            let targets_dir = targets_dir
                .or_else(|| context.repo_path.as_ref().map(|r| r.join("fuzz_targets")));
            if let Some(dir) = &targets_dir {
                context.generated_harnesses = load_harness_sources(dir)?;
                context.fuzz_targets_dir = Some(dir.clone());
            }
            context.options.compile.output = output;
            context.options.compile.use_llm = !no_llm;
            run_single_stage("compile", context, registry, config)
        }

        Command::Fuzz {
            target,
            binaries_dir,
            engine,
            max_total_time,
            no_coverage,
        } => {
            let mut context = base_context(&target, config);
            context.binaries_dir =
                binaries_dir.or_else(|| context.repo_path.as_ref().map(|r| r.join("fuzz_binaries")));
            context.options.fuzz.engine = engine;
            if let Some(secs) = max_total_time {
                context.options.fuzz.max_total_time_secs = secs;
            }
            if no_coverage {
                context.options.fuzz.coverage = false;
            }
            run_single_stage("fuzz", context, registry, config)
        }

        Command::Report {
            target,
            results_dir,
            formats,
            output,
        } => {
            let mut context = base_context(&target, config);
            context.results_dir = results_dir;
            context.options.report.formats = formats;
            context.options.report.output = output;
            run_single_stage("report", context, registry, config)
        }
    }
}

fn base_context(target: &TargetArgs, config: &ConfigManager) -> PipelineContext {
    PipelineContext {
        repo_path: target.repo.clone(),
        db_path: target.db.clone(),
        language: target
            .language
            .clone()
            .unwrap_or_else(|| config.config().language.clone()),
        ..Default::default()
    }
}

/// Run exactly one stage against a minimal context; the stage's success
/// flag becomes the exit code.
fn run_single_stage(
    stage_name: &str,
    mut context: PipelineContext,
    registry: &ComponentRegistry,
    config: &ConfigManager,
) -> Result<bool> {
    let deps = StageDeps::new(registry, config);
    let stage = registry.get_stage(stage_name)?;
    let result = stage.execute(&context, &deps)?;
    let success = result.success;
    let message = result.message.clone();
    context.update(result);

    if success {
        if !message.is_empty() {
            println!("{message}");
        }
    } else {
        eprintln!("{message}");
    }
    Ok(success)
}

/// Load the analysis interchange payload written by `analyze --output`.
fn load_analysis(path: &Path) -> Result<(Vec<FunctionInfo>, Vec<UsageContext>)> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let functions = serde_json::from_value(value["functions"].clone()).unwrap_or_default();
    let usage_contexts =
        serde_json::from_value(value["usage_contexts"].clone()).unwrap_or_default();
    Ok((functions, usage_contexts))
}

/// Reconstruct harness records from previously written source files so the
/// compile stage can run standalone.
fn load_harness_sources(dir: &Path) -> Result<Vec<GeneratedHarness>> {
    let mut harnesses = Vec::new();
    collect_harnesses(dir, &mut harnesses)?;
    harnesses.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    Ok(harnesses)
}

fn collect_harnesses(dir: &Path, out: &mut Vec<GeneratedHarness>) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_harnesses(&path, out)?;
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("harness_") || !name.ends_with(".cpp") {
            continue;
        }
        let source_code = std::fs::read_to_string(&path)?;
        let function_name = name
            .trim_start_matches("harness_")
            .trim_start_matches("seq_")
            .trim_end_matches(".cpp")
            .to_string();
        out.push(GeneratedHarness::new(
            function_name,
            name,
            source_code,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ));
    }
    Ok(())
}
