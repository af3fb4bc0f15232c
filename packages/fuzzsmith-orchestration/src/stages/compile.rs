//! Compile stage: compile generated harnesses into instrumented binaries,
//! with LLM-assisted error fixing and capped exponential backoff.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

use fuzzsmith_core::error::Result;
use fuzzsmith_core::process::run_with_timeout;
use fuzzsmith_core::schema::{
    CompileFailure, CompiledBinary, GeneratedHarness, PipelineContext, StageData, StageResult,
};
use fuzzsmith_core::traits::{LlmOptions, LlmProvider, PipelineStage, StageDeps};
use fuzzsmith_generation::sanitize_name;

use crate::util::{get_llm_provider, resolve_output_dir};

const MAX_COMPILER_ERROR_LINES: usize = 10;
const MAX_BACKOFF_SECONDS: u64 = 30;
const MAX_ERROR_OUTPUT_CHARS: usize = 4000;
const MAX_SOURCE_CODE_CHARS: usize = 8000;

const DEFAULT_COMPILE_FLAGS: [&str; 6] = [
    "-fsanitize=fuzzer,address",
    "-fprofile-instr-generate",
    "-fcoverage-mapping",
    "-g",
    "-O1",
    "-fno-omit-frame-pointer",
];

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```\w*\n?").unwrap());

pub struct CompileStage;

impl PipelineStage for CompileStage {
    fn name(&self) -> &str {
        "compile"
    }

    fn depends_on(&self) -> &[&str] {
        &["generate", "fuzz_build"]
    }

    fn execute(&self, context: &PipelineContext, deps: &StageDeps<'_>) -> Result<StageResult> {
        let harnesses = &context.generated_harnesses;
        if harnesses.is_empty() {
            return Ok(StageResult::failed(
                self.name(),
                "No generated harnesses in context (run generate stage first).",
            ));
        }

        let valid: Vec<&GeneratedHarness> = harnesses
            .iter()
            .filter(|h| h.is_valid() && !h.source_code.is_empty())
            .collect();
        if valid.is_empty() {
            return Ok(StageResult::failed(
                self.name(),
                format!(
                    "No valid harnesses to compile ({} total, 0 valid with source).",
                    harnesses.len()
                ),
            ));
        }

        let cfg = deps.app();
        let opts = &context.options.compile;
        let binaries_dir =
            resolve_output_dir(context, opts.output.as_deref(), None, "fuzz_binaries")?;

        // Compiler flags from the language analyzer, falling back to the
        // fixed fuzzing flag set.
        let language = if context.language.is_empty() {
            cfg.language.clone()
        } else {
            context.language.clone()
        };
        let avail = deps.registry.list_available();
        let mut compiler_flags: Vec<String> =
            DEFAULT_COMPILE_FLAGS.iter().map(|s| s.to_string()).collect();
        if avail.language_analyzers.iter().any(|l| l == &language) {
            if let Ok(analyzer) = deps.registry.get_language(&language) {
                let plugin_flags = analyzer.get_compiler_flags();
                if !plugin_flags.is_empty() {
                    info!("Using compiler flags from {} analyzer: {:?}", language, plugin_flags);
                    compiler_flags = plugin_flags;
                }
            }
        }

        let llm = if opts.use_llm {
            get_llm_provider(deps)
        } else {
            None
        };
        if llm.is_some() {
            info!("LLM available for compile-error fixing: {}", cfg.llm_provider);
        }

        let max_retries = opts.max_retries.unwrap_or(cfg.llm.max_retries);
        let timeout = Duration::from_secs(opts.timeout_secs);

        // Link against the instrumented install from the fuzz-build stage.
        let mut link_flags: Vec<String> = Vec::new();
        if let Some(prefix) = &context.fuzz_install_prefix {
            if prefix.is_dir() {
                let lib = prefix.join("lib");
                if lib.is_dir() {
                    link_flags.push(format!("-L{}", lib.display()));
                    link_flags.push(format!("-Wl,-rpath,{}", lib.display()));
                }
                let include = prefix.join("include");
                if include.is_dir() {
                    link_flags.push(format!("-I{}", include.display()));
                }
                info!("Linking against fuzz install prefix: {}", prefix.display());
            }
        }

        let mut compiled: Vec<CompiledBinary> = Vec::new();
        let mut failed: Vec<CompileFailure> = Vec::new();

        for harness in &valid {
            let binary_name = format!("fuzz_{}", sanitize_name(&harness.function_name));
            let binary_path = binaries_dir.join(&binary_name);
            let source_path = binaries_dir.join(format!("{binary_name}.cpp"));
            if let Err(e) = std::fs::write(&source_path, &harness.source_code) {
                failed.push(CompileFailure {
                    function_name: harness.function_name.clone(),
                    source_path,
                    error: e.to_string(),
                });
                continue;
            }

            let mut all_link_flags = link_flags.clone();
            all_link_flags.extend(harness.link_flags.iter().cloned());

            match self.compile_harness(
                &source_path,
                &binary_path,
                &opts.compiler,
                &compiler_flags,
                &harness.compile_flags,
                &all_link_flags,
                llm.as_deref(),
                max_retries,
                timeout,
                harness,
            ) {
                Ok(()) => compiled.push(CompiledBinary {
                    function_name: harness.function_name.clone(),
                    binary_path,
                    source_path,
                }),
                Err(error) => failed.push(CompileFailure {
                    function_name: harness.function_name.clone(),
                    source_path,
                    error,
                }),
            }
        }

        let total = valid.len();
        let ok_count = compiled.len();
        let fail_count = failed.len();
        info!("Compilation done: {}/{} succeeded, {} failed", ok_count, total, fail_count);

        let data = StageData {
            binaries_dir: Some(binaries_dir),
            compiled,
            compile_failures: failed,
            ..Default::default()
        };

        if ok_count == 0 {
            return Ok(StageResult::failed_with(
                self.name(),
                format!("All {total} harnesses failed to compile."),
                data,
            ));
        }
        Ok(StageResult::ok_with(
            self.name(),
            format!("Compiled {ok_count}/{total} harnesses ({fail_count} failed)."),
            data,
        ))
    }

    /// Skip when the binaries directory already holds compiled binaries.
    fn can_skip(&self, context: &PipelineContext) -> bool {
        match &context.binaries_dir {
            Some(dir) if dir.is_dir() => has_executable(dir),
            _ => false,
        }
    }
}

impl CompileStage {
    /// Compile one harness; on failure with an LLM available, ask it for a
    /// corrected source and retry with exponential backoff. Returns the
    /// last compiler error on failure.
    #[allow(clippy::too_many_arguments)]
    fn compile_harness(
        &self,
        source_path: &Path,
        binary_path: &Path,
        compiler: &str,
        compiler_flags: &[String],
        harness_compile_flags: &[String],
        link_flags: &[String],
        llm: Option<&dyn LlmProvider>,
        max_retries: u32,
        timeout: Duration,
        harness: &GeneratedHarness,
    ) -> std::result::Result<(), String> {
        let cmd_display = build_compile_cmd_display(
            compiler,
            source_path,
            binary_path,
            compiler_flags,
            harness_compile_flags,
            link_flags,
        );
        info!("Compiling {}: {}", harness.function_name, cmd_display);

        let compile_once = || -> (bool, String) {
            let mut cmd = Command::new(compiler);
            cmd.args(compiler_flags)
                .args(harness_compile_flags)
                .arg(source_path)
                .arg("-o")
                .arg(binary_path)
                .args(link_flags);
            if let Some(parent) = source_path.parent() {
                cmd.current_dir(parent);
            }
            match run_with_timeout(&mut cmd, timeout) {
                Ok(out) if out.timed_out => {
                    (false, format!("Compilation timed out ({}s)", timeout.as_secs()))
                }
                Ok(out) if out.success() => (true, String::new()),
                Ok(out) => (false, out.error_text()),
                Err(e) => (false, format!("Compiler not found: {compiler} ({e})")),
            }
        };

        let (ok, stderr) = compile_once();
        if ok {
            return Ok(());
        }
        let mut last_error = stderr;
        warn!(
            "Compilation failed for {}: {:?}",
            harness.function_name,
            parse_compiler_errors(&last_error)
        );

        let Some(llm) = llm else {
            return Err(last_error);
        };
        if max_retries < 1 {
            return Err(last_error);
        }

        let mut current_source = harness.source_code.clone();
        for attempt in 0..max_retries {
            let backoff = (1u64 << attempt.min(62)).min(MAX_BACKOFF_SECONDS);
            info!(
                "Retry {}/{} for {} (backoff {}s)",
                attempt + 1,
                max_retries,
                harness.function_name,
                backoff
            );
            std::thread::sleep(Duration::from_secs(backoff));

            let Some(fixed_source) =
                ask_llm_for_fix(llm, &cmd_display, source_path, &last_error, &current_source)
            else {
                warn!("LLM could not fix {}; stopping retries", harness.function_name);
                break;
            };

            if std::fs::write(source_path, &fixed_source).is_err() {
                break;
            }
            current_source = fixed_source;

            let (ok, stderr) = compile_once();
            if ok {
                info!(
                    "LLM fix succeeded for {} on retry {}",
                    harness.function_name,
                    attempt + 1
                );
                return Ok(());
            }
            last_error = stderr;
            warn!("Retry {} failed for {}", attempt + 1, harness.function_name);
        }

        Err(last_error)
    }
}

fn build_compile_cmd_display(
    compiler: &str,
    source_path: &Path,
    binary_path: &Path,
    compiler_flags: &[String],
    harness_compile_flags: &[String],
    link_flags: &[String],
) -> String {
    let mut parts: Vec<String> = vec![compiler.to_string()];
    parts.extend(compiler_flags.iter().cloned());
    parts.extend(harness_compile_flags.iter().cloned());
    parts.push(source_path.display().to_string());
    parts.push("-o".to_string());
    parts.push(binary_path.display().to_string());
    parts.extend(link_flags.iter().cloned());
    parts.join(" ")
}

/// Ask the LLM to fix a compilation error; `None` when it declines or the
/// response fails the sanity check.
fn ask_llm_for_fix(
    llm: &dyn LlmProvider,
    compile_cmd: &str,
    source_file: &Path,
    error_output: &str,
    source_code: &str,
) -> Option<String> {
    let error_capped: String = error_output.chars().take(MAX_ERROR_OUTPUT_CHARS).collect();
    let source_capped: String = source_code.chars().take(MAX_SOURCE_CODE_CHARS).collect();
    let prompt = format!(
        "A fuzz harness failed to compile. Suggest an edited version of the\n\
         source that fixes the error.  Return ONLY the corrected C/C++ source\n\
         (no markdown fences, no explanation).  If unfixable, reply with exactly: UNFIXABLE\n\n\
         Compiler command: {compile_cmd}\n\n\
         Source file: {source_file}\n\n\
         Error output:\n---\n{error_capped}\n---\n\n\
         Original source:\n```\n{source_capped}\n```\n\n\
         Corrected source:",
        source_file = source_file.display(),
    );

    let response = match llm.complete(&prompt, &LlmOptions::default()) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("LLM compile-fix request failed: {}", e);
            return None;
        }
    };
    if response.is_empty() || response.to_uppercase() == "UNFIXABLE" {
        return None;
    }

    let mut cleaned = response;
    if cleaned.starts_with("```") {
        cleaned = FENCE_OPEN.replace(&cleaned, "").into_owned();
    }
    if cleaned.ends_with("```") {
        cleaned = cleaned
            .rsplit_once("```")
            .map(|(head, _)| head.to_string())
            .unwrap_or(cleaned);
    }
    let cleaned = cleaned.trim().to_string();

    // Sanity: a plausible harness must keep its entry point.
    if !cleaned.contains("LLVMFuzzerTestOneInput") && !cleaned.contains("int main") {
        return None;
    }
    Some(cleaned)
}

/// Short error lines from compiler output, capped to keep prompts small.
fn parse_compiler_errors(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("error:") || lower.contains("fatal error:")
        })
        .map(|line| line.trim().to_string())
        .take(MAX_COMPILER_ERROR_LINES)
        .collect()
}

fn has_executable(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .flatten()
        .any(|e| e.path().is_file() && e.path().extension().is_none())
}
