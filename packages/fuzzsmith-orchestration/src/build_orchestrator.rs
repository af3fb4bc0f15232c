//! CodeQL database creation with build-command extraction and
//! LLM-assisted error recovery.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use fuzzsmith_core::process::run_with_timeout;
use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

use crate::build_log::BuildLog;
use crate::codeql::{build_command_to_shell, CodeQlRunner};
use crate::readme::{inject_configure_options, ReadmeAnalyzer};

const BUILD_TIMEOUT: Duration = Duration::from_secs(600);
const AUX_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_LLM_ERROR_CHARS: usize = 4000;
const MAX_LOG_ERROR_CHARS: usize = 3000;

/// CodeQL wraps build output in a timestamped channel envelope.
static LOG_ENVELOPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\]\s*\[(?:build-stdout|build-stderr|ERROR)\]\s*",
    )
    .unwrap()
});

static EXIT_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Exit status (\d+)").unwrap());

const ERROR_KEYWORDS: [&str; 14] = [
    "error",
    "Error",
    "fatal",
    "Fatal",
    "not found",
    "failed",
    "Failed",
    "undefined reference",
    "No such file",
    "cannot find",
    "were not found",
    "not found where",
    "No rule to make",
    "missing",
];

/// Outcome of one orchestrated build.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub success: bool,
    pub db_path: Option<PathBuf>,
    pub message: String,
    pub suggested_fix_command: Option<String>,
}

impl BuildOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            db_path: None,
            message: message.into(),
            suggested_fix_command: None,
        }
    }
}

/// Runs `codeql database create` with an extracted build command; on
/// failure, asks the LLM for an environment fix and retries.
pub struct BuildOrchestrator<'a> {
    llm: Option<&'a dyn LlmProvider>,
    runner: CodeQlRunner,
    max_retries: u32,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(llm: Option<&'a dyn LlmProvider>, codeql_bin: &str, max_retries: u32) -> Self {
        Self {
            llm,
            runner: CodeQlRunner::new(codeql_bin),
            max_retries: max_retries.max(1),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        repo_path: &Path,
        db_path: Option<&Path>,
        language: &str,
        overwrite: bool,
        install_prefix: Option<&Path>,
        build_script: Option<&Path>,
        configure_options: Option<&str>,
        log: &mut BuildLog,
    ) -> BuildOutcome {
        if !repo_path.is_dir() {
            return BuildOutcome::failure(format!("Not a directory: {}", repo_path.display()));
        }
        let out_db = db_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo_path.join("codeql-db"));

        // Either a fixed custom script or a generated wrapper script: the
        // CodeQL runner execs the first token of --command, so chained
        // shell commands must go through a script.
        let (full_build_cmd, fixed_script) = match build_script {
            Some(script) => {
                let script_path = if script.is_absolute() {
                    script.to_path_buf()
                } else {
                    repo_path.join(script)
                };
                if !script_path.is_file() {
                    return BuildOutcome::failure(format!(
                        "Build script not found or not a file: {}",
                        script_path.display()
                    ));
                }
                (format!("custom script: {}", script_path.display()), Some(script_path))
            }
            None => {
                let analyzer = ReadmeAnalyzer::new(self.llm);
                let mut commands =
                    analyzer.extract_build_commands(repo_path, install_prefix, log);
                if let Some(opts) = configure_options {
                    commands = inject_configure_options(&commands, opts);
                    log.info(&format!("Configure options applied: {}", opts.trim()));
                }
                (build_command_to_shell(&commands, repo_path), None)
            }
        };

        log.info("=== CodeQL build ===");
        log.info(&format!("Full build command: {full_build_cmd}"));

        if overwrite && fixed_script.is_none() {
            self.run_clean(repo_path, log);
        }

        for attempt in 0..self.max_retries {
            let (command_for_codeql, temp_script) = match &fixed_script {
                Some(path) => (path.display().to_string(), None),
                None => match write_build_script(repo_path, &full_build_cmd) {
                    Ok(path) => (path.display().to_string(), Some(path)),
                    Err(e) => {
                        return BuildOutcome::failure(format!(
                            "Could not write build script: {e}"
                        ))
                    }
                },
            };
            log.info(&format!(
                "Attempt {}/{}: command {}",
                attempt + 1,
                self.max_retries,
                command_for_codeql
            ));

            let run = self.runner.create_database(
                &out_db,
                language,
                &command_for_codeql,
                repo_path,
                overwrite,
                BUILD_TIMEOUT,
            );
            if let Some(script) = &temp_script {
                let _ = std::fs::remove_file(script);
            }

            let output = match run {
                Ok(output) => output,
                Err(e) => {
                    log.warn(&format!("CodeQL invocation failed: {e}"));
                    return BuildOutcome::failure(format!(
                        "CodeQL binary not found or not runnable: {}",
                        self.runner.codeql_bin()
                    ));
                }
            };

            if output.timed_out {
                log.warn(&format!("Build timed out ({}s)", BUILD_TIMEOUT.as_secs()));
                return BuildOutcome::failure(format!(
                    "Build timed out ({}s)",
                    BUILD_TIMEOUT.as_secs()
                ));
            }

            if output.success() {
                log.info("CodeQL build succeeded (exit 0)");
                return BuildOutcome {
                    success: true,
                    db_path: Some(out_db),
                    message: String::new(),
                    suggested_fix_command: None,
                };
            }

            let error_output = combine_output(&output.stderr, &output.stdout, output.status);
            log.warn(&format!("CodeQL build failed (exit {:?})", output.status));
            log.info(&format!(
                "Error output:\n---\n{}\n---",
                truncate(&error_output, MAX_LOG_ERROR_CHARS)
            ));

            let (fix_cmd, llm_error) = self.ask_llm_for_fix(&full_build_cmd, &error_output, log);

            if attempt + 1 >= self.max_retries {
                log.warn("Max retries reached; build failed");
                return BuildOutcome {
                    success: false,
                    db_path: None,
                    message: format_failure_message(
                        &error_output,
                        &full_build_cmd,
                        fix_cmd.as_deref(),
                        llm_error.as_deref(),
                        self.llm.is_some(),
                    ),
                    suggested_fix_command: fix_cmd,
                };
            }

            match fix_cmd {
                Some(ref cmd) => {
                    log.info(&format!("Attempting auto-fix: {cmd}"));
                    if self.run_fix_command(repo_path, cmd, log) {
                        log.info("Fix succeeded; retrying build");
                        continue;
                    }
                    log.warn("Fix command failed; returning suggestion for manual retry");
                    return BuildOutcome {
                        success: false,
                        db_path: None,
                        message: format_failure_message(
                            &error_output,
                            &full_build_cmd,
                            Some(cmd),
                            llm_error.as_deref(),
                            self.llm.is_some(),
                        ),
                        suggested_fix_command: Some(cmd.clone()),
                    };
                }
                None => {
                    log.warn("No fix suggested; build failed");
                    return BuildOutcome {
                        success: false,
                        db_path: None,
                        message: format_failure_message(
                            &error_output,
                            &full_build_cmd,
                            None,
                            llm_error.as_deref(),
                            self.llm.is_some(),
                        ),
                        suggested_fix_command: None,
                    };
                }
            }
        }

        BuildOutcome::failure("Max retries exceeded")
    }

    fn run_clean(&self, repo_path: &Path, log: &mut BuildLog) {
        let analyzer = ReadmeAnalyzer::new(self.llm);
        let clean_cmd = analyzer.extract_clean_command(repo_path);
        if clean_cmd.is_empty() {
            return;
        }
        log.info(&format!("Overwrite requested: running clean first: {clean_cmd}"));
        let mut cmd = Command::new("sh");
        cmd.args(["-c", &clean_cmd]).current_dir(repo_path);
        match run_with_timeout(&mut cmd, AUX_COMMAND_TIMEOUT) {
            Ok(out) if out.success() => log.info("Clean succeeded (exit 0)"),
            Ok(out) => log.warn(&format!(
                "Clean failed (exit {:?}); continuing with build. stderr: {}",
                out.status,
                truncate(&out.stderr, 500)
            )),
            Err(e) => log.warn(&format!("Clean failed: {e}; continuing with build")),
        }
    }

    fn ask_llm_for_fix(
        &self,
        build_cmd: &str,
        error_output: &str,
        log: &mut BuildLog,
    ) -> (Option<String>, Option<String>) {
        let Some(llm) = self.llm else {
            log.info("LLM fix: no LLM configured; skipping");
            return (None, None);
        };
        let error_snippet = condense_error_for_llm(error_output, MAX_LLM_ERROR_CHARS);
        let prompt = format!(
            "The build failed with the following output. Suggest a single shell command to \
             fix the environment, to be run from the project root.\n\n\
             Rules:\n\
             - If \"./configure: not found\" (exit 127) and the project has configure.ac: \
               suggest generating configure first (./buildconf if present, else autoreconf -fi).\n\
             - For other autotools/libtool errors: suggest libtoolize && autoreconf -fi\n\
             - For missing compilers or system libs: suggest apt-get install of the missing package.\n\
             - If no fix is possible, reply with exactly: none\n\n\
             Build command: {build_cmd}\n\n\
             Error output:\n---\n{error_snippet}\n---\n\n\
             Single fix command or \"none\":"
        );
        log.info("LLM fix: asking for fix command");
        match llm.complete(&prompt, &LlmOptions::default()) {
            Ok(out) => {
                let line = out.trim().lines().next().unwrap_or("").trim().to_string();
                let line = strip_fence_markers(&line);
                if line.is_empty() || line.eq_ignore_ascii_case("none") {
                    log.info("LLM fix: suggestion = none");
                    (None, None)
                } else {
                    log.info(&format!("LLM fix suggestion: {line}"));
                    (Some(line), None)
                }
            }
            Err(e) => {
                log.warn(&format!("LLM fix request failed: {e}"));
                (None, Some(e.to_string()))
            }
        }
    }

    fn run_fix_command(&self, repo_path: &Path, fix_cmd: &str, log: &mut BuildLog) -> bool {
        log.info(&format!("Running fix command: {fix_cmd}"));
        let mut cmd = Command::new("sh");
        cmd.args(["-c", fix_cmd]).current_dir(repo_path);
        match run_with_timeout(&mut cmd, AUX_COMMAND_TIMEOUT) {
            Ok(out) if out.success() => {
                log.info("Fix command succeeded (exit 0)");
                true
            }
            Ok(out) => {
                log.warn(&format!(
                    "Fix command failed (exit {:?}): stderr={}",
                    out.status,
                    truncate(&out.stderr, 500)
                ));
                false
            }
            Err(e) => {
                log.warn(&format!("Fix command failed: {e}"));
                false
            }
        }
    }
}

/// Write the chained build command to an executable wrapper script.
fn write_build_script(work_dir: &Path, full_build_cmd: &str) -> std::io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("fuzzsmith_build_")
        .suffix(".sh")
        .tempfile_in(work_dir)?;
    file.write_all(b"#!/bin/sh\nset -e\n")?;
    file.write_all(full_build_cmd.as_bytes())?;
    file.write_all(b"\n")?;
    let (_, path) = file.keep().map_err(|e| e.error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}

fn strip_fence_markers(line: &str) -> String {
    let mut out = line.trim();
    if let Some(rest) = out.strip_prefix("```") {
        out = rest
            .trim_start_matches(|c: char| c.is_alphanumeric())
            .trim();
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest.trim();
    }
    out.to_string()
}

fn combine_output(stderr: &str, stdout: &str, status: Option<i32>) -> String {
    let combined: Vec<&str> = [stderr, stdout]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if combined.is_empty() {
        match status {
            Some(code) => format!("Exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        combined.join("\n")
    }
}

/// Condense raw CodeQL build output for the LLM: strip the log envelope
/// and keep only lines that look like errors.
fn condense_error_for_llm(error_output: &str, max_chars: usize) -> String {
    let mut summary_lines: Vec<String> = Vec::new();
    let mut seen_fatal = false;

    for raw_line in error_output.lines() {
        let line = LOG_ENVELOPE.replace(raw_line, "").trim().to_string();
        if line.is_empty() {
            continue;
        }
        if (line.contains("A fatal error occurred") || line.contains("Exit status")) && !seen_fatal
        {
            let status = EXIT_STATUS
                .captures(&line)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| "non-zero".to_string());
            summary_lines.push(format!("Build failed (exit status {status})."));
            seen_fatal = true;
            continue;
        }
        if line.starts_with("Initializing database")
            || line.starts_with("Running build command")
            || line.starts_with("Running command in")
        {
            continue;
        }
        if ERROR_KEYWORDS.iter().any(|kw| line.contains(kw)) || line.contains("configure:") {
            summary_lines.push(line);
        }
    }

    let condensed = summary_lines.join("\n");
    if condensed.trim().is_empty() {
        let stripped: String = error_output
            .lines()
            .map(|l| LOG_ENVELOPE.replace(l, "").trim().to_string())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        return tail(&stripped, max_chars);
    }
    tail(&condensed, max_chars)
}

fn tail(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let tail: String = text
        .chars()
        .skip(text.chars().count() - max_chars)
        .collect();
    format!("(output truncated; showing last {max_chars} chars)\n{tail}")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn format_failure_message(
    error_output: &str,
    build_cmd: &str,
    llm_suggestion: Option<&str>,
    llm_error: Option<&str>,
    llm_configured: bool,
) -> String {
    let mut lines = vec![
        format!("Build command: {build_cmd:?}"),
        String::new(),
        "Error output:".to_string(),
        "---".to_string(),
        error_output.to_string(),
        "---".to_string(),
    ];
    if llm_configured {
        if let Some(err) = llm_error {
            lines.push(format!(
                "LLM suggestion: request failed ({err}). Check API key, network, and provider config."
            ));
        } else if let Some(fix) = llm_suggestion {
            lines.push(format!("Suggested fix (run manually if you agree): {fix:?}"));
        }
    }
    lines.join("\n")
}
