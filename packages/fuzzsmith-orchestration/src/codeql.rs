//! Thin wrappers around the CodeQL CLI: database creation, query
//! execution, and BQRS decoding.
//!
//! CodeQL is an external collaborator; everything here is subprocess glue
//! with bounded timeouts, and failures surface as captured output rather
//! than faults.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use fuzzsmith_core::process::{run_with_timeout, CommandOutput};

use crate::error::{OrchestrationError, Result};
use crate::util::shell_quote;

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(600);
const DECODE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct CodeQlRunner {
    codeql_bin: String,
}

impl CodeQlRunner {
    pub fn new(codeql_bin: &str) -> Self {
        Self {
            codeql_bin: codeql_bin.to_string(),
        }
    }

    pub fn codeql_bin(&self) -> &str {
        &self.codeql_bin
    }

    /// `codeql database create <db> --language=<lang> --command=<cmd> ...`
    pub fn create_database(
        &self,
        db_path: &Path,
        language: &str,
        build_command: &str,
        source_root: &Path,
        overwrite: bool,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.codeql_bin);
        cmd.arg("database")
            .arg("create")
            .arg(db_path)
            .arg("--language")
            .arg(language)
            .arg("--command")
            .arg(build_command)
            .arg("--source-root")
            .arg(source_root);
        if overwrite {
            cmd.arg("--overwrite");
        }
        cmd.current_dir(source_root);
        Ok(run_with_timeout(&mut cmd, timeout)?)
    }

    /// `codeql database run-queries [--search-path=...] -- <db> <query>...`
    ///
    /// Results land in the database's results directory; read them with
    /// `decode_bqrs`.
    pub fn run_queries(
        &self,
        db_path: &Path,
        query_paths: &[PathBuf],
        timeout: Duration,
        search_path: Option<&[PathBuf]>,
    ) -> Result<CommandOutput> {
        if !db_path.is_dir() {
            return Err(OrchestrationError::Analysis(format!(
                "CodeQL database not found: {}",
                db_path.display()
            )));
        }
        for q in query_paths {
            if !q.exists() {
                return Err(OrchestrationError::Analysis(format!(
                    "Query path not found: {}",
                    q.display()
                )));
            }
        }

        let mut cmd = Command::new(&self.codeql_bin);
        cmd.arg("database").arg("run-queries");
        if let Some(paths) = search_path {
            let joined = paths
                .iter()
                .filter(|p| p.exists())
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(":");
            if !joined.is_empty() {
                cmd.arg(format!("--search-path={joined}"));
            }
        }
        cmd.arg("--").arg(db_path);
        for q in query_paths {
            cmd.arg(q);
        }
        Ok(run_with_timeout(&mut cmd, timeout)?)
    }

    /// Decode a BQRS result file to headerless CSV text; empty string on
    /// decode failure.
    pub fn decode_bqrs(&self, bqrs_path: &Path) -> String {
        let mut cmd = Command::new(&self.codeql_bin);
        cmd.args(["bqrs", "decode", "--format=csv", "--no-titles", "--"])
            .arg(bqrs_path);
        match run_with_timeout(&mut cmd, DECODE_TIMEOUT) {
            Ok(out) if out.success() => out.stdout,
            _ => String::new(),
        }
    }

    /// All BQRS files under the database's results directory.
    pub fn find_bqrs_files(db_path: &Path) -> Vec<PathBuf> {
        let results_dir = db_path.join("results");
        let mut found = Vec::new();
        if results_dir.is_dir() {
            collect_bqrs(&results_dir, &mut found);
        }
        found.sort();
        found
    }
}

fn collect_bqrs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_bqrs(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "bqrs") {
            out.push(path);
        }
    }
}

/// Turn a list of build commands into one shell command run from `work_dir`.
pub fn build_command_to_shell(build_commands: &[String], work_dir: &Path) -> String {
    let cd = format!("cd {}", shell_quote(&work_dir.to_string_lossy()));
    if build_commands.is_empty() {
        return format!("{cd} && make");
    }
    let mut parts = vec![cd];
    parts.extend(build_commands.iter().cloned());
    parts.join(" && ")
}
