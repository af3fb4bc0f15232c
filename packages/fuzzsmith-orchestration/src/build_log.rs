//! Build-stage logging: LLM Q&A, build results, and command transcripts
//! written to a per-run log file so failures can be diagnosed offline.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct BuildLog {
    file: Option<File>,
    path: PathBuf,
    verbose: bool,
}

impl BuildLog {
    /// Open (append) the log file, creating parent directories as needed.
    /// A log file that cannot be opened degrades to tracing-only output.
    pub fn open(path: &Path, verbose: bool) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("Could not open build log {}: {}", path.display(), e);
                None
            }
        };
        Self {
            file,
            path: path.to_path_buf(),
            verbose,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&mut self, message: &str) {
        self.write_line("INFO", message);
        if self.verbose {
            info!("{}", message);
        }
    }

    pub fn warn(&mut self, message: &str) {
        self.write_line("WARNING", message);
        warn!("{}", message);
    }

    pub fn debug(&mut self, message: &str) {
        if self.verbose {
            self.write_line("DEBUG", message);
            debug!("{}", message);
        }
    }

    fn write_line(&mut self, level: &str, message: &str) {
        if let Some(file) = &mut self.file {
            let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(file, "{stamp} [{level}] {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines_are_timestamped_and_leveled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.log");
        let mut log = BuildLog::open(&path, false);
        log.info("build started");
        log.warn("something odd");
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[INFO] build started"));
        assert!(text.contains("[WARNING] something odd"));
    }

    #[test]
    fn test_debug_suppressed_unless_verbose() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.log");
        let mut log = BuildLog::open(&path, false);
        log.debug("hidden");
        drop(log);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("hidden"));

        let mut log = BuildLog::open(&path, true);
        log.debug("shown");
        drop(log);
        assert!(std::fs::read_to_string(&path).unwrap().contains("shown"));
    }
}
