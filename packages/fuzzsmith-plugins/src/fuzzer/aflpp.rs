//! AFL++ engine: runs afl-fuzz on instrumented binaries and parses its
//! crash output layout. Requires binaries built with afl-clang-fast.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

use fuzzsmith_core::process::run_with_timeout;
use fuzzsmith_core::schema::{CoverageReport, CrashInfo, FuzzResult};
use fuzzsmith_core::traits::{FuzzOptions, FuzzerEngine};

const KILL_MARGIN: Duration = Duration::from_secs(60);

pub struct AflPlusPlusEngine {
    afl_fuzz_bin: String,
}

impl Default for AflPlusPlusEngine {
    fn default() -> Self {
        Self::from_options(&HashMap::new())
    }
}

impl AflPlusPlusEngine {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        Self {
            afl_fuzz_bin: options
                .get("afl_fuzz_bin")
                .cloned()
                .unwrap_or_else(|| "afl-fuzz".to_string()),
        }
    }
}

impl FuzzerEngine for AflPlusPlusEngine {
    fn name(&self) -> &str {
        "aflpp"
    }

    fn fuzz(&self, binary: &Path, corpus_dir: &Path, options: &FuzzOptions) -> FuzzResult {
        if std::fs::create_dir_all(corpus_dir).is_err() {
            return failed_result(binary, corpus_dir, 0.0);
        }

        // afl-fuzz refuses an empty input directory.
        let is_empty = std::fs::read_dir(corpus_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true);
        if is_empty {
            let _ = std::fs::write(corpus_dir.join("seed_0"), b"AAAA");
        }

        let output_dir: PathBuf = match &options.artifact_prefix {
            Some(prefix) => PathBuf::from(prefix.trim_end_matches('/')),
            None => corpus_dir
                .parent()
                .map(|p| p.join("afl_output"))
                .unwrap_or_else(|| corpus_dir.join("afl_output")),
        };
        let _ = std::fs::create_dir_all(&output_dir);

        // afl-fuzz -t takes milliseconds, -V the total wall-clock seconds.
        let mut cmd = Command::new(&self.afl_fuzz_bin);
        cmd.arg("-i")
            .arg(corpus_dir)
            .arg("-o")
            .arg(&output_dir)
            .arg("-t")
            .arg((options.timeout_secs * 1000).to_string())
            .arg("-V")
            .arg(options.max_total_time_secs.to_string())
            .arg("--")
            .arg(binary)
            .env("AFL_NO_UI", "1")
            .env("AFL_SKIP_CPUFREQ", "1");

        info!("Running AFL++: {} on {}", self.afl_fuzz_bin, binary.display());
        let timeout = Duration::from_secs(options.max_total_time_secs) + KILL_MARGIN;
        match run_with_timeout(&mut cmd, timeout) {
            Ok(out) if out.timed_out => {
                warn!("AFL++ timed out for {}", binary.display());
                failed_result(binary, corpus_dir, options.max_total_time_secs as f64)
            }
            Ok(out) => FuzzResult {
                binary_path: binary.display().to_string(),
                corpus_dir: corpus_dir.display().to_string(),
                success: out.success(),
                duration_seconds: options.max_total_time_secs as f64,
                ..Default::default()
            },
            Err(e) => {
                warn!("afl-fuzz not found ({}): {}", self.afl_fuzz_bin, e);
                failed_result(binary, corpus_dir, 0.0)
            }
        }
    }

    /// AFL++ stores crashes under `<output>/default/crashes/`.
    fn parse_crashes(&self, artifact_dir: &Path) -> Vec<CrashInfo> {
        let mut crash_dirs = vec![artifact_dir.to_path_buf()];
        for sub in ["default/crashes", "crashes"] {
            let candidate = artifact_dir.join(sub);
            if candidate.is_dir() {
                crash_dirs.push(candidate);
            }
        }

        let mut crashes = Vec::new();
        for dir in crash_dirs {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
            paths.sort();
            for path in paths {
                if !path.is_file() {
                    continue;
                }
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if name == "README.txt" {
                    continue;
                }
                if name.starts_with("id:") || name.starts_with("crash-") {
                    crashes.push(CrashInfo {
                        artifact_path: path.display().to_string(),
                        summary: format!("AFL++ crash: {name}"),
                        warn_class: "CRASH".to_string(),
                        ..Default::default()
                    });
                }
            }
        }
        crashes
    }

    /// AFL++ does not produce llvm profdata by default.
    fn get_coverage(&self, binary: &Path, profdata: &Path) -> CoverageReport {
        CoverageReport {
            binary_path: binary.display().to_string(),
            profdata_path: profdata.display().to_string(),
            ..Default::default()
        }
    }
}

fn failed_result(binary: &Path, corpus_dir: &Path, duration: f64) -> FuzzResult {
    FuzzResult {
        binary_path: binary.display().to_string(),
        corpus_dir: corpus_dir.display().to_string(),
        success: false,
        duration_seconds: duration,
        ..Default::default()
    }
}
