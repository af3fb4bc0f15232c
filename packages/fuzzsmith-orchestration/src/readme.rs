//! Build-command extraction: build-system file detection first, then LLM
//! extraction from README/INSTALL docs, then keyword heuristics.

use std::path::Path;
use tracing::warn;

use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

use crate::build_log::BuildLog;

const DOC_CANDIDATES: [&str; 8] = [
    "README.md",
    "README",
    "INSTALL.md",
    "INSTALL",
    "BUILD.md",
    "BUILD",
    "README.rst",
    "CONTRIBUTING.md",
];

const MAX_DOC_CHARS: usize = 8000;

pub struct ReadmeAnalyzer<'a> {
    llm: Option<&'a dyn LlmProvider>,
}

impl<'a> ReadmeAnalyzer<'a> {
    pub fn new(llm: Option<&'a dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Return build commands to run in sequence from the repo root.
    ///
    /// With `install_prefix` set, configure/cmake/meson get the prefix and
    /// an install step is appended for the later linking stage.
    pub fn extract_build_commands(
        &self,
        repo_path: &Path,
        install_prefix: Option<&Path>,
        log: &mut BuildLog,
    ) -> Vec<String> {
        if !repo_path.is_dir() {
            return vec!["make".to_string()];
        }

        let prefix = install_prefix.map(|p| p.to_string_lossy().into_owned());
        let prefix = prefix.as_deref();

        let mut cmd = detect_build_from_files(repo_path, prefix, log);
        if cmd.is_empty() {
            let docs = self.gather_docs(repo_path, log);
            if self.llm.is_some() {
                cmd = self.extract_via_llm(&docs, log);
            }
            if cmd.is_empty() {
                cmd = extract_heuristic(&docs, prefix, log);
            }
        }
        if cmd.is_empty() {
            cmd = default_make(prefix);
        }

        let commands: Vec<String> = cmd
            .split(" && ")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        log.info(&format!("Build commands: {commands:?}"));
        commands
    }

    /// Infer a clean command for use with --overwrite; empty when unknown.
    pub fn extract_clean_command(&self, repo_path: &Path) -> String {
        if !repo_path.is_dir() {
            return String::new();
        }
        let configure = repo_path.join("configure");
        let has_autotools = repo_path.join("configure.ac").is_file()
            || repo_path.join("Makefile.am").is_file();
        let autogen = repo_path.join("autogen.sh");

        if configure.is_file() {
            return "make clean".to_string();
        }
        if has_autotools && autogen.is_file() {
            return "make clean".to_string();
        }
        if repo_path.join("meson.build").is_file() {
            return "ninja -C build -t clean".to_string();
        }
        if repo_path.join("CMakeLists.txt").is_file() && !has_autotools {
            return "cmake --build build --target clean".to_string();
        }
        // Safe no-op when there is no Makefile.
        "make clean".to_string()
    }

    fn gather_docs(&self, repo_path: &Path, log: &mut BuildLog) -> String {
        let mut parts = Vec::new();
        let mut found = Vec::new();
        for name in DOC_CANDIDATES {
            let path = repo_path.join(name);
            if !path.is_file() {
                continue;
            }
            if let Ok(text) = std::fs::read_to_string(&path) {
                if !text.trim().is_empty() {
                    let capped: String = text.chars().take(MAX_DOC_CHARS).collect();
                    parts.push(format!("--- {name} ---\n{capped}"));
                    found.push(name);
                }
            }
        }
        log.info(&format!("README analysis: gathered docs from {found:?}"));
        if parts.is_empty() {
            "No README or INSTALL found.".to_string()
        } else {
            parts.join("\n\n")
        }
    }

    fn extract_via_llm(&self, docs: &str, log: &mut BuildLog) -> String {
        let Some(llm) = self.llm else {
            return String::new();
        };
        let prompt = format!(
            "You are analyzing a software project's documentation to extract the exact \
             build/compile steps.\n\n\
             Given the following documentation content, output ONLY a single shell command \
             (or commands joined by \" && \") that would build this project from the \
             repository root. Assume we are already in the project root directory. Do not \
             include \"cd\" into the project. Output nothing else except the command(s).\n\n\
             Documentation:\n---\n{docs}\n---\n\n\
             Single build command (or \"cmd1 && cmd2\"):"
        );
        log.info("README analysis: using LLM to extract build command");
        match llm.complete(&prompt, &LlmOptions::default()) {
            Ok(out) => {
                let line = strip_fences(out.lines().next().unwrap_or("").trim());
                if !line.is_empty() {
                    log.info(&format!("LLM extracted build command: {line}"));
                }
                line
            }
            Err(e) => {
                warn!("LLM build extraction failed: {}", e);
                log.warn(&format!("LLM build extraction failed: {e}"));
                String::new()
            }
        }
    }
}

/// Detect the build system from repo files.
fn detect_build_from_files(repo_path: &Path, prefix: Option<&str>, log: &mut BuildLog) -> String {
    let configure = repo_path.join("configure");
    let has_configure_ac = repo_path.join("configure.ac").is_file();
    let has_makefile_am = repo_path.join("Makefile.am").is_file();
    let autogen = repo_path.join("autogen.sh");

    // Autotools with a shipped configure script.
    if configure.is_file() {
        let mut cmd = configure_cmd(prefix);
        cmd.push_str(" && make");
        if prefix.is_some() {
            cmd.push_str(" && make install");
        }
        log.info(&format!("README analysis: file-based (configure exists) -> {cmd}"));
        return cmd;
    }

    // Autotools from git: regenerate configure first.
    if (has_configure_ac || has_makefile_am) && autogen.is_file() {
        let mut cmd = format!("./autogen.sh && {}", configure_cmd(prefix));
        cmd.push_str(" && make");
        if prefix.is_some() {
            cmd.push_str(" && make install");
        }
        log.info(&format!("README analysis: file-based (autogen.sh) -> {cmd}"));
        return cmd;
    }

    if repo_path.join("meson.build").is_file() {
        let mut cmd = meson_cmd(prefix);
        cmd.push_str(" && ninja -C build");
        if prefix.is_some() {
            cmd.push_str(" && ninja -C build install");
        }
        log.info(&format!("README analysis: file-based (meson.build) -> {cmd}"));
        return cmd;
    }

    if repo_path.join("CMakeLists.txt").is_file() && !has_configure_ac && !configure.exists() {
        let mut cmd = cmake_cmd(prefix);
        if prefix.is_some() {
            cmd.push_str(" && make install");
        }
        log.info(&format!("README analysis: file-based (CMakeLists.txt) -> {cmd}"));
        return cmd;
    }

    String::new()
}

/// Keyword fallback over gathered documentation.
fn extract_heuristic(docs: &str, prefix: Option<&str>, log: &mut BuildLog) -> String {
    let docs_lower = docs.to_lowercase();
    let cmd = if docs_lower.contains("cmake") && docs_lower.contains("build") {
        let mut cmd = cmake_cmd(prefix);
        if prefix.is_some() {
            cmd.push_str(" && make install");
        }
        cmd
    } else if docs_lower.contains("meson") {
        let mut cmd = meson_cmd(prefix);
        cmd.push_str(" && ninja -C build");
        if prefix.is_some() {
            cmd.push_str(" && ninja -C build install");
        }
        cmd
    } else if docs_lower.contains("autoconf") || docs_lower.contains("configure") {
        let mut cmd = format!("{} && make", configure_cmd(prefix));
        if prefix.is_some() {
            cmd.push_str(" && make install");
        }
        cmd
    } else {
        default_make(prefix)
    };
    log.info(&format!("README analysis: using heuristic -> {cmd}"));
    cmd
}

/// Append configure options to the first configure step, if any.
pub fn inject_configure_options(build_commands: &[String], configure_options: &str) -> Vec<String> {
    let opts = configure_options.trim();
    if opts.is_empty() {
        return build_commands.to_vec();
    }
    let mut result = build_commands.to_vec();
    for cmd in result.iter_mut() {
        let s = cmd.trim();
        if s.starts_with("./configure") || s == "configure" {
            cmd.push(' ');
            cmd.push_str(opts);
            break;
        }
    }
    result
}

fn configure_cmd(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("./configure --prefix={p}"),
        None => "./configure".to_string(),
    }
}

fn meson_cmd(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("meson setup build --prefix={p}"),
        None => "meson setup build".to_string(),
    }
}

fn cmake_cmd(prefix: Option<&str>) -> String {
    let cmake_prefix = prefix
        .map(|p| format!(" -DCMAKE_INSTALL_PREFIX={p}"))
        .unwrap_or_default();
    format!("mkdir -p build && cd build && cmake{cmake_prefix} .. && make")
}

fn default_make(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("make && make install PREFIX={p}"),
        None => "make".to_string(),
    }
}

fn strip_fences(line: &str) -> String {
    let mut out = line.trim();
    if let Some(rest) = out.strip_prefix("```") {
        out = rest.trim_start_matches(|c: char| c.is_alphanumeric()).trim();
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest.trim();
    }
    out.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> BuildLog {
        let dir = std::env::temp_dir().join("fuzzsmith-readme-tests");
        let _ = std::fs::create_dir_all(&dir);
        BuildLog::open(&dir.join("test.log"), false)
    }

    #[test]
    fn test_configure_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("configure"), "#!/bin/sh\n").unwrap();
        let analyzer = ReadmeAnalyzer::new(None);
        let cmds = analyzer.extract_build_commands(dir.path(), None, &mut log());
        assert_eq!(cmds, vec!["./configure", "make"]);
    }

    #[test]
    fn test_cmake_detection_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CMakeLists.txt"), "project(x)\n").unwrap();
        let analyzer = ReadmeAnalyzer::new(None);
        let prefix = dir.path().join("install");
        let cmds = analyzer.extract_build_commands(dir.path(), Some(&prefix), &mut log());
        let joined = cmds.join(" && ");
        assert!(joined.contains("cmake -DCMAKE_INSTALL_PREFIX="));
        assert!(joined.ends_with("make install"));
    }

    #[test]
    fn test_meson_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meson.build"), "project('x', 'c')\n").unwrap();
        let analyzer = ReadmeAnalyzer::new(None);
        let cmds = analyzer.extract_build_commands(dir.path(), None, &mut log());
        assert_eq!(cmds, vec!["meson setup build", "ninja -C build"]);
    }

    #[test]
    fn test_fallback_is_make() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = ReadmeAnalyzer::new(None);
        let cmds = analyzer.extract_build_commands(dir.path(), None, &mut log());
        assert_eq!(cmds, vec!["make"]);
    }

    #[test]
    fn test_autogen_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("configure.ac"), "AC_INIT\n").unwrap();
        std::fs::write(dir.path().join("autogen.sh"), "#!/bin/sh\n").unwrap();
        let analyzer = ReadmeAnalyzer::new(None);
        let cmds = analyzer.extract_build_commands(dir.path(), None, &mut log());
        assert_eq!(cmds[0], "./autogen.sh");
        assert_eq!(cmds[1], "./configure");
    }

    #[test]
    fn test_inject_configure_options() {
        let cmds = vec!["./configure --prefix=/x".to_string(), "make".to_string()];
        let out = inject_configure_options(&cmds, "--without-ssl");
        assert_eq!(out[0], "./configure --prefix=/x --without-ssl");
        assert_eq!(out[1], "make");

        let no_configure = vec!["make".to_string()];
        assert_eq!(inject_configure_options(&no_configure, "--x"), no_configure);
    }

    #[test]
    fn test_clean_command_detection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meson.build"), "").unwrap();
        let analyzer = ReadmeAnalyzer::new(None);
        assert_eq!(
            analyzer.extract_clean_command(dir.path()),
            "ninja -C build -t clean"
        );
    }
}
