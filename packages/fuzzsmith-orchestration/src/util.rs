//! Shared helpers for pipeline stages.

use std::path::{Path, PathBuf};

use fuzzsmith_core::schema::PipelineContext;
use fuzzsmith_core::traits::{LlmProvider, StageDeps};

/// Try to instantiate the configured LLM provider.
///
/// Returns `None` when no provider is registered under the configured name
/// or instantiation fails; the LLM being unavailable is an expected,
/// frequent condition.
pub fn get_llm_provider(deps: &StageDeps<'_>) -> Option<Box<dyn LlmProvider>> {
    let provider_name = &deps.app().llm_provider;
    let avail = deps.registry.list_available();
    if !avail.llm_providers.iter().any(|n| n == provider_name) {
        return None;
    }
    deps.registry.get_llm(provider_name, deps.env()).ok()
}

/// Resolve an output directory: explicit option, then a context directory,
/// then repo_path, then the working directory, each with `default_subdir`
/// appended for the non-explicit cases. Creates the directory.
pub fn resolve_output_dir(
    context: &PipelineContext,
    explicit: Option<&Path>,
    fallback_dir: Option<&Path>,
    default_subdir: &str,
) -> std::io::Result<PathBuf> {
    let output = if let Some(path) = explicit {
        path.to_path_buf()
    } else if let Some(dir) = fallback_dir {
        dir.join(default_subdir)
    } else if let Some(repo) = &context.repo_path {
        repo.join(default_subdir)
    } else {
        std::env::current_dir()?.join(default_subdir)
    };
    std::fs::create_dir_all(&output)?;
    Ok(output)
}

/// Quote a string for POSIX shell interpolation.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_output_dir_prefers_explicit() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit");
        let ctx = PipelineContext {
            repo_path: Some(dir.path().join("repo")),
            ..Default::default()
        };
        let out = resolve_output_dir(&ctx, Some(&explicit), None, "sub").unwrap();
        assert_eq!(out, explicit);
        assert!(out.is_dir());
    }

    #[test]
    fn test_resolve_output_dir_falls_back_to_repo() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PipelineContext {
            repo_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let out = resolve_output_dir(&ctx, None, None, "fuzz_targets").unwrap();
        assert_eq!(out, dir.path().join("fuzz_targets"));
        assert!(out.is_dir());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-path/x.y"), "plain-path/x.y");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
