//! Enrich function descriptors with surrounding source code so the LLM
//! prompt has real context to work from.

use std::path::Path;

use fuzzsmith_core::schema::FunctionInfo;

const BEFORE_LINES: usize = 5;
const AFTER_LINES: usize = 15;

/// Fill `FunctionInfo.context` with a source window around each function's
/// declaration line. Functions whose file cannot be read keep their
/// existing context.
pub fn enrich_functions(functions: Vec<FunctionInfo>, repo_path: &Path) -> Vec<FunctionInfo> {
    functions
        .into_iter()
        .map(|f| enrich_one(f, repo_path))
        .collect()
}

fn enrich_one(mut func: FunctionInfo, repo_path: &Path) -> FunctionInfo {
    if func.file_path.is_empty() || func.line == 0 {
        return func;
    }
    let candidate = Path::new(&func.file_path);
    let src = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        repo_path.join(candidate)
    };
    if !src.is_file() {
        return func;
    }
    let Ok(text) = std::fs::read_to_string(&src) else {
        return func;
    };
    let lines: Vec<&str> = text.lines().collect();

    let one_based = func.line as usize;
    let start = one_based.saturating_sub(1).saturating_sub(BEFORE_LINES);
    let end = (one_based + AFTER_LINES).min(lines.len());
    if start < end {
        let window = lines[start..end].join("\n");
        if !window.is_empty() {
            func.context = window;
        }
    }
    func
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &Path, name: &str, line_count: usize) {
        let body: String = (1..=line_count).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_enrich_sets_window_around_declaration() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), "a.c", 40);

        let funcs = vec![FunctionInfo {
            name: "f".to_string(),
            file_path: "a.c".to_string(),
            line: 10,
            ..Default::default()
        }];
        let enriched = enrich_functions(funcs, dir.path());
        let ctx = &enriched[0].context;
        // Window: 5 lines before through 15 after the 1-based line.
        assert!(ctx.starts_with("line 4"));
        assert!(ctx.ends_with("line 25"));
    }

    #[test]
    fn test_enrich_clamps_at_file_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path(), "a.c", 6);

        let funcs = vec![FunctionInfo {
            name: "f".to_string(),
            file_path: "a.c".to_string(),
            line: 1,
            ..Default::default()
        }];
        let enriched = enrich_functions(funcs, dir.path());
        assert!(enriched[0].context.starts_with("line 1"));
        assert!(enriched[0].context.ends_with("line 6"));
    }

    #[test]
    fn test_enrich_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let funcs = vec![FunctionInfo {
            name: "f".to_string(),
            file_path: "missing.c".to_string(),
            line: 3,
            context: "preexisting".to_string(),
            ..Default::default()
        }];
        let enriched = enrich_functions(funcs, dir.path());
        assert_eq!(enriched[0].context, "preexisting");
    }
}
