//! C/C++ language analyzer backed by the CodeQL CLI.
//!
//! Runs the bundled queries against an existing CodeQL database, decodes
//! the BQRS results to CSV, and merges the auxiliary query outputs
//! (API surface, fuzz candidates, parameter semantics) into the function
//! list keyed by (file, line, name).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use fuzzsmith_core::error::Result;
use fuzzsmith_core::schema::{FunctionInfo, ParamRole, UsageContext};
use fuzzsmith_core::traits::LanguageAnalyzer;
use fuzzsmith_orchestration::codeql::{CodeQlRunner, QUERY_TIMEOUT};

const LIST_FUNCTIONS_QL: &str = include_str!("../queries/list_functions.ql");
const API_FUNCTIONS_QL: &str = include_str!("../queries/api_functions.ql");
const FUZZ_TARGETS_QL: &str = include_str!("../queries/fuzz_targets.ql");
const PARAMETER_SEMANTICS_QL: &str = include_str!("../queries/parameter_semantics.ql");
const QLPACK_YML: &str = include_str!("../queries/qlpack.yml");

const QUERY_FILES: [(&str, &str); 4] = [
    ("list_functions.ql", LIST_FUNCTIONS_QL),
    ("api_functions.ql", API_FUNCTIONS_QL),
    ("fuzz_targets.ql", FUZZ_TARGETS_QL),
    ("parameter_semantics.ql", PARAMETER_SEMANTICS_QL),
];

enum QueryDir {
    /// Queries shipped on disk (FUZZSMITH_QUERY_DIR).
    External(PathBuf),
    /// Embedded queries materialized for the lifetime of the analyzer.
    Materialized(tempfile::TempDir),
}

impl QueryDir {
    fn path(&self) -> &Path {
        match self {
            QueryDir::External(p) => p,
            QueryDir::Materialized(t) => t.path(),
        }
    }
}

pub struct CppAnalyzer {
    runner: CodeQlRunner,
    query_dir: Option<QueryDir>,
}

impl Default for CppAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CppAnalyzer {
    pub fn new() -> Self {
        let query_dir = match std::env::var("FUZZSMITH_QUERY_DIR") {
            Ok(dir) if !dir.is_empty() => Some(QueryDir::External(PathBuf::from(dir))),
            _ => materialize_queries(),
        };
        Self {
            runner: CodeQlRunner::new(&codeql_bin_from_env()),
            query_dir,
        }
    }

    fn query_paths(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.query_dir else {
            return Vec::new();
        };
        QUERY_FILES
            .iter()
            .map(|(name, _)| dir.path().join(name))
            .filter(|p| p.exists())
            .collect()
    }

    /// CodeQL pack search path: CODEQL_REPO when set; bundle installs
    /// auto-discover their packs.
    fn search_path(&self) -> Option<Vec<PathBuf>> {
        match std::env::var("CODEQL_REPO") {
            Ok(repo) if !repo.is_empty() => {
                let path = PathBuf::from(repo);
                path.exists().then(|| vec![path])
            }
            _ => None,
        }
    }
}

impl LanguageAnalyzer for CppAnalyzer {
    fn language(&self) -> &str {
        "cpp"
    }

    fn extract_functions(&self, db_path: &Path) -> Result<Vec<FunctionInfo>> {
        let queries = self.query_paths();
        if queries.is_empty() {
            warn!("No CodeQL queries available; returning no candidates");
            return Ok(Vec::new());
        }

        let search_path = self.search_path();
        let run = self.runner.run_queries(
            db_path,
            &queries,
            QUERY_TIMEOUT,
            search_path.as_deref(),
        );
        let output = match run {
            Ok(output) => output,
            Err(e) => {
                warn!("CodeQL run-queries failed: {}", e);
                return Ok(Vec::new());
            }
        };
        if !output.success() {
            let excerpt: String = output.error_text().chars().take(500).collect();
            warn!(
                "CodeQL run-queries failed (exit {:?}): {}",
                output.status, excerpt
            );
            if excerpt.contains("could not resolve module cpp") {
                warn!(
                    "Could not resolve the 'cpp' module. Use the CodeQL bundle (not the \
                     standalone CLI) or set CODEQL_REPO to a checkout with the cpp pack."
                );
            }
            return Ok(Vec::new());
        }

        let bqrs_files = CodeQlRunner::find_bqrs_files(db_path);
        if bqrs_files.is_empty() {
            warn!("No BQRS files under {}", db_path.join("results").display());
            return Ok(Vec::new());
        }

        type Key = (String, u32, String);
        let mut functions: Vec<FunctionInfo> = Vec::new();
        let mut api_set: HashSet<Key> = HashSet::new();
        let mut fuzz_set: HashSet<Key> = HashSet::new();
        let mut semantics_map: HashMap<Key, Vec<String>> = HashMap::new();

        for bqrs_path in &bqrs_files {
            let kind = query_kind(bqrs_path);
            if kind.is_empty() {
                continue;
            }
            let csv_text = self.runner.decode_bqrs(bqrs_path);
            if csv_text.is_empty() {
                debug!("Empty decode for {}", bqrs_path.display());
                continue;
            }

            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(csv_text.as_bytes());
            for record in reader.records().flatten() {
                if record.len() < 4 {
                    continue;
                }
                let file_path = record.get(0).unwrap_or("").trim().to_string();
                let line: u32 = record
                    .get(1)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                let name = record.get(2).unwrap_or("").trim().to_string();
                let key = (file_path.clone(), line, name.clone());

                match kind {
                    "list_functions" => {
                        let qualified = non_empty_or(record.get(3), &name);
                        let return_type = record.get(4).unwrap_or("").trim().to_string();
                        let params_str = record.get(6).unwrap_or("").trim().to_string();
                        let parameters: Vec<String> = params_str
                            .split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(str::to_string)
                            .collect();
                        functions.push(FunctionInfo {
                            name,
                            signature: format!("{return_type} {qualified}({params_str})"),
                            return_type,
                            parameters,
                            file_path,
                            line,
                            ..Default::default()
                        });
                    }
                    "api_functions" => {
                        api_set.insert(key);
                    }
                    "fuzz_targets" => {
                        fuzz_set.insert(key);
                    }
                    "parameter_semantics" => {
                        let param_index: usize = record
                            .get(3)
                            .and_then(|v| v.trim().parse().ok())
                            .unwrap_or(0);
                        let role = record.get(4).unwrap_or("UNKNOWN").trim().to_string();
                        let roles = semantics_map.entry(key).or_default();
                        while roles.len() <= param_index {
                            roles.push("UNKNOWN".to_string());
                        }
                        roles[param_index] = role;
                    }
                    _ => {}
                }
            }
        }

        // Tag each function with its auxiliary query results, aligned to
        // the parameter list.
        for func in &mut functions {
            let key = (func.file_path.clone(), func.line, func.name.clone());
            func.is_api = api_set.contains(&key);
            func.is_fuzz_candidate = fuzz_set.contains(&key);
            let roles = semantics_map.get(&key);
            func.parameter_semantics = (0..func.parameters.len())
                .map(|i| {
                    roles
                        .and_then(|r| r.get(i))
                        .map(|r| ParamRole::parse(r))
                        .unwrap_or_default()
                })
                .collect();
        }

        Ok(functions)
    }

    /// Call-sequence extraction is not implemented for C/C++; sequences
    /// come from the LLM suggestion path instead.
    fn extract_usage_contexts(&self, _db_path: &Path) -> Result<Vec<UsageContext>> {
        Ok(Vec::new())
    }

    fn get_compiler_flags(&self) -> Vec<String> {
        vec!["-fsanitize=fuzzer".to_string(), "-g".to_string()]
    }
}

/// Resolve the codeql binary like the build stage does: a bundle keeps it
/// at $CODEQL_HOME/codeql, other installs under bin/.
fn codeql_bin_from_env() -> String {
    if let Ok(home) = std::env::var("CODEQL_HOME") {
        if !home.is_empty() {
            let home = PathBuf::from(home);
            for sub in ["codeql", "bin/codeql"] {
                let candidate = home.join(sub);
                if candidate.exists() {
                    return candidate.to_string_lossy().into_owned();
                }
            }
            return home.join("bin/codeql").to_string_lossy().into_owned();
        }
    }
    "codeql".to_string()
}

fn materialize_queries() -> Option<QueryDir> {
    let dir = match tempfile::Builder::new().prefix("fuzzsmith-queries-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Could not materialize CodeQL queries: {}", e);
            return None;
        }
    };
    for (name, content) in QUERY_FILES {
        if let Err(e) = std::fs::write(dir.path().join(name), content) {
            warn!("Could not write query {}: {}", name, e);
            return None;
        }
    }
    if let Err(e) = std::fs::write(dir.path().join("qlpack.yml"), QLPACK_YML) {
        warn!("Could not write qlpack.yml: {}", e);
        return None;
    }
    Some(QueryDir::Materialized(dir))
}

fn query_kind(path: &Path) -> &'static str {
    let s = path.to_string_lossy();
    for kind in [
        "list_functions",
        "api_functions",
        "fuzz_targets",
        "parameter_semantics",
    ] {
        if s.contains(kind) {
            return kind;
        }
    }
    ""
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzer_materializes_queries() {
        let analyzer = CppAnalyzer::new();
        let paths = analyzer.query_paths();
        assert_eq!(paths.len(), 4);
        assert!(paths.iter().any(|p| p.ends_with("list_functions.ql")));
    }

    #[test]
    fn test_query_kind_from_path() {
        assert_eq!(
            query_kind(Path::new("/db/results/pack/list_functions.bqrs")),
            "list_functions"
        );
        assert_eq!(query_kind(Path::new("/db/results/other.bqrs")), "");
    }

    #[test]
    fn test_extract_functions_on_missing_db_returns_empty() {
        let analyzer = CppAnalyzer::new();
        let functions = analyzer.extract_functions(Path::new("/no/such/db")).unwrap();
        assert!(functions.is_empty());
    }

    #[test]
    fn test_compiler_flags() {
        let analyzer = CppAnalyzer::new();
        assert_eq!(analyzer.get_compiler_flags(), vec!["-fsanitize=fuzzer", "-g"]);
    }
}
