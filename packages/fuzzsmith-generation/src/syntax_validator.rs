//! Syntax validation for generated harness sources.
//!
//! Two tiers: quick structural checks that need no toolchain, and a full
//! compiler pass (`-fsyntax-only`). A missing compiler downgrades the full
//! pass to a no-op with a warning; absence of a toolchain is an expected
//! condition, not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::process::Command;
use std::time::Duration;
use tracing::warn;

use fuzzsmith_core::process::run_with_timeout;
use fuzzsmith_core::schema::GeneratedHarness;

const SYNTAX_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REPORTED_ERRORS: usize = 5;

static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\d+:\d+: (?:fatal )?error: (.+)").unwrap());

pub struct SyntaxValidator {
    compiler: String,
    language: String,
    extra_flags: Vec<String>,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::new("clang++", "cpp", Vec::new())
    }
}

impl SyntaxValidator {
    pub fn new(compiler: &str, language: &str, extra_flags: Vec<String>) -> Self {
        Self {
            compiler: compiler.to_string(),
            language: language.to_string(),
            extra_flags,
        }
    }

    /// Compiler-backed validation; updates the harness validity in place.
    pub fn validate(&self, harness: &mut GeneratedHarness) {
        if harness.source_code.is_empty() {
            harness.record_errors(vec!["No source code".to_string()]);
            return;
        }
        let errors = self.check_syntax(&harness.source_code);
        if errors.is_empty() {
            harness.mark_valid();
        } else {
            harness.record_errors(errors);
        }
    }

    pub fn validate_batch(&self, harnesses: &mut [GeneratedHarness]) {
        for harness in harnesses {
            self.validate(harness);
        }
    }

    /// Structural validation without a compiler.
    pub fn quick_validate(&self, harness: &mut GeneratedHarness) {
        let errors = self.check_basic_structure(harness);
        if errors.is_empty() {
            harness.mark_valid();
        } else {
            harness.record_errors(errors);
        }
    }

    /// Quick structural checks: entry point, includes, return, balanced
    /// braces and parentheses.
    pub fn check_basic_structure(&self, harness: &GeneratedHarness) -> Vec<String> {
        let code = &harness.source_code;
        let mut errors = Vec::new();

        if !code.contains("LLVMFuzzerTestOneInput") {
            errors.push("Missing LLVMFuzzerTestOneInput entry point".to_string());
        }
        if !code.contains("#include") {
            errors.push("Missing #include directives".to_string());
        }
        if !code.contains("return") {
            errors.push("Missing return statement".to_string());
        }
        if count_char(code, '{') != count_char(code, '}') {
            errors.push("Unbalanced braces".to_string());
        }
        if count_char(code, '(') != count_char(code, ')') {
            errors.push("Unbalanced parentheses".to_string());
        }

        errors
    }

    fn check_syntax(&self, source_code: &str) -> Vec<String> {
        let suffix = if self.language == "cpp" { ".cpp" } else { ".c" };
        let std_flag = if self.language == "cpp" {
            "-std=c++17"
        } else {
            "-std=c11"
        };

        let mut temp = match tempfile::Builder::new().suffix(suffix).tempfile() {
            Ok(f) => f,
            Err(e) => {
                warn!("Syntax check skipped (temp file failed): {}", e);
                return Vec::new();
            }
        };
        if let Err(e) = temp.write_all(source_code.as_bytes()) {
            warn!("Syntax check skipped (write failed): {}", e);
            return Vec::new();
        }

        let mut cmd = Command::new(&self.compiler);
        cmd.arg("-fsyntax-only")
            .arg(std_flag)
            .arg("-Wall")
            .args(&self.extra_flags)
            .arg(temp.path());

        match run_with_timeout(&mut cmd, SYNTAX_CHECK_TIMEOUT) {
            Ok(out) if out.timed_out => vec!["Syntax check timed out".to_string()],
            Ok(out) if !out.success() => parse_compiler_errors(&out.stderr),
            Ok(_) => Vec::new(),
            Err(e) => {
                // Compiler missing or not runnable: skip, don't fail.
                warn!("Compiler {} not available, skipping syntax check: {}", self.compiler, e);
                Vec::new()
            }
        }
    }
}

fn count_char(text: &str, c: char) -> usize {
    text.chars().filter(|&x| x == c).count()
}

/// Extract error messages from clang/gcc stderr, capped to keep results
/// readable.
fn parse_compiler_errors(stderr: &str) -> Vec<String> {
    let mut errors = Vec::new();
    for line in stderr.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains(": error:") || line.contains(": fatal error:") {
            if let Some(caps) = ERROR_LINE.captures(line) {
                errors.push(caps[1].to_string());
            } else {
                errors.push(line.to_string());
            }
        } else if let Some(rest) = line.strip_prefix("error:") {
            errors.push(rest.trim().to_string());
        }
    }
    errors.truncate(MAX_REPORTED_ERRORS);
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness_with(source: &str) -> GeneratedHarness {
        GeneratedHarness::new("f", "harness_f.cpp", source, vec![], vec![], vec![])
    }

    #[test]
    fn test_quick_validate_passes_wellformed_harness() {
        let validator = SyntaxValidator::default();
        let mut h = harness_with(
            "#include <stdint.h>\nextern \"C\" int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) {\n    return 0;\n}\n",
        );
        validator.quick_validate(&mut h);
        assert!(h.is_valid());
    }

    #[test]
    fn test_quick_validate_flags_missing_entry_point() {
        let validator = SyntaxValidator::default();
        let mut h = harness_with("#include <stdint.h>\nint main() { return 0; }\n");
        validator.quick_validate(&mut h);
        assert!(!h.is_valid());
        assert!(h
            .validation_errors()
            .iter()
            .any(|e| e.contains("LLVMFuzzerTestOneInput")));
    }

    #[test]
    fn test_quick_validate_flags_unbalanced_braces() {
        let validator = SyntaxValidator::default();
        let mut h = harness_with(
            "#include <x.h>\nint LLVMFuzzerTestOneInput() { return 0;\n",
        );
        validator.quick_validate(&mut h);
        assert!(!h.is_valid());
        assert!(h.validation_errors().iter().any(|e| e.contains("braces")));
    }

    #[test]
    fn test_validate_rejects_empty_source() {
        let validator = SyntaxValidator::default();
        let mut h = GeneratedHarness::invalid("f", vec![]);
        validator.validate(&mut h);
        assert!(!h.is_valid());
        assert!(h.validation_errors().iter().any(|e| e == "No source code"));
    }

    #[test]
    fn test_missing_compiler_skips_check() {
        let validator = SyntaxValidator::new("fuzzsmith-no-such-compiler", "cpp", vec![]);
        let mut h = harness_with(
            "#include <stdint.h>\nextern \"C\" int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) { return 0; }\n",
        );
        validator.validate(&mut h);
        // No compiler available: validation passes rather than failing.
        assert!(h.is_valid());
    }

    #[test]
    fn test_parse_compiler_errors_extracts_messages() {
        let stderr = "\
foo.cpp:3:5: error: use of undeclared identifier 'x'
foo.cpp:9:1: warning: unused variable 'y'
error: something standalone
";
        let errors = parse_compiler_errors(stderr);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "use of undeclared identifier 'x'");
        assert_eq!(errors[1], "something standalone");
    }

    #[test]
    fn test_parse_compiler_errors_caps_count() {
        let stderr = (0..10)
            .map(|i| format!("foo.cpp:{i}:1: error: e{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_compiler_errors(&stderr).len(), MAX_REPORTED_ERRORS);
    }
}
