//! LLM-assisted analysis: suggest additional usage contexts (ordered call
//! sequences) from the extracted function list.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

use fuzzsmith_core::schema::{FunctionInfo, UsageContext};
use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

const MAX_FUNCTIONS_IN_PROMPT: usize = 200;
const MAX_EXISTING_CONTEXTS: usize = 50;
const MAX_SNIPPETS: usize = 3;
const MAX_SNIPPET_CHARS: usize = 500;

static CONTEXT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:]+):\s*(.+)$").unwrap());

/// Ask the LLM for additional usage contexts. On transport error or a
/// fully unparseable response this returns an empty list; suggested
/// sequences naming unknown functions are discarded at the parse boundary.
pub fn suggest_usage_contexts(
    llm: &dyn LlmProvider,
    functions: &[FunctionInfo],
    existing: &[UsageContext],
) -> Vec<UsageContext> {
    if functions.is_empty() {
        return Vec::new();
    }

    let prompt = build_prompt(functions, existing);
    let response = match llm.complete(&prompt, &LlmOptions::default()) {
        Ok(text) => text,
        Err(e) => {
            warn!("LLM usage context suggestion failed: {}", e);
            return Vec::new();
        }
    };

    let valid_names: HashSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    parse_usage_context_response(&response, &valid_names)
}

fn build_prompt(functions: &[FunctionInfo], existing: &[UsageContext]) -> String {
    let function_list: String = functions
        .iter()
        .take(MAX_FUNCTIONS_IN_PROMPT)
        .map(|f| format!("- {}: {}\n", f.name, f.signature))
        .collect();

    let existing_contexts = if existing.is_empty() {
        "(none)".to_string()
    } else {
        existing
            .iter()
            .take(MAX_EXISTING_CONTEXTS)
            .map(|u| format!("- {}: {}\n", u.name, u.calls.join(", ")))
            .collect()
    };

    let snippets: Vec<String> = functions
        .iter()
        .filter(|f| !f.context.is_empty())
        .take(MAX_SNIPPETS)
        .map(|f| {
            let snippet: String = f.context.chars().take(MAX_SNIPPET_CHARS).collect();
            format!("{}:\n{}", f.name, snippet)
        })
        .collect();
    let code_snippet_block = if snippets.is_empty() {
        String::new()
    } else {
        format!("\n\nRelevant code snippets:\n{}", snippets.join("\n---\n"))
    };

    format!(
        "You are helping generate fuzz targets. Given a list of function names and existing \
         usage contexts (ordered call sequences), suggest ADDITIONAL usage contexts: ordered \
         sequences of function calls that would be useful for fuzzing (e.g. init then use then \
         cleanup, parse then process).\n\n\
         Rules:\n\
         - Output one usage context per line in this exact format: name: func1, func2, func3\n\
         - Use ONLY function names from the provided list. Do not invent names.\n\
         - Do not duplicate the existing usage contexts listed below.\n\
         - If you have no additional suggestions, output nothing (empty response).\n\n\
         Available functions (name / signature):\n{function_list}\n\
         Existing usage contexts (do not duplicate):\n{existing_contexts}{code_snippet_block}\n\n\
         Suggest additional usage contexts, one per line: name: func1, func2, func3"
    )
}

/// Parse the LLM response, one `name: f1, f2, f3` per line. Lines that do
/// not match, or that reference unknown function names, are skipped.
fn parse_usage_context_response(
    response: &str,
    valid_names: &HashSet<&str>,
) -> Vec<UsageContext> {
    let mut result = Vec::new();
    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(caps) = CONTEXT_LINE.captures(line) else {
            continue;
        };
        let name = caps[1].trim().to_string();
        let calls: Vec<String> = caps[2]
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if calls.is_empty() {
            continue;
        }
        if !calls.iter().all(|c| valid_names.contains(c.as_str())) {
            debug!("Skipping suggested sequence with unknown function name: {}", line);
            continue;
        }
        result.push(UsageContext {
            name: if name.is_empty() { "unnamed".to_string() } else { name },
            calls,
            ..Default::default()
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzsmith_core::error::Result as CoreResult;

    struct CannedLlm(String);

    impl LlmProvider for CannedLlm {
        fn name(&self) -> &str {
            "canned"
        }
        fn complete(&self, _prompt: &str, _options: &LlmOptions) -> CoreResult<String> {
            Ok(self.0.clone())
        }
        fn check_health(&self) -> bool {
            true
        }
    }

    fn funcs(names: &[&str]) -> Vec<FunctionInfo> {
        names
            .iter()
            .map(|n| FunctionInfo {
                name: n.to_string(),
                signature: format!("void {n}()"),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_valid_lines_are_parsed() {
        let llm = CannedLlm("lifecycle: init, process, cleanup\n".to_string());
        let contexts = suggest_usage_contexts(&llm, &funcs(&["init", "process", "cleanup"]), &[]);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name, "lifecycle");
        assert_eq!(contexts[0].calls, vec!["init", "process", "cleanup"]);
    }

    #[test]
    fn test_unknown_names_invalidate_the_line() {
        let llm = CannedLlm(
            "good: init, cleanup\nbad: init, made_up_function\n".to_string(),
        );
        let contexts = suggest_usage_contexts(&llm, &funcs(&["init", "cleanup"]), &[]);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name, "good");
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let llm = CannedLlm(
            "# a comment\n\nHere are some suggestions\npair: init, cleanup\n".to_string(),
        );
        let contexts = suggest_usage_contexts(&llm, &funcs(&["init", "cleanup"]), &[]);
        assert_eq!(contexts.len(), 1);
    }

    #[test]
    fn test_empty_function_list_short_circuits() {
        let llm = CannedLlm("whatever: x\n".to_string());
        assert!(suggest_usage_contexts(&llm, &[], &[]).is_empty());
    }
}
