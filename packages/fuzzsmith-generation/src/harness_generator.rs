//! Fuzz harness synthesis from analyzed functions and call sequences.
//!
//! Two generation paths: a deterministic template path that emits one
//! FuzzedDataProvider consume statement per parameter, and an LLM path that
//! embeds the signature and surrounding code in a fixed prompt.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use fuzzsmith_core::error::{CoreError, Result};
use fuzzsmith_core::schema::{FunctionInfo, GeneratedHarness, ParamRole, UsageContext};
use fuzzsmith_core::traits::{LlmOptions, LlmProvider};

use crate::param_analyzer::{
    find_buffer_size_pairs, generate_consume, parse_parameter, ParsedParam,
};

/// Local variables used by the harness skeleton; parameter names colliding
/// with these get a prefix.
const RESERVED_NAMES: [&str; 4] = ["data", "size", "fdp", "result"];

const COLLISION_PREFIX: &str = "fuzz_";

/// Output subdirectory tags.
pub const CATEGORY_API: &str = "api";
pub const CATEGORY_USAGE_CONTEXTS: &str = "usage_contexts";
pub const CATEGORY_OTHER: &str = "other";

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:cpp|c\+\+|c)?[ \t]*\n(.*?)```").unwrap());

static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());
static UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

pub struct HarnessGenerator<'a> {
    llm: Option<&'a dyn LlmProvider>,
    llm_options: LlmOptions,
    output_dir: Option<PathBuf>,
}

impl<'a> HarnessGenerator<'a> {
    pub fn new(llm: Option<&'a dyn LlmProvider>, output_dir: Option<PathBuf>) -> Self {
        Self {
            llm,
            llm_options: LlmOptions::default(),
            output_dir,
        }
    }

    pub fn with_llm_options(mut self, options: LlmOptions) -> Self {
        self.llm_options = options;
        self
    }

    /// Generate a harness for a single function.
    pub fn generate_for_function(
        &self,
        func: &FunctionInfo,
        use_llm: bool,
    ) -> Result<GeneratedHarness> {
        if use_llm {
            if let Some(llm) = self.llm {
                return self.generate_with_llm(llm, func);
            }
        }
        Ok(self.generate_from_template(func))
    }

    /// Generate a harness for an ordered call sequence.
    pub fn generate_for_sequence(
        &self,
        usage_context: &UsageContext,
        functions: &[FunctionInfo],
        use_llm: bool,
    ) -> Result<GeneratedHarness> {
        if use_llm {
            if let Some(llm) = self.llm {
                return self.generate_sequence_with_llm(llm, usage_context, functions);
            }
        }
        Ok(self.generate_sequence_from_template(usage_context, functions))
    }

    /// Generate harnesses for a whole analysis run.
    ///
    /// Ordering: API-flagged functions, then usage-context sequences, then
    /// remaining fuzz candidates, then everything else. Each bucket carries
    /// a category tag used only for output placement. A `max_targets` cap
    /// truncates the ordered list from the end; per-item failures yield an
    /// invalid harness carrying the error and never abort the batch.
    pub fn generate_batch(
        &self,
        functions: &[FunctionInfo],
        usage_contexts: &[UsageContext],
        use_llm: bool,
        max_targets: Option<usize>,
        use_subdirs: bool,
    ) -> Vec<GeneratedHarness> {
        enum Item<'f> {
            Function(&'f FunctionInfo),
            Sequence(&'f UsageContext),
        }

        let mut ordered: Vec<(Item<'_>, &str)> = Vec::new();
        for f in functions.iter().filter(|f| f.is_api) {
            ordered.push((Item::Function(f), CATEGORY_API));
        }
        for u in usage_contexts {
            ordered.push((Item::Sequence(u), CATEGORY_USAGE_CONTEXTS));
        }
        for f in functions.iter().filter(|f| !f.is_api && f.is_fuzz_candidate) {
            ordered.push((Item::Function(f), CATEGORY_OTHER));
        }
        for f in functions
            .iter()
            .filter(|f| !f.is_api && !f.is_fuzz_candidate)
        {
            ordered.push((Item::Function(f), CATEGORY_OTHER));
        }

        if let Some(cap) = max_targets {
            ordered.truncate(cap);
        }

        let mut harnesses = Vec::with_capacity(ordered.len());
        for (item, category) in ordered {
            let category = if use_subdirs { category } else { "" };
            let (name, outcome) = match item {
                Item::Function(f) => (
                    f.name.clone(),
                    self.generate_for_function(f, use_llm),
                ),
                Item::Sequence(u) => (
                    sequence_display_name(u),
                    self.generate_for_sequence(u, functions, use_llm),
                ),
            };
            match outcome {
                Ok(mut harness) => {
                    harness.category = category.to_string();
                    harnesses.push(harness);
                }
                Err(e) => {
                    warn!("Failed to generate harness for {}: {}", name, e);
                    let mut harness = GeneratedHarness::invalid(name, vec![e.to_string()]);
                    harness.category = category.to_string();
                    harnesses.push(harness);
                }
            }
        }
        harnesses
    }

    /// Write harness source files, returning the written paths.
    ///
    /// Harnesses with a category are nested under `output_dir/<category>/`
    /// when `use_subdirs` is set; harnesses without source are skipped.
    pub fn write_harnesses(
        &self,
        harnesses: &[GeneratedHarness],
        output_dir: Option<&Path>,
        use_subdirs: bool,
    ) -> Result<Vec<PathBuf>> {
        let out = output_dir
            .map(Path::to_path_buf)
            .or_else(|| self.output_dir.clone())
            .ok_or_else(|| CoreError::Config("output_dir not specified".to_string()))?;
        std::fs::create_dir_all(&out)?;

        let mut written = Vec::new();
        for harness in harnesses {
            if harness.source_code.is_empty() {
                continue;
            }
            let file_path = if use_subdirs && !harness.category.is_empty() {
                let subdir = out.join(&harness.category);
                std::fs::create_dir_all(&subdir)?;
                subdir.join(&harness.file_path)
            } else {
                out.join(&harness.file_path)
            };
            std::fs::write(&file_path, &harness.source_code)?;
            debug!("Wrote harness: {}", file_path.display());
            written.push(file_path);
        }
        Ok(written)
    }

    // ------------------------------------------------------------------
    // Template path
    // ------------------------------------------------------------------

    fn generate_from_template(&self, func: &FunctionInfo) -> GeneratedHarness {
        let includes = build_includes(func);
        let parsed: Vec<ParsedParam> =
            func.parameters.iter().map(|p| parse_parameter(p)).collect();
        let body = build_fdp_body(func, &parsed);
        let source_code = render_harness(&includes.join("\n"), &body);

        GeneratedHarness::new(
            &func.name,
            format!("harness_{}.cpp", sanitize_name(&func.name)),
            &source_code,
            extract_includes(&source_code),
            default_compile_flags(),
            default_link_flags(),
        )
    }

    fn generate_sequence_from_template(
        &self,
        usage_context: &UsageContext,
        functions: &[FunctionInfo],
    ) -> GeneratedHarness {
        let func_map: HashMap<&str, &FunctionInfo> =
            functions.iter().map(|f| (f.name.as_str(), f)).collect();

        let mut includes_set: Vec<String> = Vec::new();
        for call in &usage_context.calls {
            if let Some(func) = func_map.get(call.as_str()) {
                if let Some(header) = header_for(&func.file_path) {
                    push_unique(&mut includes_set, format!("#include \"{header}\""));
                }
                for inc in &func.includes {
                    push_unique(&mut includes_set, inc.clone());
                }
            }
        }
        includes_set.sort();

        let body = build_sequence_body(usage_context, &func_map);
        let source_code = render_harness(&includes_set.join("\n"), &body);

        let name = sequence_display_name(usage_context);
        GeneratedHarness::new(
            format!("sequence_{name}"),
            format!("harness_seq_{}.cpp", sanitize_name(&name)),
            &source_code,
            extract_includes(&source_code),
            default_compile_flags(),
            default_link_flags(),
        )
    }

    // ------------------------------------------------------------------
    // LLM path
    // ------------------------------------------------------------------

    fn generate_with_llm(
        &self,
        llm: &dyn LlmProvider,
        func: &FunctionInfo,
    ) -> Result<GeneratedHarness> {
        let parameters = if func.parameters.is_empty() {
            "(none)".to_string()
        } else {
            func.parameters.join(", ")
        };
        let context = if func.context.is_empty() {
            "(no context available)"
        } else {
            &func.context
        };
        let prompt = format!(
            "Generate a libFuzzer harness for the following C/C++ function.\n\n\
             Function signature:\n{signature}\n\n\
             File: {file_path}\n\
             Return type: {return_type}\n\
             Parameters: {parameters}\n\n\
             Context (surrounding code):\n{context}\n\n\
             Requirements:\n\
             1. Use the standard libFuzzer entry point: extern \"C\" int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size)\n\
             2. Use FuzzedDataProvider to parse the fuzz input into typed arguments\n\
             3. For buffer+size parameter pairs, consume size first, then consume that many bytes\n\
             4. Handle edge cases (null checks, size validation, early return if fdp.remaining_bytes() < minimum)\n\
             5. Return 0 at the end\n\
             6. Include necessary headers\n\n\
             Generate ONLY the complete C/C++ source code for the harness, no explanations.\n",
            signature = func.signature,
            file_path = func.file_path,
            return_type = func.return_type,
        );

        let response = llm.complete(&prompt, &self.llm_options)?;
        let source_code = extract_code(&response);
        let includes = extract_includes(&source_code);

        Ok(GeneratedHarness::new(
            &func.name,
            format!("harness_{}.cpp", sanitize_name(&func.name)),
            source_code,
            includes,
            default_compile_flags(),
            default_link_flags(),
        ))
    }

    fn generate_sequence_with_llm(
        &self,
        llm: &dyn LlmProvider,
        usage_context: &UsageContext,
        functions: &[FunctionInfo],
    ) -> Result<GeneratedHarness> {
        let func_map: HashMap<&str, &FunctionInfo> =
            functions.iter().map(|f| (f.name.as_str(), f)).collect();
        let signatures: Vec<String> = usage_context
            .calls
            .iter()
            .map(|call| match func_map.get(call.as_str()) {
                Some(f) => format!("- {}", f.signature),
                None => format!("- {call}(...)"),
            })
            .collect();

        let prompt = format!(
            "Generate a libFuzzer harness that calls the following sequence of functions.\n\n\
             Call sequence: {calls}\n\n\
             Function signatures:\n{signatures}\n\n\
             Requirements:\n\
             1. Use the standard libFuzzer entry point: extern \"C\" int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size)\n\
             2. Use FuzzedDataProvider to parse fuzz input\n\
             3. Call functions in the specified order\n\
             4. Handle initialization and cleanup properly (e.g., if the first function returns a handle, pass it to subsequent calls, then cleanup)\n\
             5. For resource-acquiring functions (open, create, init), ensure matching cleanup (close, destroy, cleanup)\n\
             6. Return 0 at the end\n\n\
             Generate ONLY the complete C/C++ source code for the harness, no explanations.\n",
            calls = usage_context.calls.join(" -> "),
            signatures = signatures.join("\n"),
        );

        let response = llm.complete(&prompt, &self.llm_options)?;
        let source_code = extract_code(&response);
        let includes = extract_includes(&source_code);

        let name = sequence_display_name(usage_context);
        Ok(GeneratedHarness::new(
            format!("sequence_{name}"),
            format!("harness_seq_{}.cpp", sanitize_name(&name)),
            source_code,
            includes,
            default_compile_flags(),
            default_link_flags(),
        ))
    }
}

// ----------------------------------------------------------------------
// Body construction
// ----------------------------------------------------------------------

fn build_fdp_body(func: &FunctionInfo, parsed: &[ParsedParam]) -> String {
    let mut lines: Vec<String> = vec![
        format!("    // Fuzz harness for: {}", func.name),
        format!("    // Signature: {}", func.signature),
        String::new(),
        "    if (size < 1) return 0;".to_string(),
        String::new(),
    ];

    if parsed.is_empty() {
        lines.push(format!("    {}();", func.name));
        return lines.join("\n");
    }

    let pairs = find_buffer_size_pairs(parsed);
    let semantics = &func.parameter_semantics;

    let mut arg_names: Vec<String> = Vec::new();
    let mut cleanup_handles: Vec<String> = Vec::new();
    // Index into the original parameter list; a consumed size advances it
    // past both positions.
    let mut param_index = 0usize;

    for (param, size_param) in &pairs {
        let role = semantics
            .get(param_index)
            .copied()
            .filter(|r| *r != ParamRole::Unknown);

        let collides = (!param.name.is_empty() && RESERVED_NAMES.contains(&param.name.as_str()))
            || size_param
                .as_ref()
                .is_some_and(|s| RESERVED_NAMES.contains(&s.name.as_str()));
        let prefix = if collides { COLLISION_PREFIX } else { "" };

        let consume = generate_consume(param, size_param.as_ref(), prefix, role);
        lines.push(consume.code);
        param_index += if size_param.is_some() { 2 } else { 1 };

        if role == Some(ParamRole::FileHandle) {
            cleanup_handles.push(consume.var_name.clone());
        }

        arg_names.push(consume.var_name);
        if let Some(size_var) = consume.size_var_name {
            arg_names.push(size_var);
        }
    }

    lines.push(String::new());
    let args = arg_names.join(", ");
    if is_non_void(&func.return_type) {
        lines.push(format!("    auto result = {}({});", func.name, args));
        lines.push("    (void)result;  // Prevent unused variable warning".to_string());
    } else {
        lines.push(format!("    {}({});", func.name, args));
    }

    for handle in &cleanup_handles {
        lines.push(format!("    if ({handle}) fclose({handle});"));
    }

    lines.join("\n")
}

fn build_sequence_body(
    usage_context: &UsageContext,
    func_map: &HashMap<&str, &FunctionInfo>,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "    // Fuzz harness for call sequence: {}",
        usage_context.calls.join(" -> ")
    ));
    if !usage_context.description.is_empty() {
        lines.push(format!("    // {}", usage_context.description));
    }
    lines.push(String::new());
    lines.push("    if (size < 1) return 0;".to_string());
    lines.push(String::new());

    // Return values that look like resources, flagged for manual cleanup.
    let mut resources: Vec<(String, String)> = Vec::new();

    for (i, call) in usage_context.calls.iter().enumerate() {
        lines.push(format!("    // Step {}: {}", i + 1, call));

        if let Some(func) = func_map.get(call.as_str()) {
            let parsed: Vec<ParsedParam> =
                func.parameters.iter().map(|p| parse_parameter(p)).collect();
            let pairs = find_buffer_size_pairs(&parsed);

            let mut arg_names: Vec<String> = Vec::new();
            for (param, size_param) in &pairs {
                let consume =
                    generate_consume(param, size_param.as_ref(), &format!("step{i}_"), None);
                lines.push(consume.code);
                arg_names.push(consume.var_name);
                if let Some(size_var) = consume.size_var_name {
                    arg_names.push(size_var);
                }
            }

            let args = arg_names.join(", ");
            if is_non_void(&func.return_type) {
                lines.push(format!("    auto result_{i} = {call}({args});"));
                if is_resource_type(&func.return_type) {
                    resources.push((format!("result_{i}"), call.clone()));
                }
            } else {
                lines.push(format!("    {call}({args});"));
            }
        } else {
            lines.push(format!("    // TODO: {call}(...);"));
        }

        lines.push(String::new());
    }

    // Acquire/release pairing across different functions is never guessed;
    // surfaced for a human instead.
    if !resources.is_empty() {
        lines.push("    // Cleanup (TODO: add proper cleanup calls)".to_string());
        for (var_name, create_call) in &resources {
            lines.push(format!("    // TODO: cleanup {var_name} from {create_call}"));
        }
    }

    lines.join("\n")
}

fn render_harness(includes: &str, body: &str) -> String {
    format!(
        "#include <stdint.h>\n\
         #include <stddef.h>\n\
         #include <string.h>\n\
         #include <vector>\n\
         #include <string>\n\
         #include <fuzzer/FuzzedDataProvider.h>\n\
         {includes}\n\
         \n\
         extern \"C\" int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) {{\n\
         \x20   FuzzedDataProvider fdp(data, size);\n\
         {body}\n\
         \x20   return 0;\n\
         }}\n"
    )
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn build_includes(func: &FunctionInfo) -> Vec<String> {
    let mut includes: Vec<String> = Vec::new();
    let needs_stdio = func.parameter_semantics.iter().any(|r| {
        matches!(
            r,
            ParamRole::FilePath | ParamRole::FileHandle | ParamRole::ConfigPath | ParamRole::Url
        )
    });
    if needs_stdio {
        includes.push("#include <cstdio>".to_string());
        includes.push("#include <unistd.h>".to_string());
    }
    if let Some(header) = header_for(&func.file_path) {
        includes.push(format!("#include \"{header}\""));
    }
    for inc in &func.includes {
        push_unique(&mut includes, inc.clone());
    }
    includes
}

/// Derive the header path for a C/C++ source file.
fn header_for(file_path: &str) -> Option<String> {
    if file_path.is_empty() {
        return None;
    }
    for ext in [".cpp", ".cxx", ".cc", ".c"] {
        if let Some(stem) = file_path.strip_suffix(ext) {
            return Some(format!("{stem}.h"));
        }
    }
    None
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn is_non_void(return_type: &str) -> bool {
    let trimmed = return_type.trim();
    !trimmed.is_empty() && trimmed != "void"
}

/// Return types that look like handles/pointers get a cleanup reminder.
fn is_resource_type(return_type: &str) -> bool {
    let lower = return_type.to_lowercase();
    let trimmed = lower.trim();
    trimmed.ends_with('*')
        || trimmed.contains("handle")
        || trimmed.contains("ptr")
        || trimmed.contains("file")
}

fn sequence_display_name(usage_context: &UsageContext) -> String {
    if !usage_context.name.is_empty() {
        usage_context.name.clone()
    } else {
        usage_context
            .calls
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Extract source from an LLM response: fenced block first, then from the
/// first directive/extern line, then the raw response.
fn extract_code(response: &str) -> String {
    if let Some(caps) = FENCED_CODE.captures(response) {
        return caps[1].trim().to_string();
    }

    let mut code_lines: Vec<&str> = Vec::new();
    let mut in_code = false;
    for line in response.trim().lines() {
        let stripped = line.trim_start();
        if stripped.starts_with("#include") || stripped.starts_with("extern") {
            in_code = true;
        }
        if in_code {
            code_lines.push(line);
        }
    }

    if code_lines.is_empty() {
        response.trim().to_string()
    } else {
        code_lines.join("\n")
    }
}

fn extract_includes(source_code: &str) -> Vec<String> {
    source_code
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("#include"))
        .map(str::to_string)
        .collect()
}

/// Sanitize a function or sequence name into a file-name stem.
pub fn sanitize_name(name: &str) -> String {
    let replaced = NON_IDENT.replace_all(name, "_");
    let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    trimmed.chars().take(50).collect()
}

fn default_compile_flags() -> Vec<String> {
    [
        "-g",
        "-O1",
        "-fno-omit-frame-pointer",
        "-fsanitize=fuzzer,address",
        "-fsanitize-address-use-after-scope",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_link_flags() -> Vec<String> {
    vec!["-fsanitize=fuzzer,address".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzsmith_core::error::CoreError;

    fn func(name: &str, return_type: &str, params: &[&str]) -> FunctionInfo {
        FunctionInfo {
            name: name.to_string(),
            signature: format!("{return_type} {name}({})", params.join(", ")),
            return_type: return_type.to_string(),
            parameters: params.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    struct CannedLlm(String);

    impl LlmProvider for CannedLlm {
        fn name(&self) -> &str {
            "canned"
        }
        fn complete(&self, _prompt: &str, _options: &LlmOptions) -> Result<String> {
            Ok(self.0.clone())
        }
        fn check_health(&self) -> bool {
            true
        }
    }

    struct FailingLlm;

    impl LlmProvider for FailingLlm {
        fn name(&self) -> &str {
            "failing"
        }
        fn complete(&self, _prompt: &str, _options: &LlmOptions) -> Result<String> {
            Err(CoreError::Config("no backend".to_string()))
        }
        fn check_health(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_template_harness_for_string_and_size() {
        let generator = HarnessGenerator::new(None, None);
        let f = func("f", "int", &["const char* data", "size_t size"]);
        let harness = generator.generate_for_function(&f, false).unwrap();

        assert!(harness.is_valid());
        assert!(harness.source_code.contains("LLVMFuzzerTestOneInput"));
        assert!(harness.source_code.contains("FuzzedDataProvider fdp(data, size);"));
        // Reserved names are prefixed.
        assert!(harness.source_code.contains("fuzz_data"));
        assert!(harness.source_code.contains("fuzz_size"));
        // Length-bounded string consumption followed by a two-argument call.
        assert!(harness.source_code.contains("ConsumeBytesAsString"));
        assert!(harness.source_code.contains("f(fuzz_data, fuzz_size);"));
    }

    #[test]
    fn test_template_harness_no_params() {
        let generator = HarnessGenerator::new(None, None);
        let f = func("tick", "void", &[]);
        let harness = generator.generate_for_function(&f, false).unwrap();
        assert!(harness.source_code.contains("    tick();"));
    }

    #[test]
    fn test_non_void_return_binds_discard_variable() {
        let generator = HarnessGenerator::new(None, None);
        let f = func("compute", "int", &["int x"]);
        let harness = generator.generate_for_function(&f, false).unwrap();
        assert!(harness.source_code.contains("auto result = compute(x);"));
        assert!(harness.source_code.contains("(void)result;"));
    }

    #[test]
    fn test_sequence_harness_has_calls_in_order() {
        let generator = HarnessGenerator::new(None, None);
        let functions = vec![
            func("init", "void", &[]),
            func("process", "int", &["uint8_t* buf", "size_t len"]),
            func("cleanup", "void", &[]),
        ];
        let usage = UsageContext {
            name: "lifecycle".to_string(),
            calls: vec![
                "init".to_string(),
                "process".to_string(),
                "cleanup".to_string(),
            ],
            ..Default::default()
        };
        let harness = generator
            .generate_for_sequence(&usage, &functions, false)
            .unwrap();

        let src = &harness.source_code;
        let init_pos = src.find("init();").unwrap();
        let process_pos = src.find("process(step1_buf, step1_len)").unwrap();
        let cleanup_pos = src.find("cleanup();").unwrap();
        assert!(init_pos < process_pos && process_pos < cleanup_pos);
        // The buffer/size pair is consumed with the step prefix.
        assert!(src.contains("size_t step1_len = fdp.ConsumeIntegralInRange<size_t>"));
        assert_eq!(harness.function_name, "sequence_lifecycle");
    }

    #[test]
    fn test_sequence_resource_return_gets_cleanup_todo() {
        let generator = HarnessGenerator::new(None, None);
        let functions = vec![func("open_thing", "thing_t *", &[])];
        let usage = UsageContext {
            calls: vec!["open_thing".to_string()],
            ..Default::default()
        };
        let harness = generator
            .generate_for_sequence(&usage, &functions, false)
            .unwrap();
        assert!(harness.source_code.contains("// TODO: cleanup result_0 from open_thing"));
    }

    #[test]
    fn test_sequence_unknown_call_is_todo_comment() {
        let generator = HarnessGenerator::new(None, None);
        let usage = UsageContext {
            calls: vec!["mystery".to_string()],
            ..Default::default()
        };
        let harness = generator.generate_for_sequence(&usage, &[], false).unwrap();
        assert!(harness.source_code.contains("// TODO: mystery(...);"));
    }

    #[test]
    fn test_llm_path_extracts_fenced_code() {
        let llm = CannedLlm(
            "Here you go:\n```cpp\n#include <stdint.h>\nextern \"C\" int LLVMFuzzerTestOneInput(const uint8_t *data, size_t size) { return 0; }\n```\nHope it helps!".to_string(),
        );
        let generator = HarnessGenerator::new(Some(&llm), None);
        let f = func("f", "void", &[]);
        let harness = generator.generate_for_function(&f, true).unwrap();
        assert!(harness.source_code.starts_with("#include <stdint.h>"));
        assert!(!harness.source_code.contains("Hope it helps"));
    }

    #[test]
    fn test_llm_path_scans_from_first_directive() {
        let llm = CannedLlm(
            "Sure! Here is the harness.\n#include <stdint.h>\nint x;\n".to_string(),
        );
        let generator = HarnessGenerator::new(Some(&llm), None);
        let f = func("f", "void", &[]);
        let harness = generator.generate_for_function(&f, true).unwrap();
        assert!(harness.source_code.starts_with("#include <stdint.h>"));
    }

    #[test]
    fn test_batch_ordering_and_categories() {
        let generator = HarnessGenerator::new(None, None);
        let mut api = func("api_fn", "void", &[]);
        api.is_api = true;
        let mut candidate = func("candidate_fn", "void", &[]);
        candidate.is_fuzz_candidate = true;
        let plain = func("plain_fn", "void", &[]);
        let functions = vec![plain.clone(), candidate.clone(), api.clone()];
        let usage = UsageContext {
            name: "seq".to_string(),
            calls: vec!["api_fn".to_string()],
            ..Default::default()
        };

        let harnesses = generator.generate_batch(&functions, &[usage], false, None, true);
        let order: Vec<(&str, &str)> = harnesses
            .iter()
            .map(|h| (h.function_name.as_str(), h.category.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("api_fn", CATEGORY_API),
                ("sequence_seq", CATEGORY_USAGE_CONTEXTS),
                ("candidate_fn", CATEGORY_OTHER),
                ("plain_fn", CATEGORY_OTHER),
            ]
        );
    }

    #[test]
    fn test_batch_cap_truncates_from_end() {
        let generator = HarnessGenerator::new(None, None);
        let functions = vec![
            func("a", "void", &[]),
            func("b", "void", &[]),
            func("c", "void", &[]),
        ];
        let harnesses = generator.generate_batch(&functions, &[], false, Some(2), true);
        assert_eq!(harnesses.len(), 2);
        assert_eq!(harnesses[0].function_name, "a");
        assert_eq!(harnesses[1].function_name, "b");
    }

    #[test]
    fn test_batch_llm_failure_yields_invalid_harness() {
        let llm = FailingLlm;
        let generator = HarnessGenerator::new(Some(&llm), None);
        let functions = vec![func("f", "void", &[])];
        let harnesses = generator.generate_batch(&functions, &[], true, None, true);
        assert_eq!(harnesses.len(), 1);
        assert!(!harnesses[0].is_valid());
        assert!(!harnesses[0].validation_errors().is_empty());
    }

    #[test]
    fn test_write_harnesses_uses_category_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let generator = HarnessGenerator::new(None, Some(dir.path().to_path_buf()));
        let mut h = GeneratedHarness::new(
            "f",
            "harness_f.cpp",
            "// source",
            vec![],
            vec![],
            vec![],
        );
        h.category = CATEGORY_API.to_string();
        let written = generator.write_harnesses(&[h], None, true).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("api/harness_f.cpp"));
        assert!(written[0].exists());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("ns::Foo::bar"), "ns_Foo_bar");
        assert_eq!(sanitize_name("__weird__"), "weird");
        assert!(sanitize_name(&"x".repeat(100)).len() <= 50);
    }

    #[test]
    fn test_header_for_source_extensions() {
        assert_eq!(header_for("src/foo.c").as_deref(), Some("src/foo.h"));
        assert_eq!(header_for("src/foo.cpp").as_deref(), Some("src/foo.h"));
        assert_eq!(header_for(""), None);
        assert_eq!(header_for("src/foo.rs"), None);
    }
}
