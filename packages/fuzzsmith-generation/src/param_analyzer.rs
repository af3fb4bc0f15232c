//! C/C++ parameter analysis for FuzzedDataProvider-based harness bodies.
//!
//! Parses raw parameter declaration strings into typed descriptors, pairs
//! buffer/string parameters with nearby size parameters by naming
//! heuristics, and emits the consume statement for each parameter.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use fuzzsmith_core::schema::ParamRole;

/// Kind of parameter for harness generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// int, size_t, uint32_t, ...
    Integral,
    /// float, double
    Floating,
    Bool,
    /// single char
    Char,
    /// char*, const char*
    String,
    /// uint8_t*, void*, byte array
    Buffer,
    /// other pointer types
    Pointer,
    /// struct/class types
    Struct,
    Enum,
    #[default]
    Unknown,
}

/// Parsed parameter information. Derived fresh per harness-generation call;
/// never cached across functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedParam {
    pub name: String,
    pub type_str: String,
    pub kind: ParamKind,
    pub is_const: bool,
    pub is_pointer: bool,
    pub is_array: bool,
    pub array_size: Option<u64>,
    /// Type text with const/`*`/`&` removed and whitespace collapsed.
    pub base_type: String,
    /// Name of the paired size parameter, when one was found.
    pub size_param: Option<String>,
}

const INTEGRAL_TYPES: &[&str] = &[
    "int", "short", "long", "char", "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t",
    "uint16_t", "uint32_t", "uint64_t", "size_t", "ssize_t", "ptrdiff_t", "unsigned", "signed",
    "uchar", "ushort", "uint", "ulong", "BYTE", "WORD", "DWORD", "QWORD",
];

const FLOATING_TYPES: &[&str] = &["float", "double", "long double"];

const BUFFER_POINTER_TYPES: &[&str] = &[
    "uint8_t",
    "int8_t",
    "char",
    "unsigned char",
    "void",
    "BYTE",
    "byte",
];

static ARRAY_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d*)\]").unwrap());

static SIZE_PARAM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^.*_len$",
        r"^.*_size$",
        r"^.*_length$",
        r"^.*_count$",
        r"^len$",
        r"^size$",
        r"^length$",
        r"^count$",
        r"^n$",
        r"^num.*",
        r"^cb.*", // Windows convention: cbSize, cbData
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Parse a single C/C++ parameter declaration string.
///
/// Pure function: the same input always yields field-for-field identical
/// output.
pub fn parse_parameter(raw: &str) -> ParsedParam {
    let mut param_str = raw.trim().to_string();
    if param_str.is_empty() {
        return ParsedParam::default();
    }

    // Array notation: type name[size]. Array implies pointer-like buffer
    // semantics, so the bracket text is removed before further parsing.
    let mut is_array = false;
    let mut array_size = None;
    if let Some(m) = ARRAY_SUFFIX.captures(&param_str) {
        is_array = true;
        let digits = m.get(1).map(|g| g.as_str()).unwrap_or("");
        if !digits.is_empty() {
            array_size = digits.parse::<u64>().ok();
        }
        let start = m.get(0).map(|g| g.start()).unwrap_or(param_str.len());
        param_str.truncate(start);
        param_str = param_str.trim().to_string();
    }

    // Split on the last whitespace boundary into (type, name). A single
    // token is an unnamed parameter: the whole token is the type.
    let (mut type_str, mut name) = match param_str.rfind(char::is_whitespace) {
        Some(idx) => (
            param_str[..idx].trim().to_string(),
            param_str[idx..].trim().to_string(),
        ),
        None => (param_str.clone(), String::new()),
    };

    // Fold a `*` stuck to the name back into the type so "char* s" and
    // "char *s" parse identically.
    if let Some(stripped) = name.strip_prefix('*') {
        type_str.push_str(" *");
        name = stripped.to_string();
    }

    let is_const = type_str.contains("const");
    let is_pointer = type_str.contains('*') || is_array;

    let base_type = type_str
        .replace("const", "")
        .replace(['*', '&'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let kind = classify_type(&base_type, is_pointer, is_array);

    ParsedParam {
        name,
        type_str,
        kind,
        is_const,
        is_pointer,
        is_array,
        array_size,
        base_type,
        size_param: None,
    }
}

fn classify_type(base_type: &str, is_pointer: bool, is_array: bool) -> ParamKind {
    let base_lower = base_type.to_lowercase();

    if base_type == "bool" || base_lower == "_bool" {
        return ParamKind::Bool;
    }

    if FLOATING_TYPES.contains(&base_type) {
        return ParamKind::Floating;
    }

    if is_pointer && (base_type == "char" || base_type == "wchar_t") {
        return ParamKind::String;
    }

    if is_pointer || is_array {
        if BUFFER_POINTER_TYPES.contains(&base_type) {
            return ParamKind::Buffer;
        }
        // Pointers to numeric types still fuzz as byte buffers.
        if INTEGRAL_TYPES.contains(&base_type) || FLOATING_TYPES.contains(&base_type) {
            return ParamKind::Buffer;
        }
        return ParamKind::Pointer;
    }

    // Multi-word types like "unsigned int", "long long".
    if base_type
        .split_whitespace()
        .any(|w| INTEGRAL_TYPES.contains(&w))
    {
        return ParamKind::Integral;
    }

    if base_lower.contains("enum") {
        return ParamKind::Enum;
    }

    if base_lower.contains("struct") || base_lower.contains("class") {
        return ParamKind::Struct;
    }

    if base_type == "char" {
        return ParamKind::Char;
    }

    ParamKind::Unknown
}

/// True when a parameter name suggests it carries a size/length.
pub fn is_size_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    SIZE_PARAM_PATTERNS.iter().any(|re| re.is_match(&lower))
}

/// Group parameters into (value, optional-size) pairs.
///
/// Single left-to-right scan: each Buffer/String looks ahead at most two
/// positions for the first Integral whose name looks like a size; a matched
/// size is recorded on the buffer and never re-emitted standalone. Every
/// input parameter lands in exactly one output pair.
pub fn find_buffer_size_pairs(
    params: &[ParsedParam],
) -> Vec<(ParsedParam, Option<ParsedParam>)> {
    let mut pairs = Vec::new();

    for (i, param) in params.iter().enumerate() {
        match param.kind {
            ParamKind::Buffer | ParamKind::String => {
                let mut size_param = None;
                for candidate in params.iter().take(params.len().min(i + 3)).skip(i + 1) {
                    if candidate.kind == ParamKind::Integral && is_size_param(&candidate.name) {
                        size_param = Some(candidate.clone());
                        break;
                    }
                }
                let mut buffer = param.clone();
                buffer.size_param = size_param.as_ref().map(|p| p.name.clone());
                pairs.push((buffer, size_param));
            }
            // Consumed as part of a pair (or standalone size noise); either
            // way it must not produce a duplicate declaration.
            ParamKind::Integral if is_size_param(&param.name) => continue,
            _ => pairs.push((param.clone(), None)),
        }
    }

    pairs
}

/// Generated consume statement(s) for one parameter.
#[derive(Debug, Clone, Default)]
pub struct ConsumeCode {
    pub code: String,
    pub var_name: String,
    pub size_var_name: Option<String>,
}

/// Emit FuzzedDataProvider consume code for a parameter.
///
/// A semantic role from upstream analysis wins over the syntactic kind.
pub fn generate_consume(
    param: &ParsedParam,
    size_param: Option<&ParsedParam>,
    name_prefix: &str,
    role: Option<ParamRole>,
) -> ConsumeCode {
    let name = format!(
        "{}{}",
        name_prefix,
        if param.name.is_empty() { "arg" } else { &param.name }
    );
    let size_name = size_param.map(|p| format!("{}{}", name_prefix, p.name));

    if let Some(role) = role {
        if let Some(code) = consume_for_role(role, param, &name) {
            return code;
        }
    }

    match param.kind {
        ParamKind::Bool => ConsumeCode {
            code: format!("    bool {name} = fdp.ConsumeBool();"),
            var_name: name,
            size_var_name: None,
        },
        ParamKind::Char => ConsumeCode {
            code: format!("    char {name} = fdp.ConsumeIntegral<char>();"),
            var_name: name,
            size_var_name: None,
        },
        ParamKind::Integral => {
            let cpp_type = normalize_integral_type(&param.base_type);
            ConsumeCode {
                code: format!("    {cpp_type} {name} = fdp.ConsumeIntegral<{cpp_type}>();"),
                var_name: name,
                size_var_name: None,
            }
        }
        ParamKind::Floating => {
            let cpp_type = &param.base_type;
            ConsumeCode {
                code: format!(
                    "    {cpp_type} {name} = fdp.ConsumeFloatingPoint<{cpp_type}>();"
                ),
                var_name: name,
                size_var_name: None,
            }
        }
        ParamKind::String => consume_string(param, &name, size_name),
        ParamKind::Buffer => consume_buffer(param, &name, size_name),
        ParamKind::Pointer => ConsumeCode {
            code: format!(
                "    {} {name} = nullptr;  // TODO: allocate if needed",
                param.type_str
            ),
            var_name: name,
            size_var_name: None,
        },
        ParamKind::Enum => ConsumeCode {
            code: format!(
                "    auto {name} = static_cast<{}>(fdp.ConsumeIntegral<int>());",
                param.base_type
            ),
            var_name: name,
            size_var_name: None,
        },
        // Unknown/struct: comment only, no declaration. The call expression
        // referencing this name fails syntax validation loudly instead of
        // guessing a value.
        ParamKind::Struct | ParamKind::Unknown => ConsumeCode {
            code: format!("    // TODO: provide value for {} {name}", param.type_str),
            var_name: name,
            size_var_name: None,
        },
    }
}

fn consume_string(param: &ParsedParam, name: &str, size_name: Option<String>) -> ConsumeCode {
    if let Some(size_name) = size_name {
        let mut code = format!(
            "    size_t {size_name} = fdp.ConsumeIntegralInRange<size_t>(0, fdp.remaining_bytes());\n"
        );
        code.push_str(&format!(
            "    std::string {name}_str = fdp.ConsumeBytesAsString({size_name});\n"
        ));
        if param.is_const {
            code.push_str(&format!("    const char* {name} = {name}_str.c_str();"));
        } else {
            code.push_str(&format!(
                "    std::vector<char> {name}_vec({name}_str.begin(), {name}_str.end());\n"
            ));
            code.push_str(&format!("    {name}_vec.push_back('\\0');\n"));
            code.push_str(&format!("    char* {name} = {name}_vec.data();"));
        }
        ConsumeCode {
            code,
            var_name: name.to_string(),
            size_var_name: Some(size_name),
        }
    } else if param.is_const {
        let mut code = format!(
            "    std::string {name}_str = fdp.ConsumeRandomLengthString(1024);\n"
        );
        code.push_str(&format!("    const char* {name} = {name}_str.c_str();"));
        ConsumeCode {
            code,
            var_name: name.to_string(),
            size_var_name: None,
        }
    } else {
        let mut code = format!(
            "    std::string {name}_str = fdp.ConsumeRandomLengthString(1024);\n"
        );
        code.push_str(&format!(
            "    std::vector<char> {name}_vec({name}_str.begin(), {name}_str.end());\n"
        ));
        code.push_str(&format!("    {name}_vec.push_back('\\0');\n"));
        code.push_str(&format!("    char* {name} = {name}_vec.data();"));
        ConsumeCode {
            code,
            var_name: name.to_string(),
            size_var_name: None,
        }
    }
}

fn consume_buffer(param: &ParsedParam, name: &str, size_name: Option<String>) -> ConsumeCode {
    let ptr_type = if param.is_const {
        "const uint8_t*"
    } else {
        "uint8_t*"
    };
    if let Some(size_name) = size_name {
        let mut code = format!(
            "    size_t {size_name} = fdp.ConsumeIntegralInRange<size_t>(0, fdp.remaining_bytes());\n"
        );
        code.push_str(&format!(
            "    std::vector<uint8_t> {name}_vec = fdp.ConsumeBytes<uint8_t>({size_name});\n"
        ));
        code.push_str(&format!("    {ptr_type} {name} = {name}_vec.data();"));
        ConsumeCode {
            code,
            var_name: name.to_string(),
            size_var_name: Some(size_name),
        }
    } else {
        let mut code = format!(
            "    std::vector<uint8_t> {name}_vec = fdp.ConsumeBytes<uint8_t>(fdp.remaining_bytes());\n"
        );
        code.push_str(&format!("    size_t {name}_size = {name}_vec.size();\n"));
        code.push_str(&format!("    {ptr_type} {name} = {name}_vec.data();"));
        ConsumeCode {
            code,
            var_name: name.to_string(),
            size_var_name: None,
        }
    }
}

fn consume_for_role(role: ParamRole, param: &ParsedParam, name: &str) -> Option<ConsumeCode> {
    match role {
        ParamRole::FilePath | ParamRole::ConfigPath => {
            let mut code = format!(
                "    std::string {name}_path = \"/tmp/fuzzsmith_{name}\";\n"
            );
            code.push_str("    {\n");
            code.push_str(&format!(
                "        std::vector<uint8_t> {name}_bytes = fdp.ConsumeBytes<uint8_t>(fdp.ConsumeIntegralInRange<size_t>(0, 4096));\n"
            ));
            code.push_str(&format!(
                "        FILE* {name}_fp = fopen({name}_path.c_str(), \"wb\");\n"
            ));
            code.push_str(&format!(
                "        if ({name}_fp) {{ fwrite({name}_bytes.data(), 1, {name}_bytes.size(), {name}_fp); fclose({name}_fp); }}\n"
            ));
            code.push_str("    }\n");
            code.push_str(&format!("    const char* {name} = {name}_path.c_str();"));
            Some(ConsumeCode {
                code,
                var_name: name.to_string(),
                size_var_name: None,
            })
        }
        ParamRole::FileHandle => {
            let mut code = format!(
                "    FILE* {name} = fopen(\"/tmp/fuzzsmith_{name}\", \"wb+\");\n"
            );
            code.push_str(&format!("    if (!{name}) return 0;\n"));
            code.push_str("    {\n");
            code.push_str(&format!(
                "        std::vector<uint8_t> {name}_bytes = fdp.ConsumeBytes<uint8_t>(fdp.ConsumeIntegralInRange<size_t>(0, 4096));\n"
            ));
            code.push_str(&format!(
                "        fwrite({name}_bytes.data(), 1, {name}_bytes.size(), {name});\n"
            ));
            code.push_str(&format!("        rewind({name});\n"));
            code.push_str("    }");
            Some(ConsumeCode {
                code,
                var_name: name.to_string(),
                size_var_name: None,
            })
        }
        ParamRole::Callback => Some(ConsumeCode {
            code: format!(
                "    {} {name} = nullptr;  // TODO: provide a callback implementation",
                param.type_str
            ),
            var_name: name.to_string(),
            size_var_name: None,
        }),
        ParamRole::UserData => Some(ConsumeCode {
            code: format!("    {} {name} = nullptr;", param.type_str),
            var_name: name.to_string(),
            size_var_name: None,
        }),
        ParamRole::Url => {
            let mut code = format!(
                "    std::string {name}_str = \"http://\" + fdp.ConsumeRandomLengthString(64);\n"
            );
            code.push_str(&format!("    const char* {name} = {name}_str.c_str();"));
            Some(ConsumeCode {
                code,
                var_name: name.to_string(),
                size_var_name: None,
            })
        }
        ParamRole::Unknown => None,
    }
}

/// Map shorthand/vendor integral spellings to standard C++ types.
fn normalize_integral_type(type_str: &str) -> &str {
    match type_str {
        "unsigned" => "unsigned int",
        "signed" => "int",
        "uchar" => "unsigned char",
        "ushort" => "unsigned short",
        "uint" => "unsigned int",
        "ulong" => "unsigned long",
        "BYTE" => "uint8_t",
        "WORD" => "uint16_t",
        "DWORD" => "uint32_t",
        "QWORD" => "uint64_t",
        other => other,
    }
}
