//! fuzzsmith-generation
//!
//! Parameter-semantics-driven harness synthesis: parse C-like parameter
//! declarations into typed descriptors, pair buffers with their size
//! parameters, and emit fuzz-input-consumption code around the target call.

pub mod harness_generator;
pub mod param_analyzer;
pub mod syntax_validator;

pub use harness_generator::{sanitize_name, HarnessGenerator};
pub use param_analyzer::{
    find_buffer_size_pairs, generate_consume, is_size_param, parse_parameter, ConsumeCode,
    ParamKind, ParsedParam,
};
pub use syntax_validator::SyntaxValidator;
