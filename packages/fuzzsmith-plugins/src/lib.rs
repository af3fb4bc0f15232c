//! fuzzsmith-plugins
//!
//! Built-in implementations of the pluggable component kinds: the C/C++
//! CodeQL analyzer, LLM providers, fuzzer engines, and reporters, plus the
//! explicit startup registration that wires them (and the built-in stages)
//! into a `ComponentRegistry`. Registration is last-writer-wins, so
//! downstream code can override any built-in by re-registering its name.

pub mod cpp;
pub mod fuzzer;
pub mod llm;
pub mod reporters;

pub use cpp::CppAnalyzer;
pub use fuzzer::{AflPlusPlusEngine, LibFuzzerEngine};
pub use llm::{AnthropicProvider, OllamaProvider, OpenAiProvider};
pub use reporters::{JsonReporter, SarifReporter};

use std::collections::HashMap;

use fuzzsmith_core::registry::ComponentRegistry;
use fuzzsmith_orchestration::stages::register_stages;

/// Register every built-in component and pipeline stage.
pub fn register_builtins(registry: &mut ComponentRegistry) {
    registry.register_llm(
        "openai",
        |options| Box::new(OpenAiProvider::from_options(options)),
        HashMap::new(),
    );
    registry.register_llm(
        "ollama",
        |options| Box::new(OllamaProvider::from_options(options)),
        HashMap::new(),
    );
    registry.register_llm(
        "anthropic",
        |options| Box::new(AnthropicProvider::from_options(options)),
        HashMap::new(),
    );

    registry.register_fuzzer("libfuzzer", |_| Box::new(LibFuzzerEngine::new()), HashMap::new());
    registry.register_fuzzer(
        "aflpp",
        |options| Box::new(AflPlusPlusEngine::from_options(options)),
        HashMap::new(),
    );

    registry.register_language("cpp", || Box::new(CppAnalyzer::new()));

    registry.register_reporter("json", || Box::new(JsonReporter::new()));
    registry.register_reporter("sarif", || Box::new(SarifReporter::new()));

    register_stages(registry);
}
