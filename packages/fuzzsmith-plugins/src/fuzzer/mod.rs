//! Built-in fuzzer engines. Both degrade gracefully when the underlying
//! tool is absent: an unsuccessful or empty result, never an error.

mod aflpp;
mod libfuzzer;

pub use aflpp::AflPlusPlusEngine;
pub use libfuzzer::LibFuzzerEngine;
