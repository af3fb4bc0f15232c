//! Built-in reporters. All writes are idempotent overwrites.

mod json;
mod sarif;

pub use json::JsonReporter;
pub use sarif::SarifReporter;
