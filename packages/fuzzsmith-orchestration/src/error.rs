use thiserror::Error;

use fuzzsmith_core::error::CoreError;

pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestrationError {
    pub fn pipeline<E: std::fmt::Display>(e: E) -> Self {
        Self::Pipeline(e.to_string())
    }

    pub fn build<E: std::fmt::Display>(e: E) -> Self {
        Self::Build(e.to_string())
    }

    pub fn analysis<E: std::fmt::Display>(e: E) -> Self {
        Self::Analysis(e.to_string())
    }
}
