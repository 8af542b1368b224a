//! Error types for the machine crates

use thiserror::Error;

/// Core error type
///
/// Only configuration and I/O boundaries produce errors. The state machines
/// themselves clamp invalid input and absorb ordering anomalies instead.
#[derive(Error, Debug)]
pub enum PkError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias
pub type PkResult<T> = Result<T, PkError>;
