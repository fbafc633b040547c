//! Error taxonomy.

use thiserror::Error;

/// Top-level error type for the Guardrail Engine.
#[derive(Debug, Error)]
pub enum SgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("scanner '{scanner_id}' panicked internally: {message}")]
    ScannerInternal { scanner_id: String, message: String },

    #[error("provider error ({provider}): {message}")]
    Provider { provider: &'static str, message: String },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("cancelled: {0}")]
    Cancellation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

pub type Result<T> = std::result::Result<T, SgeError>;
