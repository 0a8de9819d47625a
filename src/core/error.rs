//! Error types for layercast

use thiserror::Error;

/// Main error type for conversions
#[derive(Debug, Error)]
pub enum Error {
    /// Incoming message does not have the expected pixel layout.
    /// The destination of the conversion is left untouched.
    #[error("Format mismatch: expected {expected}, found {found}")]
    FormatMismatch { expected: String, found: String },

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Compute stream error: {0}")]
    Stream(String),

    /// Request rejected before any work was launched
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn format_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::FormatMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
