//! Error types for TraceSink

use thiserror::Error;

/// Result type alias using TraceSink's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for TraceSink operations
#[derive(Error, Debug)]
pub enum Error {
    /// One or more span payloads had fields of the wrong shape
    #[error("Malformed payload in {count} item(s): {detail}")]
    MalformedPayload { count: usize, detail: String },

    /// An exporter failed, panicked or timed out
    #[error("Exporter '{exporter}' failed: {message}")]
    Exporter { exporter: String, message: String },

    /// The processor has been shut down or its worker is gone
    #[error("Processor shut down")]
    Shutdown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a malformed payload error for a single item
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedPayload {
            count: 1,
            detail: detail.into(),
        }
    }

    /// Create an exporter failure
    pub fn exporter(exporter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exporter {
            exporter: exporter.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
