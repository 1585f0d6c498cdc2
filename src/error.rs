//! Error types for bench-results

use thiserror::Error;

use crate::reporting::Capability;

#[derive(Error, Debug)]
pub enum ReportError {
    /// A result lacks required identity, or a value cannot be divided by.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Aggregated counters or stream bins cannot be made consistent.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Reporter '{reporter}' does not support {capability}")]
    BackendUnsupported {
        reporter: String,
        capability: Capability,
    },

    #[error("Backend '{backend}' failed: {message}")]
    BackendTransient { backend: String, message: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ReportError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::BackendUnsupported { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<toml::de::Error> for ReportError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<redis::RedisError> for ReportError {
    fn from(err: redis::RedisError) -> Self {
        Self::BackendTransient {
            backend: "redis".into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
