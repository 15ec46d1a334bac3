// Error types for the load-test harness
//
// Only run-level problems surface here. Per-request failures are recorded
// in RequestRecord (see record::FailureReason) and never propagate.

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that abort a run before or outside pattern execution
#[derive(Debug, Error)]
pub enum BenchError {
    /// Pre-flight probe could not reach the endpoint
    #[error("Connectivity failure for {url}: {reason}")]
    Connectivity { url: String, reason: String },

    /// Invalid configuration or pattern definition
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Run plan could not be parsed
    #[error("Plan parse error: {0}")]
    Plan(#[from] serde_yaml::Error),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Report output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Create a connectivity error
    pub fn connectivity(url: impl Into<String>, reason: impl Into<String>) -> Self {
        BenchError::Connectivity {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }

    /// Whether this error is a pre-flight connectivity failure
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BenchError::Connectivity { .. })
    }
}
