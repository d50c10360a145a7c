//! Error types for stepwright.
//!
//! Validation findings are reported as data (see [`crate::validation`]);
//! this enum covers everything that actually aborts an operation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for stepwright operations.
pub type Result<T> = std::result::Result<T, Error>;

/// stepwright error types.
///
/// Each variant maps to a stable code so callers can branch on it without
/// matching message text.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("All providers failed (attempted: {}): {last_error}", attempted.join(", "))]
    AllProvidersFailed {
        attempted: Vec<String>,
        last_error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the machine-parseable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "PARSE_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Tool(_) => "TOOL_ERROR",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::Cancelled => "CANCELLED",
            Error::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Tool(_) | Error::Timeout(_) | Error::AllProvidersFailed { .. } | Error::Io(_)
        )
    }
}

/// Serializable error summary, used in manifests and CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            step: None,
        }
    }

    pub fn with_step(mut self, step: &str) -> Self {
        self.step = Some(step.to_string());
        self
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        ErrorResponse::new(err.code(), err.to_string())
    }
}
