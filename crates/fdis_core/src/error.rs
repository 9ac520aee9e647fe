use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error shared by the retrieval core and the service boundary.
///
/// `code` is a stable machine-readable identifier (e.g. `GENERATION_FAILED`);
/// callers branch on it, never on `message`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Request-validation failure, raised before the pipeline starts.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new("QUERY_INVALID", message)
    }

    pub fn is_input_error(&self) -> bool {
        self.code == "QUERY_INVALID"
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
