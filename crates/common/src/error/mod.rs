//! Common error types shared across Tracklink crates.
//!
//! Module-specific errors should **compose** with `CommonError` rather than
//! duplicating these patterns: embed it with `#[error(transparent)]` and a
//! `#[from]` conversion.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the shared resilience primitives.
#[derive(Debug, Clone, Error)]
pub enum CommonError {
    /// Invalid configuration supplied at construction time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation exceeded its deadline.
    #[error("Operation '{operation}' timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },
}

impl CommonError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout { operation: operation.into(), elapsed }
    }
}

/// Result type for operations that can fail with a [`CommonError`].
pub type CommonResult<T> = Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_message() {
        let err = CommonError::config("capacity out of range");
        assert!(err.to_string().contains("capacity out of range"));
    }

    #[test]
    fn timeout_error_names_operation() {
        let err = CommonError::timeout("batch_submit", Duration::from_secs(30));
        assert!(err.to_string().contains("batch_submit"));
        assert!(err.to_string().contains("30s"));
    }
}
