//! Typed errors for the API client.
//!
//! Every failure surfaced by this crate is an [`ApiError`]. Transport
//! adapters map wire-level failures into the `Network`/`Timeout` variants;
//! HTTP status codes are folded in through [`ApiError::from_status`]. The
//! [`Retryable`] impl is the single source of truth for which failures the
//! retry layer may re-attempt.

use std::time::Duration;

use thiserror::Error;
use tracklink_common::error::CommonError;
use tracklink_common::resilience::{RetryClass, RetryError, Retryable};

/// Result alias used throughout the client.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the client.
///
/// `Clone` is required because an aggregate batch failure is replicated
/// across every affected per-item result.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Connection-level failure before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// The server throttled the request (HTTP 429).
    #[error("rate limited by server: {0}")]
    RateLimited(String),

    /// Server-side failure (HTTP 5xx).
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Caller-side failure (HTTP 4xx other than 429).
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    /// The response cannot be trusted (e.g. batch count mismatch).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid configuration detected before dispatch.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A batch grew past its size limit.
    #[error("batch capacity exceeded: limit is {max} operations")]
    CapacityExceeded { max: usize },

    /// The request did not complete within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled before this operation was dispatched.
    #[error("operation cancelled before dispatch")]
    Cancelled,

    /// The retry budget was spent; carries the last underlying cause.
    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    /// Map an HTTP status code to the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    /// The HTTP status behind this error, if there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited(_) => Some(429),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::Exhausted { source, .. } => source.status_code(),
            _ => None,
        }
    }
}

impl Retryable for ApiError {
    fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) | Self::RateLimited(_) | Self::Timeout(_) => RetryClass::Transient,
            // Only the overload-shaped 5xx codes are worth retrying.
            Self::Server { status, .. } if matches!(status, 500 | 502 | 503 | 504) => {
                RetryClass::Transient
            }
            Self::Client { status: 408, .. } => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }
}

impl From<CommonError> for ApiError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::Config(message) => Self::Config(message),
            CommonError::Timeout { elapsed, .. } => Self::Timeout(elapsed),
        }
    }
}

impl From<RetryError<ApiError>> for ApiError {
    fn from(error: RetryError<ApiError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, source } => {
                Self::Exhausted { attempts, source: Box::new(source) }
            }
            // Fatal errors pass through untouched; no attempt metadata to add.
            RetryError::Fatal { source } => source,
        }
    }
}
