//! Client configuration.
//!
//! All tunables are supplied up front through [`ClientConfig`] and validated
//! at construction; nothing is loaded lazily mid-request.

use std::time::Duration;

use tracklink_common::resilience::{RateLimitConfig, RetryPolicy};

use crate::errors::{ApiError, ApiResult};

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default path of the batch endpoint, relative to the base URL.
pub const DEFAULT_BATCH_PATH: &str = "/$batch";

/// Static configuration for a [`crate::TracklinkClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the remote service, without a trailing slash.
    pub base_url: String,
    /// Per-request deadline applied at the transport.
    pub timeout: Duration,
    /// User agent sent on every request.
    pub user_agent: String,
    /// Path of the batch endpoint, relative to `base_url`.
    pub batch_path: String,
    /// Admission budget shared by all requests against `base_url`.
    pub rate_limit: RateLimitConfig,
    /// Default retry behavior for every request.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Create a config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("tracklink-client/", env!("CARGO_PKG_VERSION")).to_string(),
            batch_path: DEFAULT_BATCH_PATH.to_string(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_path(mut self, path: impl Into<String>) -> Self {
        self.batch_path = path.into();
        self
    }

    /// Validate the configuration before any request is dispatched.
    pub fn validate(&self) -> ApiResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::Config(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ApiError::Config("timeout must be non-zero".to_string()));
        }
        if self.batch_path.is_empty() {
            return Err(ApiError::Config("batch_path must not be empty".to_string()));
        }
        self.rate_limit.validate()?;
        Ok(())
    }

    /// Absolute URL for a target path relative to the base.
    pub fn url_for(&self, target: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), target.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::new("https://tracker.example.com");
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.batch_path, "/$batch");
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config = ClientConfig::new("tracker.example.com");
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config =
            ClientConfig::new("https://tracker.example.com").with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_rate_limit() {
        let config = ClientConfig::new("https://tracker.example.com")
            .with_rate_limit(RateLimitConfig { capacity: 5, refill_rate: 1.0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn url_join_normalizes_slashes() {
        let config = ClientConfig::new("https://tracker.example.com/");
        assert_eq!(config.url_for("/items/12"), "https://tracker.example.com/items/12");
        assert_eq!(config.url_for("items/12"), "https://tracker.example.com/items/12");
    }
}
