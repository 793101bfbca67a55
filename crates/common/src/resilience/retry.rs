//! Retry executor with classification-driven exponential backoff.
//!
//! One logical request is attempted up to `max_retries + 1` times. After
//! each failure the error classifies itself through [`Retryable`]: transient
//! errors are retried after `min(max_delay, base_delay * 2^attempt)` plus a
//! uniform jitter of up to 200ms; fatal errors surface immediately without
//! delay. Attempt telemetry goes to an injected [`AttemptObserver`] so the
//! executor itself stays silent.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use super::observer::{AttemptEvent, AttemptObserver, AttemptOutcome};
use crate::error::CommonError;

/// Upper bound on `max_retries` accepted by [`RetryPolicy`].
pub const MAX_RETRIES_LIMIT: u32 = 10;
/// Cap on the backoff exponent to prevent overflow on long retry runs.
const MAX_BACKOFF_EXPONENT: u32 = 20;
/// Upper bound of the uniform jitter added to every backoff delay.
const JITTER_CEILING: Duration = Duration::from_millis(200);

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Expected to succeed on retry (network blip, throttling, overload).
    Transient,
    /// Retrying cannot help; surface immediately.
    Fatal,
}

/// Errors that classify themselves for retry purposes.
pub trait Retryable {
    /// Decide whether this error is worth retrying.
    fn retry_class(&self) -> RetryClass;
}

/// Errors produced by the retry executor.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts failed with transient errors; carries the last cause.
    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The operation failed with a non-retryable error.
    #[error("non-retryable error: {source}")]
    Fatal { source: E },
}

impl<E> RetryError<E> {
    /// Consume the error and return the underlying cause.
    pub fn into_source(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::Fatal { source } => source,
        }
    }
}

/// Immutable retry policy: bounded attempts and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Create a validated policy.
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, CommonError> {
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(CommonError::config(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, max_retries
            )));
        }
        if base_delay > max_delay {
            return Err(CommonError::config(format!(
                "base_delay ({:?}) cannot be greater than max_delay ({:?})",
                base_delay, max_delay
            )));
        }
        Ok(Self { max_retries, base_delay, max_delay })
    }

    /// Maximum number of retries after the initial try.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Base delay for the exponential backoff curve.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Cap applied to the exponential component of the delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Backoff delay before retry number `attempt` (0-based: the first
    /// retry after the initial try is attempt 0).
    ///
    /// `delay = min(max_delay, base_delay * 2^attempt) + uniform(0, 200ms)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u64.saturating_pow(exponent);
        let exponential = self
            .base_delay
            .saturating_mul(multiplier.min(u64::from(u32::MAX)) as u32)
            .min(self.max_delay);

        let jitter_ms = rand::thread_rng().gen_range(0..=JITTER_CEILING.as_millis() as u64);
        exponential + Duration::from_millis(jitter_ms)
    }
}

/// Executes one logical operation under a [`RetryPolicy`], reporting each
/// attempt to the observer.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Arc<dyn AttemptObserver>,
}

impl RetryExecutor {
    /// Create an executor with the given policy and observer.
    pub fn new(policy: RetryPolicy, observer: Arc<dyn AttemptObserver>) -> Self {
        Self { policy, observer }
    }

    /// The policy this executor runs under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails fatally, or the retry
    /// budget is spent.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        // attempt counts retries: 0 is the initial try's failure index.
        let mut attempt: u32 = 0;

        loop {
            let attempt_number = attempt + 1;

            match operation().await {
                Ok(value) => {
                    self.observer.record(&AttemptEvent {
                        operation: operation_name.to_string(),
                        attempt: attempt_number,
                        outcome: AttemptOutcome::Succeeded,
                        delay: None,
                        error: None,
                    });
                    return Ok(value);
                }
                Err(error) => {
                    if error.retry_class() == RetryClass::Fatal {
                        self.observer.record(&AttemptEvent {
                            operation: operation_name.to_string(),
                            attempt: attempt_number,
                            outcome: AttemptOutcome::Fatal,
                            delay: None,
                            error: Some(error.to_string()),
                        });
                        return Err(RetryError::Fatal { source: error });
                    }

                    if attempt >= self.policy.max_retries {
                        self.observer.record(&AttemptEvent {
                            operation: operation_name.to_string(),
                            attempt: attempt_number,
                            outcome: AttemptOutcome::Exhausted,
                            delay: None,
                            error: Some(error.to_string()),
                        });
                        return Err(RetryError::Exhausted {
                            attempts: attempt_number,
                            source: error,
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    self.observer.record(&AttemptEvent {
                        operation: operation_name.to_string(),
                        attempt: attempt_number,
                        outcome: AttemptOutcome::RetryScheduled,
                        delay: Some(delay),
                        error: Some(error.to_string()),
                    });

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor").field("policy", &self.policy).finish_non_exhaustive()
    }
}
