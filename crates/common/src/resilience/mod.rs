//! Resilience patterns for talking to rate-limited remote services.
//!
//! This module provides **generic, reusable** primitives:
//! - **Rate limiter**: keyed token buckets with lazy, elapsed-time refill and
//!   suspending admission
//! - **Retry executor**: bounded retries with classification-driven
//!   exponential backoff and jitter
//! - **Attempt observer**: a fire-and-forget sink for structured attempt
//!   events, keeping the retry executor free of direct logging
//! - **Clock**: a monotonic time abstraction so refill and backoff behavior
//!   can be tested deterministically
//!
//! The implementations are generic over error types; callers supply the
//! domain classification through the [`Retryable`] trait.

pub mod clock;
pub mod observer;
pub mod rate_limiter;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use observer::{AttemptEvent, AttemptObserver, AttemptOutcome, NoopObserver, TracingObserver};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{Retryable, RetryClass, RetryError, RetryExecutor, RetryPolicy};
