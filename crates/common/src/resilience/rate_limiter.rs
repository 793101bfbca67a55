//! Keyed token-bucket admission control.
//!
//! Each key owns an independent bucket created lazily on first use and kept
//! for the life of the process. Refill is computed lazily from elapsed time
//! at each admission; there is no background timer. [`RateLimiter::acquire`]
//! suspends the caller until a token is available instead of failing, so a
//! very low refill rate produces long waits, never an error.
//!
//! All admissions against one key are serialized through that bucket's
//! async mutex (held across the wait), so concurrent callers can never
//! observe stale token counts and over-admit. Buckets for different keys
//! never contend.

use std::time::Duration;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use crate::error::{CommonError, CommonResult};

/// Inclusive capacity bounds accepted by [`RateLimitConfig`].
pub const CAPACITY_MIN: u32 = 10;
pub const CAPACITY_MAX: u32 = 2000;
/// Inclusive refill-rate bounds (tokens per second).
pub const REFILL_RATE_MIN: f64 = 0.1;
pub const REFILL_RATE_MAX: f64 = 50.0;

/// Configuration for one key's token bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum number of tokens the bucket can hold.
    pub capacity: u32,
    /// Tokens replenished per second.
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: 100, refill_rate: 10.0 }
    }
}

impl RateLimitConfig {
    /// Create a config, validating both bounds.
    pub fn new(capacity: u32, refill_rate: f64) -> CommonResult<Self> {
        let config = Self { capacity, refill_rate };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration against the accepted bounds.
    pub fn validate(&self) -> CommonResult<()> {
        if !(CAPACITY_MIN..=CAPACITY_MAX).contains(&self.capacity) {
            return Err(CommonError::config(format!(
                "capacity must be between {} and {}, got {}",
                CAPACITY_MIN, CAPACITY_MAX, self.capacity
            )));
        }
        if !(REFILL_RATE_MIN..=REFILL_RATE_MAX).contains(&self.refill_rate) {
            return Err(CommonError::config(format!(
                "refill_rate must be between {} and {}, got {}",
                REFILL_RATE_MIN, REFILL_RATE_MAX, self.refill_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(config: RateLimitConfig, now: Instant) -> Self {
        let tokens = f64::from(config.capacity);
        Self { config, state: Mutex::new(BucketState { tokens, last_refill: now }) }
    }
}

/// Refill tokens for the elapsed time, clamped to `[0, capacity]`.
fn refill(state: &mut BucketState, config: &RateLimitConfig, now: Instant) {
    let elapsed = now.saturating_duration_since(state.last_refill);
    let replenished = elapsed.as_secs_f64() * config.refill_rate;
    state.tokens = (state.tokens + replenished).clamp(0.0, f64::from(config.capacity));
    state.last_refill = now;
}

/// Per-key token-bucket rate limiter.
///
/// Buckets are created lazily with the default configuration on first use;
/// [`RateLimiter::configure`] installs a fresh, full bucket with explicit
/// bounds for a key.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    buckets: DashMap<String, Arc<TokenBucket>>,
    defaults: RateLimitConfig,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a limiter with the system clock.
    pub fn new(defaults: RateLimitConfig) -> CommonResult<Self> {
        Self::with_clock(defaults, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter with a custom clock.
    pub fn with_clock(defaults: RateLimitConfig, clock: C) -> CommonResult<Self> {
        defaults.validate()?;
        Ok(Self { buckets: DashMap::new(), defaults, clock })
    }

    /// Install a bucket for `key` with explicit bounds.
    ///
    /// Out-of-range values fail before any bucket is created or replaced.
    /// A previously existing bucket for the key is replaced by a fresh,
    /// full one.
    pub fn configure(&self, key: &str, config: RateLimitConfig) -> CommonResult<()> {
        config.validate()?;
        let bucket = Arc::new(TokenBucket::new(config, self.clock.now()));
        self.buckets.insert(key.to_string(), bucket);
        Ok(())
    }

    fn bucket(&self, key: &str) -> Arc<TokenBucket> {
        if let Some(existing) = self.buckets.get(key) {
            return Arc::clone(&existing);
        }
        let created = Arc::new(TokenBucket::new(self.defaults.clone(), self.clock.now()));
        // entry() re-checks under the shard lock so racing creators agree.
        Arc::clone(&self.buckets.entry(key.to_string()).or_insert(created))
    }

    /// Admit one request for `key`, suspending until a token is available.
    ///
    /// The bucket's mutex is held across the wait, so admissions per key
    /// are strictly serialized and consume exactly one token each.
    pub async fn acquire(&self, key: &str) {
        let bucket = self.bucket(key);
        let mut state = bucket.state.lock().await;

        refill(&mut state, &bucket.config, self.clock.now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return;
        }

        // Exact wait for the deficit to replenish at the configured rate.
        let deficit = 1.0 - state.tokens;
        let wait = Duration::from_secs_f64(deficit / bucket.config.refill_rate);
        debug!(key, wait = ?wait, "rate limit reached, waiting for token");
        tokio::time::sleep(wait).await;

        refill(&mut state, &bucket.config, self.clock.now());
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    /// Admit one request for `key` only if a token is immediately available.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let bucket = self.bucket(key);
        let mut state = bucket.state.lock().await;

        refill(&mut state, &bucket.config, self.clock.now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            debug!(key, tokens = state.tokens, "rate limit: no token available");
            false
        }
    }

    /// Current token count for `key` after a lazy refill.
    pub async fn available_tokens(&self, key: &str) -> f64 {
        let bucket = self.bucket(key);
        let mut state = bucket.state.lock().await;
        refill(&mut state, &bucket.config, self.clock.now());
        state.tokens
    }

    /// Reset `key`'s bucket to full capacity.
    pub async fn reset(&self, key: &str) {
        let bucket = self.bucket(key);
        let mut state = bucket.state.lock().await;
        state.tokens = f64::from(bucket.config.capacity);
        state.last_refill = self.clock.now();
    }
}

#[cfg(test)]
mod tests {
    use super::super::clock::MockClock;
    use super::*;

    fn limiter_with_mock(capacity: u32, refill_rate: f64) -> (RateLimiter<MockClock>, MockClock) {
        let clock = MockClock::new();
        let limiter = RateLimiter::with_clock(RateLimitConfig::default(), clock.clone()).unwrap();
        limiter.configure("k", RateLimitConfig { capacity, refill_rate }).unwrap();
        (limiter, clock)
    }

    #[test]
    fn config_bounds_are_enforced() {
        assert!(RateLimitConfig::new(9, 1.0).is_err());
        assert!(RateLimitConfig::new(2001, 1.0).is_err());
        assert!(RateLimitConfig::new(100, 0.05).is_err());
        assert!(RateLimitConfig::new(100, 50.1).is_err());
        assert!(RateLimitConfig::new(10, 0.1).is_ok());
        assert!(RateLimitConfig::new(2000, 50.0).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn configure_rejects_bad_bounds_without_touching_bucket() {
        let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
        limiter.configure("k", RateLimitConfig { capacity: 10, refill_rate: 1.0 }).unwrap();

        // Drain a few tokens, then fail a reconfigure; state must survive.
        assert!(limiter.try_acquire("k").await);
        assert!(limiter.try_acquire("k").await);
        let before = limiter.available_tokens("k").await;

        let result = limiter.configure("k", RateLimitConfig { capacity: 5000, refill_rate: 1.0 });
        assert!(result.is_err());
        assert_eq!(limiter.available_tokens("k").await, before);
    }

    #[tokio::test]
    async fn tokens_never_exceed_capacity_or_drop_below_zero() {
        let (limiter, clock) = limiter_with_mock(10, 50.0);

        for _ in 0..10 {
            assert!(limiter.try_acquire("k").await);
        }
        assert!(!limiter.try_acquire("k").await);
        assert!(limiter.available_tokens("k").await >= 0.0);

        // A long idle period must cap at capacity, not accumulate.
        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.available_tokens("k").await, 10.0);
    }

    #[tokio::test]
    async fn lazy_refill_tracks_elapsed_time() {
        let (limiter, clock) = limiter_with_mock(10, 2.0);

        for _ in 0..10 {
            assert!(limiter.try_acquire("k").await);
        }
        assert!(!limiter.try_acquire("k").await);

        clock.advance_millis(500); // 1 token at 2/s
        assert!(limiter.try_acquire("k").await);
        assert!(!limiter.try_acquire("k").await);

        clock.advance_millis(1500); // 3 more tokens
        assert!((limiter.available_tokens("k").await - 3.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn admission_bound_burst_then_spaced_tail() {
        let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
        limiter.configure("sync", RateLimitConfig { capacity: 200, refill_rate: 3.33 }).unwrap();

        let start = Instant::now();
        for _ in 0..200 {
            limiter.acquire("sync").await;
        }
        // Burst capacity admits the first 200 without waiting.
        assert!(start.elapsed() < Duration::from_millis(50));

        for _ in 0..50 {
            limiter.acquire("sync").await;
        }
        // The remaining 50 are spaced at ~0.3s: ~15s total tail.
        let tail = start.elapsed();
        assert!(tail >= Duration::from_secs(14), "tail was {tail:?}");
        assert!(tail <= Duration::from_secs(16), "tail was {tail:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn keys_do_not_block_each_other() {
        let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();
        limiter.configure("slow", RateLimitConfig { capacity: 10, refill_rate: 0.1 }).unwrap();
        limiter.configure("fast", RateLimitConfig { capacity: 10, refill_rate: 50.0 }).unwrap();

        // Exhaust the slow bucket entirely.
        for _ in 0..10 {
            limiter.acquire("slow").await;
        }

        // The fast key is unaffected by the slow key's empty bucket.
        let start = Instant::now();
        limiter.acquire("fast").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn concurrent_acquires_consume_exactly_one_token_each() {
        let limiter =
            Arc::new(RateLimiter::new(RateLimitConfig { capacity: 100, refill_rate: 0.1 }).unwrap());

        let mut handles = Vec::new();
        for _ in 0..60 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire("shared").await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 100 - 60 consumed, allowing a sliver of refill during the test.
        let remaining = limiter.available_tokens("shared").await;
        assert!((40.0..41.0).contains(&remaining), "remaining was {remaining}");
    }

    #[tokio::test]
    async fn reset_restores_full_capacity() {
        let (limiter, _clock) = limiter_with_mock(10, 1.0);

        for _ in 0..10 {
            assert!(limiter.try_acquire("k").await);
        }
        limiter.reset("k").await;
        assert_eq!(limiter.available_tokens("k").await, 10.0);
    }
}
