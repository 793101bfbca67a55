//! Attempt-event observer seam for retry instrumentation.
//!
//! The retry executor reports every attempt through an injected observer
//! instead of logging directly, which keeps it independently testable and
//! lets callers route events to whatever sink they use. Observers must be
//! fire-and-forget: they are called on the request path and must never
//! block it.

use std::time::Duration;

use tracing::{debug, error, warn};

/// Outcome of a single attempt within a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt succeeded.
    Succeeded,
    /// The attempt failed with a transient error; a retry is scheduled.
    RetryScheduled,
    /// The attempt failed with a non-retryable error.
    Fatal,
    /// The attempt failed and the retry budget is exhausted.
    Exhausted,
}

/// A structured record of one attempt of a retried operation.
#[derive(Debug, Clone)]
pub struct AttemptEvent {
    /// Caller-supplied name of the logical operation.
    pub operation: String,
    /// 1-based attempt number (1 is the initial try).
    pub attempt: u32,
    /// What happened on this attempt.
    pub outcome: AttemptOutcome,
    /// Backoff delay scheduled before the next attempt, if any.
    pub delay: Option<Duration>,
    /// Rendered error for failed attempts.
    pub error: Option<String>,
}

/// Sink for attempt events.
pub trait AttemptObserver: Send + Sync {
    /// Record one attempt. Must not block.
    fn record(&self, event: &AttemptEvent);
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AttemptObserver for NoopObserver {
    fn record(&self, _event: &AttemptEvent) {}
}

/// Observer that bridges attempt events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn record(&self, event: &AttemptEvent) {
        match event.outcome {
            AttemptOutcome::Succeeded => {
                if event.attempt > 1 {
                    debug!(
                        operation = %event.operation,
                        attempt = event.attempt,
                        "Operation succeeded after retries"
                    );
                }
            }
            AttemptOutcome::RetryScheduled => {
                warn!(
                    operation = %event.operation,
                    attempt = event.attempt,
                    delay = ?event.delay,
                    error = event.error.as_deref().unwrap_or(""),
                    "Attempt failed, backing off"
                );
            }
            AttemptOutcome::Fatal => {
                debug!(
                    operation = %event.operation,
                    attempt = event.attempt,
                    error = event.error.as_deref().unwrap_or(""),
                    "Error is not retryable"
                );
            }
            AttemptOutcome::Exhausted => {
                error!(
                    operation = %event.operation,
                    attempt = event.attempt,
                    error = event.error.as_deref().unwrap_or(""),
                    "All retry attempts failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Observer that collects events for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<AttemptEvent>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<AttemptEvent> {
            self.events.lock().map(|g| g.clone()).unwrap_or_default()
        }
    }

    impl AttemptObserver for RecordingObserver {
        fn record(&self, event: &AttemptEvent) {
            if let Ok(mut guard) = self.events.lock() {
                guard.push(event.clone());
            }
        }
    }

    #[test]
    fn recording_observer_captures_events_in_order() {
        let observer = RecordingObserver::default();

        observer.record(&AttemptEvent {
            operation: "op".to_string(),
            attempt: 1,
            outcome: AttemptOutcome::RetryScheduled,
            delay: Some(Duration::from_millis(100)),
            error: Some("503".to_string()),
        });
        observer.record(&AttemptEvent {
            operation: "op".to_string(),
            attempt: 2,
            outcome: AttemptOutcome::Succeeded,
            delay: None,
            error: None,
        });

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, AttemptOutcome::RetryScheduled);
        assert_eq!(events[1].attempt, 2);
    }

    #[test]
    fn tracing_observer_does_not_panic_on_any_outcome() {
        let observer = TracingObserver;
        for outcome in [
            AttemptOutcome::Succeeded,
            AttemptOutcome::RetryScheduled,
            AttemptOutcome::Fatal,
            AttemptOutcome::Exhausted,
        ] {
            observer.record(&AttemptEvent {
                operation: "op".to_string(),
                attempt: 1,
                outcome,
                delay: None,
                error: None,
            });
        }
    }
}
