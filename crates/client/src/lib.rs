//! Resilient client for a rate-limited, HTTP-based work-tracking service.
//!
//! The crate keeps outbound volume within a server-enforced rate budget,
//! recovers transparently from transient failures, and collapses many
//! logical operations into few wire calls while guaranteeing exact
//! positional correlation of per-operation outcomes, even under partial
//! failure.
//!
//! Entry point: [`TracklinkClient`], built from a [`ClientConfig`].
//!
//! ```no_run
//! use tracklink_client::{ClientConfig, Method, TracklinkClient};
//!
//! # async fn run() -> Result<(), tracklink_client::ApiError> {
//! let client = TracklinkClient::new(ClientConfig::new("https://tracker.example.com"))?;
//! let response = client.request(Method::Get, "items/42", None).await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod batch;
pub mod client;
pub mod config;
pub mod errors;
pub mod transport;

pub use batch::{
    BatchItemResult, BatchOptions, BatchOutcome, BatchRequest, BatchRequestBuilder, BatchResult,
    Operation, DEFAULT_MAX_BATCH_SIZE,
};
pub use client::TracklinkClient;
pub use config::ClientConfig;
pub use errors::{ApiError, ApiResult};
pub use transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};

// Callers tune these without depending on the common crate directly.
pub use tracklink_common::resilience::{RateLimitConfig, RetryPolicy};
