//! Shared resilience primitives for Tracklink crates.
//!
//! This crate holds the generic building blocks the client layer composes:
//! a keyed token-bucket rate limiter, a retry executor with
//! classification-driven exponential backoff, an attempt-event observer
//! seam, and a clock abstraction for deterministic tests.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod resilience;

pub use error::{CommonError, CommonResult};
