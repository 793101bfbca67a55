//! Batch submission: building, wire encoding, and resilient execution.

pub mod builder;
pub mod executor;
pub mod wire;

pub use builder::{BatchRequest, BatchRequestBuilder, Operation, DEFAULT_MAX_BATCH_SIZE};
pub use executor::{BatchItemResult, BatchOptions, BatchOutcome, BatchResult};
pub use wire::{BatchEnvelope, BatchResponseBody, WireRequest, WireResponse};
