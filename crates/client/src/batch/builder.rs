//! Bounded, ordered accumulation of operations into a batch.
//!
//! Correlation is strictly positional: an operation's index at insertion
//! time is the index of its result, end to end. The wire format carries no
//! per-item identifiers, so insertion order must survive building,
//! transport, and response decomposition unchanged.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::{ApiError, ApiResult};
use crate::transport::Method;

/// Hard limit on operations per wire-level batch call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// One logical operation destined for the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: Method,
    /// Path relative to the service base URL.
    pub target: String,
    pub payload: Option<Value>,
    /// Position within the submitted set; assigned at insertion.
    pub correlation_index: usize,
}

impl Operation {
    /// Create an operation; the correlation index is assigned when it
    /// joins a batch.
    pub fn new(method: Method, target: impl Into<String>, payload: Option<Value>) -> Self {
        Self { method, target: target.into(), payload, correlation_index: 0 }
    }
}

/// An immutable, ordered snapshot of operations ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    operations: Arc<[Operation]>,
}

impl BatchRequest {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations.to_vec()
    }
}

/// Accumulates up to `max_batch_size` operations in insertion order.
#[derive(Debug, Clone)]
pub struct BatchRequestBuilder {
    operations: Vec<Operation>,
    max_batch_size: usize,
}

impl Default for BatchRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRequestBuilder {
    /// Create a builder with the default size limit.
    pub fn new() -> Self {
        Self { operations: Vec::new(), max_batch_size: DEFAULT_MAX_BATCH_SIZE }
    }

    /// Create a builder with a custom limit, capped at the wire maximum.
    pub fn with_max_size(max_batch_size: usize) -> ApiResult<Self> {
        if max_batch_size == 0 || max_batch_size > DEFAULT_MAX_BATCH_SIZE {
            return Err(ApiError::Config(format!(
                "max_batch_size must be between 1 and {}, got {}",
                DEFAULT_MAX_BATCH_SIZE, max_batch_size
            )));
        }
        Ok(Self { operations: Vec::new(), max_batch_size })
    }

    /// Append an operation, assigning it the next correlation index.
    pub fn add(&mut self, operation: Operation) -> ApiResult<()> {
        if !self.can_add_more() {
            return Err(ApiError::CapacityExceeded { max: self.max_batch_size });
        }
        let correlation_index = self.operations.len();
        self.operations.push(Operation { correlation_index, ..operation });
        Ok(())
    }

    /// Whether another operation fits.
    pub fn can_add_more(&self) -> bool {
        self.operations.len() < self.max_batch_size
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Snapshot the accumulated operations.
    ///
    /// Idempotent: calling this twice without intervening `add`s yields
    /// equal snapshots, and the builder remains usable.
    pub fn build(&self) -> BatchRequest {
        BatchRequest { operations: self.operations.clone().into() }
    }
}
