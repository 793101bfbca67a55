//! Resilient batch submission with chunking, reconciliation, and fallback.
//!
//! Operation sets larger than the wire limit are split into chunks and
//! dispatched under a bounded concurrency gate; all chunks share the
//! client's single admission budget. A failure in one chunk never aborts
//! its siblings. Results are reassembled in submission order, and for N
//! submitted operations the returned [`BatchResult`] always holds exactly
//! N entries, whichever path produced them.
//!
//! When an aggregate call fails past its retry budget (or its response is
//! untrustworthy), the affected operations are re-executed one by one
//! through the single-operation path, each with full rate limiting and
//! retry, so callers observe a uniform result shape regardless of path.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracklink_common::resilience::{RetryClass, Retryable};

use crate::batch::builder::{Operation, DEFAULT_MAX_BATCH_SIZE};
use crate::batch::wire::{decode_batch_response, BatchEnvelope};
use crate::client::RequestPipeline;
use crate::errors::{ApiError, ApiResult};

/// Tuning knobs for one batch submission.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Operations per wire-level call; sets above this are chunked.
    pub max_batch_size: usize,
    /// Re-execute operations individually when an aggregate call fails.
    pub fallback_on_error: bool,
    /// Maximum chunks in flight at once.
    pub concurrency: usize,
    /// Retry individually failed items through the single-operation path
    /// before reporting them as final failures.
    pub retry_failed_items: bool,
    /// Stops issuing new chunks when triggered; chunks already dispatched
    /// run to completion and report normally.
    pub cancellation: Option<CancellationToken>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            fallback_on_error: true,
            concurrency: 4,
            retry_failed_items: false,
            cancellation: None,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> ApiResult<()> {
        if self.max_batch_size == 0 || self.max_batch_size > DEFAULT_MAX_BATCH_SIZE {
            return Err(ApiError::Config(format!(
                "max_batch_size must be between 1 and {}, got {}",
                DEFAULT_MAX_BATCH_SIZE, self.max_batch_size
            )));
        }
        if self.concurrency == 0 {
            return Err(ApiError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Which path a completed submission took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every item succeeded via the batch path.
    FullSuccess,
    /// The submission completed but some items failed.
    PartialSuccess,
    /// At least one chunk was re-executed through the sequential path.
    FallenBack,
}

/// Outcome of one operation within a submission.
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    /// Position of the originating operation in the submitted set.
    pub correlation_index: usize,
    /// HTTP status of the item, when one was received.
    pub status_code: Option<u16>,
    /// Response body on success, the typed failure otherwise.
    pub outcome: Result<Value, ApiError>,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.outcome.as_ref().err()
    }
}

/// Per-item outcomes of a submission, in submission order.
#[derive(Debug)]
pub struct BatchResult {
    results: Vec<BatchItemResult>,
    fell_back: bool,
}

impl BatchResult {
    pub fn results(&self) -> &[BatchItemResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<BatchItemResult> {
        self.results
    }

    pub fn total_requests(&self) -> usize {
        self.results.len()
    }

    pub fn successful_requests(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_requests(&self) -> usize {
        self.results.len() - self.successful_requests()
    }

    pub fn is_full_success(&self) -> bool {
        self.failed_requests() == 0
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.fell_back {
            BatchOutcome::FallenBack
        } else if self.is_full_success() {
            BatchOutcome::FullSuccess
        } else {
            BatchOutcome::PartialSuccess
        }
    }
}

/// What one chunk task produced.
enum ChunkOutcome {
    /// The aggregate call succeeded and decoded; per-item results inside.
    Delivered(Vec<BatchItemResult>),
    /// The aggregate call itself failed past its retry budget.
    Aggregate(ApiError),
    /// Cancellation fired before this chunk was dispatched.
    Cancelled,
}

/// Drives batch submissions through the shared request pipeline.
pub(crate) struct BatchExecutor {
    pipeline: Arc<RequestPipeline>,
}

impl BatchExecutor {
    pub(crate) fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Submit `operations`, honoring `options`. Returns one entry per
    /// operation, in submission order; errors at the top level only when
    /// no per-item results could be produced at all.
    pub(crate) async fn submit(
        &self,
        mut operations: Vec<Operation>,
        options: BatchOptions,
    ) -> ApiResult<BatchResult> {
        options.validate()?;

        // Correlation is positional across the whole submission.
        for (index, operation) in operations.iter_mut().enumerate() {
            operation.correlation_index = index;
        }

        if operations.is_empty() {
            return Ok(BatchResult { results: Vec::new(), fell_back: false });
        }

        let chunks: Vec<Vec<Operation>> =
            operations.chunks(options.max_batch_size).map(<[Operation]>::to_vec).collect();
        debug!(
            total = operations.len(),
            chunks = chunks.len(),
            concurrency = options.concurrency,
            "submitting batch"
        );

        let outcomes = self.dispatch_chunks(&chunks, &options).await;

        // With fallback disabled and every chunk dead, there is nothing
        // meaningful to report per item.
        if !options.fallback_on_error {
            let failed_chunks = outcomes
                .iter()
                .filter(|o| matches!(o, ChunkOutcome::Aggregate(_)))
                .count();
            if failed_chunks == outcomes.len() {
                if let Some(ChunkOutcome::Aggregate(error)) = outcomes.first() {
                    return Err(error.clone());
                }
            }
        }

        let mut results: Vec<BatchItemResult> = Vec::with_capacity(operations.len());
        let mut fell_back = false;

        for (chunk, outcome) in chunks.iter().zip(outcomes) {
            match outcome {
                ChunkOutcome::Delivered(items) => results.extend(items),
                ChunkOutcome::Cancelled => {
                    results.extend(chunk.iter().map(|op| BatchItemResult {
                        correlation_index: op.correlation_index,
                        status_code: None,
                        outcome: Err(ApiError::Cancelled),
                    }));
                }
                ChunkOutcome::Aggregate(error) => {
                    if options.fallback_on_error {
                        warn!(
                            size = chunk.len(),
                            %error,
                            "batch call failed, re-executing operations sequentially"
                        );
                        fell_back = true;
                        for operation in chunk {
                            results.push(self.single_item(operation).await);
                        }
                    } else {
                        // The chunk died but siblings delivered; replicate
                        // the aggregate cause across its items.
                        results.extend(chunk.iter().map(|op| BatchItemResult {
                            correlation_index: op.correlation_index,
                            status_code: error.status_code(),
                            outcome: Err(error.clone()),
                        }));
                    }
                }
            }
        }

        if options.retry_failed_items {
            self.retry_failed(&operations, &mut results).await;
        }

        debug_assert_eq!(results.len(), operations.len());
        Ok(BatchResult { results, fell_back })
    }

    /// Spawn one task per chunk, gated by a concurrency semaphore, and
    /// join them in submission order.
    async fn dispatch_chunks(
        &self,
        chunks: &[Vec<Operation>],
        options: &BatchOptions,
    ) -> Vec<ChunkOutcome> {
        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        let cancellation = options.cancellation.clone().unwrap_or_default();

        let handles: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let pipeline = Arc::clone(&self.pipeline);
                let semaphore = Arc::clone(&semaphore);
                let token = cancellation.clone();
                let chunk = chunk.clone();
                tokio::spawn(async move {
                    let _permit = tokio::select! {
                        _ = token.cancelled() => return ChunkOutcome::Cancelled,
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return ChunkOutcome::Cancelled,
                        },
                    };
                    if token.is_cancelled() {
                        return ChunkOutcome::Cancelled;
                    }
                    match run_chunk(&pipeline, &chunk).await {
                        Ok(items) => ChunkOutcome::Delivered(items),
                        Err(error) => ChunkOutcome::Aggregate(error),
                    }
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            outcomes.push(match joined {
                Ok(outcome) => outcome,
                Err(error) => {
                    ChunkOutcome::Aggregate(ApiError::Network(format!("chunk task failed: {error}")))
                }
            });
        }
        outcomes
    }

    /// Execute one operation through the full single-request path.
    async fn single_item(&self, operation: &Operation) -> BatchItemResult {
        match self.pipeline.execute(operation, None).await {
            Ok(response) => BatchItemResult {
                correlation_index: operation.correlation_index,
                status_code: Some(response.status),
                outcome: Ok(response.body),
            },
            Err(error) => BatchItemResult {
                correlation_index: operation.correlation_index,
                status_code: error.status_code(),
                outcome: Err(error),
            },
        }
    }

    /// Give transiently failed items one more pass through the
    /// single-operation path. Items that already went through that path
    /// (fallback, or aggregate exhaustion replicated per item) carry
    /// fatal-classified errors and are left alone.
    async fn retry_failed(
        &self,
        operations: &[Operation],
        results: &mut [BatchItemResult],
    ) {
        for item in results.iter_mut() {
            let transient = matches!(
                &item.outcome,
                Err(error) if error.retry_class() == RetryClass::Transient
            );
            if transient {
                if let Some(operation) = operations.get(item.correlation_index) {
                    *item = self.single_item(operation).await;
                }
            }
        }
    }
}

/// Run one chunk: serialize, submit with retry, decode, reconcile.
async fn run_chunk(
    pipeline: &RequestPipeline,
    chunk: &[Operation],
) -> ApiResult<Vec<BatchItemResult>> {
    let envelope = BatchEnvelope::from_operations(chunk);
    let response = pipeline.execute_batch_call(&envelope).await?;

    // Decoding sits outside the retry loop: a count mismatch means the
    // response cannot be trusted and must not be blindly re-submitted.
    let wire_items = decode_batch_response(chunk.len(), &response.body)?;

    Ok(chunk
        .iter()
        .zip(wire_items)
        .map(|(operation, item)| {
            let outcome = if item.is_success() {
                Ok(item.body.clone())
            } else {
                Err(ApiError::from_status(item.code, item.body.to_string()))
            };
            BatchItemResult {
                correlation_index: operation.correlation_index,
                status_code: Some(item.code),
                outcome,
            }
        })
        .collect())
}
