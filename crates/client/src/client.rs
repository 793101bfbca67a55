//! Client façade composing admission control, retry, and batching.
//!
//! [`TracklinkClient`] is the single entry point. It is built once at
//! process start from an explicit [`ClientConfig`] and shared by reference;
//! there is no hidden global state. All requests against the configured
//! base URL draw from one admission budget.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};
use tracklink_common::resilience::{
    AttemptObserver, RateLimiter, RetryExecutor, RetryPolicy, TracingObserver,
};

use crate::batch::builder::{BatchRequest, BatchRequestBuilder, Operation};
use crate::batch::executor::{BatchExecutor, BatchOptions, BatchResult};
use crate::batch::wire::BatchEnvelope;
use crate::config::ClientConfig;
use crate::errors::{ApiError, ApiResult};
use crate::transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};

/// Extract a human-readable message from an error response body.
fn error_message(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Shared single-request path: acquire a token, then run the transport
/// call under the retry executor.
pub(crate) struct RequestPipeline {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    observer: Arc<dyn AttemptObserver>,
    retry: RetryExecutor,
}

impl RequestPipeline {
    pub(crate) fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn AttemptObserver>,
    ) -> ApiResult<Self> {
        config.validate()?;
        let limiter = RateLimiter::new(config.rate_limit.clone())?;
        let retry = RetryExecutor::new(config.retry.clone(), Arc::clone(&observer));
        Ok(Self { config, transport, limiter, observer, retry })
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// All requests against one base URL share one bucket.
    fn rate_key(&self) -> &str {
        &self.config.base_url
    }

    fn executor_for(&self, policy: Option<&RetryPolicy>) -> RetryExecutor {
        match policy {
            Some(policy) => RetryExecutor::new(policy.clone(), Arc::clone(&self.observer)),
            None => self.retry.clone(),
        }
    }

    /// Run one wire call under admission control and retry. The token is
    /// acquired once per logical call, not per attempt.
    async fn run(
        &self,
        operation_name: &str,
        request: TransportRequest,
        policy: Option<&RetryPolicy>,
    ) -> ApiResult<TransportResponse> {
        self.limiter.acquire(self.rate_key()).await;

        let transport = Arc::clone(&self.transport);
        let result = self
            .executor_for(policy)
            .execute(operation_name, move || {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move {
                    let response = transport.send(request).await?;
                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(ApiError::from_status(
                            response.status,
                            error_message(&response.body),
                        ))
                    }
                }
            })
            .await;
        result.map_err(ApiError::from)
    }

    /// Execute one logical operation end to end.
    pub(crate) async fn execute(
        &self,
        operation: &Operation,
        policy: Option<&RetryPolicy>,
    ) -> ApiResult<TransportResponse> {
        let name = format!("{} {}", operation.method, operation.target);
        debug!(operation = %name, "dispatching request");

        let mut request =
            TransportRequest::new(operation.method, self.config.url_for(&operation.target));
        if let Some(payload) = &operation.payload {
            request = request.with_body(payload.clone());
        }
        self.run(&name, request, policy).await
    }

    /// Submit one batch envelope. The returned response is the raw 2xx
    /// aggregate; decoding (and protocol validation) happens in the batch
    /// executor, outside the retry loop, so an untrustworthy response is
    /// never blindly retried.
    pub(crate) async fn execute_batch_call(
        &self,
        envelope: &BatchEnvelope,
    ) -> ApiResult<TransportResponse> {
        let body = serde_json::to_value(envelope)
            .map_err(|e| ApiError::Config(format!("failed to serialize batch: {e}")))?;
        let name = format!("POST {}", self.config.batch_path);
        debug!(operation = %name, size = envelope.len(), "dispatching batch");

        let request = TransportRequest::new(Method::Post, self.config.url_for(&self.config.batch_path))
            .with_body(body);
        self.run(&name, request, None).await
    }
}

/// Entry point for callers: single operations and batch submissions with
/// uniform rate limiting and retry behavior.
pub struct TracklinkClient {
    pipeline: Arc<RequestPipeline>,
    executor: BatchExecutor,
}

impl TracklinkClient {
    /// Build a client over a real HTTP transport.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let transport = Arc::new(HttpTransport::new(config.timeout, &config.user_agent)?);
        Self::with_transport(config, transport)
    }

    /// Build a client over a custom transport. Attempt events go to the
    /// default tracing observer.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> ApiResult<Self> {
        Self::with_observer(config, transport, Arc::new(TracingObserver))
    }

    /// Build a client with an explicit attempt-event observer.
    pub fn with_observer(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn AttemptObserver>,
    ) -> ApiResult<Self> {
        let pipeline = Arc::new(RequestPipeline::new(config, transport, observer)?);
        let executor = BatchExecutor::new(Arc::clone(&pipeline));
        Ok(Self { pipeline, executor })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        self.pipeline.config()
    }

    /// Execute a single operation with rate limiting and the default
    /// retry policy.
    #[instrument(level = "debug", skip(self, payload))]
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        payload: Option<Value>,
    ) -> ApiResult<TransportResponse> {
        let operation = Operation::new(method, target, payload);
        self.pipeline.execute(&operation, None).await
    }

    /// Execute a single operation under a caller-supplied retry policy.
    #[instrument(level = "debug", skip(self, payload, policy))]
    pub async fn request_with_policy(
        &self,
        method: Method,
        target: &str,
        payload: Option<Value>,
        policy: &RetryPolicy,
    ) -> ApiResult<TransportResponse> {
        let operation = Operation::new(method, target, payload);
        self.pipeline.execute(&operation, Some(policy)).await
    }

    /// Start an empty batch at the wire size limit.
    pub fn batch_builder(&self) -> BatchRequestBuilder {
        BatchRequestBuilder::new()
    }

    /// Submit an arbitrary set of operations. Sets larger than the batch
    /// size limit are chunked; the result always holds exactly one entry
    /// per submitted operation, in submission order.
    #[instrument(level = "debug", skip_all, fields(total = operations.len()))]
    pub async fn submit_batch(
        &self,
        operations: Vec<Operation>,
        options: BatchOptions,
    ) -> ApiResult<BatchResult> {
        self.executor.submit(operations, options).await
    }

    /// Submit a built batch snapshot.
    #[instrument(level = "debug", skip_all, fields(total = batch.len()))]
    pub async fn submit(
        &self,
        batch: BatchRequest,
        options: BatchOptions,
    ) -> ApiResult<BatchResult> {
        self.executor.submit(batch.into_operations(), options).await
    }
}
