//! Wire format of the batch endpoint.
//!
//! A submission serializes to `{"requests": [{method, uri, headers, body}]}`
//! with order significant; the server answers
//! `{"count": n, "value": [{code, headers, body}]}` where `value[i]`
//! corresponds to `requests[i]`. Any disagreement between the submitted
//! count, the reported `count`, and `value.len()` means the response cannot
//! be trusted and is a [`ApiError::ProtocolViolation`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::builder::Operation;
use crate::errors::{ApiError, ApiResult};

/// Request body for one batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEnvelope {
    pub requests: Vec<WireRequest>,
}

/// One entry of a batch submission.
#[derive(Debug, Clone, Serialize)]
pub struct WireRequest {
    pub method: String,
    pub uri: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Response body of one batch submission.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponseBody {
    pub count: usize,
    pub value: Vec<WireResponse>,
}

/// One entry of a batch response, positionally aligned to its request.
#[derive(Debug, Clone, Deserialize)]
pub struct WireResponse {
    pub code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl BatchEnvelope {
    /// Serialize operations into submission order.
    pub fn from_operations(operations: &[Operation]) -> Self {
        let requests = operations
            .iter()
            .map(|op| {
                let mut headers = HashMap::new();
                if op.payload.is_some() {
                    headers.insert("Content-Type".to_string(), "application/json".to_string());
                }
                WireRequest {
                    method: op.method.as_str().to_string(),
                    uri: op.target.clone(),
                    headers,
                    body: op.payload.clone(),
                }
            })
            .collect();
        Self { requests }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Decode and validate a batch response body against the submitted size.
pub fn decode_batch_response(expected: usize, body: &Value) -> ApiResult<Vec<WireResponse>> {
    let parsed: BatchResponseBody = serde_json::from_value(body.clone())
        .map_err(|e| ApiError::ProtocolViolation(format!("malformed batch response: {e}")))?;

    if parsed.count != expected || parsed.value.len() != expected {
        return Err(ApiError::ProtocolViolation(format!(
            "submitted {} requests but response reports count={} with {} entries",
            expected,
            parsed.count,
            parsed.value.len()
        )));
    }
    Ok(parsed.value)
}
