//! End-to-end behavior of the single-operation path against a mock server.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracklink_client::{
    ApiError, ClientConfig, Method, RateLimitConfig, RetryPolicy, TracklinkClient,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fast backoff and a wide-open admission budget so tests do not sleep.
fn test_client(base_url: &str, max_retries: u32) -> TracklinkClient {
    let config = ClientConfig::new(base_url)
        .with_rate_limit(RateLimitConfig { capacity: 2000, refill_rate: 50.0 })
        .with_retry(
            RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
                .expect("valid test policy"),
        );
    TracklinkClient::new(config).expect("valid test config")
}

#[tokio::test]
async fn recovers_from_repeated_throttling() -> Result<()> {
    let server = MockServer::start().await;

    // Three 429s, then success: with three retries the call must land.
    Mock::given(method("GET"))
        .and(path("/items/7"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "slow down"})))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "title": "x"})))
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 3);
    let response = client.request(Method::Get, "items/7", None).await?;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["id"], json!(7));

    // Exactly four attempts hit the wire.
    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 4);
    Ok(())
}

#[tokio::test]
async fn client_errors_surface_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad field"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 3);
    let result = client
        .request(Method::Post, "items", Some(json!({"title": ""})))
        .await;

    match result {
        Err(ApiError::Client { status: 400, message }) => {
            assert_eq!(message, "bad field");
        }
        other => panic!("expected immediate client error, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_retries_wrap_attempt_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 2);
    let result = client.request(Method::Get, "items/1", None).await;

    match result {
        Err(ApiError::Exhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, ApiError::Server { status: 503, .. }));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_failures_are_retried_as_transient() {
    // Take an address, then shut the server down so connections fail.
    // A non-pooled server is required: pooled `MockServer::start()` servers
    // keep listening after drop, so the address would not actually go dead.
    let server = MockServer::builder().start().await;
    let dead_url = server.uri();
    drop(server);

    let client = test_client(&dead_url, 1);
    let result = client.request(Method::Get, "items/1", None).await;

    match result {
        Err(ApiError::Exhausted { attempts, source }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, ApiError::Network(_)));
        }
        other => panic!("expected exhausted network error, got {other:?}"),
    }
}

#[tokio::test]
async fn payload_and_policy_override_reach_the_wire() -> Result<()> {
    let server = MockServer::start().await;
    let payload = json!({"fields": {"title": "write report", "estimate": 3}});

    Mock::given(method("PATCH"))
        .and(path("/items/12"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/items/12"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updated": true})))
        .mount(&server)
        .await;

    // Default client policy allows no retries; the per-call override does.
    let client = test_client(&server.uri(), 0);
    let override_policy =
        RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5))?;
    let response = client
        .request_with_policy(Method::Patch, "items/12", Some(payload), &override_policy)
        .await?;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["updated"], json!(true));
    Ok(())
}
