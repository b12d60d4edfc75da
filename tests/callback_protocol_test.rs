//! End-to-end exercise of the callback protocol (spec.md §4.9, §8 "task
//! callback" round-trip property, end-to-end scenario 5) against a real
//! HTTP server rather than mocked trait objects, since [`CallbackClient`]
//! talks `reqwest` directly.

use std::collections::HashMap;

use grimoire_core::config::CallbackConfig;
use grimoire_core::model::{Task, TaskException};
use grimoire_core::worker::CallbackClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_task(output: serde_json::Value) -> Task {
    Task {
        id: "t1".into(),
        priority: 0,
        namespace_id: "ns".into(),
        user_id: "u".into(),
        function: "file_reader".into(),
        input: serde_json::json!({}),
        payload: None,
        output: Some(output),
        exception: None,
        created_at: chrono::Utc::now(),
        started_at: None,
        ended_at: Some(chrono::Utc::now()),
        canceled_at: None,
    }
}

#[tokio::test]
async fn small_payload_goes_inline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/callback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = CallbackClient::new(
        reqwest::Client::new(),
        server.uri(),
        CallbackConfig {
            payload_size_threshold_bytes: 5 * 1024 * 1024,
        },
    );

    client
        .send_callback(&sample_task(serde_json::json!({"answer": "hi"})), &HashMap::new())
        .await;
}

#[tokio::test]
async fn trace_headers_are_forwarded_on_the_inline_callback_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/callback"))
        .and(wiremock::matchers::header("traceparent", "00-abc-def-01"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = CallbackClient::new(
        reqwest::Client::new(),
        server.uri(),
        CallbackConfig {
            payload_size_threshold_bytes: 5 * 1024 * 1024,
        },
    );

    let mut trace_headers = HashMap::new();
    trace_headers.insert("traceparent".to_string(), "00-abc-def-01".to_string());

    client
        .send_callback(&sample_task(serde_json::json!({"answer": "hi"})), &trace_headers)
        .await;
}

#[tokio::test]
async fn oversized_payload_uses_presigned_upload_then_s3_callback_without_inline_post() {
    let server = MockServer::start().await;

    // Inline endpoint must never receive the full payload when oversized.
    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/callback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/tasks/t1/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"url": format!("{}/presigned-put", server.uri())})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/presigned-put"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/tasks/t1/callback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = CallbackClient::new(
        reqwest::Client::new(),
        server.uri(),
        CallbackConfig {
            payload_size_threshold_bytes: 16,
        },
    );

    let mut task = sample_task(serde_json::json!({"answer": "a".repeat(64)}));
    task.exception = None;
    client.send_callback(&task, &HashMap::new()).await;
}

#[tokio::test]
async fn s3_failure_falls_back_to_summary_only_inline_callback() {
    let server = MockServer::start().await;

    // Every call to the inline endpoint is the summary fallback, since the
    // payload here exceeds the threshold and the upload endpoint itself
    // fails outright.
    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/callback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/internal/api/v1/wizard/tasks/t1/upload"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = CallbackClient::new(
        reqwest::Client::new(),
        server.uri(),
        CallbackConfig {
            payload_size_threshold_bytes: 16,
        },
    );

    let mut task = sample_task(serde_json::json!({"answer": "a".repeat(64)}));
    task.exception = Some(TaskException::generic("boom", None));
    client.send_callback(&task, &HashMap::new()).await;
}
