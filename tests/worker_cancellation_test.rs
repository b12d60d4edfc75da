//! End-to-end scenario 4 (spec.md §8): the cancellation monitor, polling the
//! backend, observes `canceled_at` and cancels an in-flight execution before
//! it would otherwise complete.

use std::time::Duration;

use grimoire_core::config::TaskConfig;
use grimoire_core::error::WorkerError;
use grimoire_core::model::Task;
use grimoire_core::worker::{TaskBackendClient, TaskManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_task() -> Task {
    Task {
        id: "t1".into(),
        priority: 0,
        namespace_id: "ns".into(),
        user_id: "u".into(),
        function: "file_reader".into(),
        input: serde_json::json!({}),
        payload: None,
        output: None,
        exception: None,
        created_at: chrono::Utc::now(),
        started_at: None,
        ended_at: None,
        canceled_at: None,
    }
}

#[tokio::test]
async fn cancellation_monitor_aborts_a_long_running_handler() {
    let server = MockServer::start().await;

    let mut canceled = sample_task();
    canceled.canceled_at = Some(chrono::Utc::now());

    Mock::given(method("GET"))
        .and(path("/internal/api/v1/wizard/tasks/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&canceled))
        .mount(&server)
        .await;

    let backend = std::sync::Arc::new(TaskBackendClient::new(reqwest::Client::new(), server.uri()));
    let mut config = TaskConfig::default();
    config.timeout = Duration::from_secs(30);
    config.cancellation_check_interval = Duration::from_millis(20);
    let manager = TaskManager::new(config, backend);

    let result = manager
        .run_with_timeout_and_cancellation(&sample_task(), |_cancel_token| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, WorkerError>(serde_json::json!({"should": "not reach here"}))
        })
        .await;

    assert!(matches!(result, Err(WorkerError::Cancelled)));
}

#[tokio::test]
async fn transient_backend_errors_never_cancel_a_healthy_task() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/internal/api/v1/wizard/tasks/t1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let backend = std::sync::Arc::new(TaskBackendClient::new(reqwest::Client::new(), server.uri()));
    let mut config = TaskConfig::default();
    config.timeout = Duration::from_secs(30);
    config.cancellation_check_interval = Duration::from_millis(10);
    let manager = TaskManager::new(config, backend);

    let result = manager
        .run_with_timeout_and_cancellation(&sample_task(), |_cancel_token| async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok::<_, WorkerError>(serde_json::json!({"ok": true}))
        })
        .await;

    assert!(matches!(result, Ok(_)));
}
