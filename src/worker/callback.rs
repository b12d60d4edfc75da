//! Callback Protocol: delivers a finished task's result to the backend,
//! falling back to an out-of-band upload-then-notify path for oversized
//! payloads, and to a summary-only callback if even that fails — the
//! backend always hears back.

use std::collections::HashMap;

use reqwest::RequestBuilder;
use serde::Serialize;

use crate::config::CallbackConfig;
use crate::error::WorkerError;
use crate::model::{Task, TaskStatus};

/// The exact fields serialized to the backend: `{id, exception, output,
/// status}`, `status` computed at serialization time rather than stored on
/// `Task` itself.
#[derive(Debug, Serialize)]
struct CallbackPayload<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a crate::model::TaskException>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a serde_json::Value>,
    status: TaskStatus,
}

pub struct CallbackClient {
    client: reqwest::Client,
    base_url: String,
    config: CallbackConfig,
}

impl CallbackClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, config: CallbackConfig) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            config,
        }
    }

    /// Sends the task's result. Always attempts to notify the backend, even
    /// when every delivery path fails — the outermost fallback sends a
    /// summary-only callback rather than propagating the error silently.
    /// `trace_headers` (from `task.payload.trace_headers`) is forwarded on
    /// every outbound request this call makes, so the backend's tracing can
    /// parent the callback under the task producer's span.
    pub async fn send_callback(&self, task: &Task, trace_headers: &HashMap<String, String>) {
        let payload = CallbackPayload {
            id: &task.id,
            exception: task.exception.as_ref(),
            output: task.output.as_ref(),
            status: task.status(),
        };

        let bytes = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                self.send_summary_fallback(&task.id, &e.to_string(), &payload, trace_headers).await;
                return;
            }
        };

        let result = if bytes.len() as u64 > self.config.payload_size_threshold_bytes {
            self.send_via_s3(&task.id, &bytes, trace_headers).await
        } else {
            self.send_inline(&bytes, trace_headers).await
        };

        if let Err(err) = result {
            self.send_summary_fallback(&task.id, &err.to_string(), &payload, trace_headers).await;
        }
    }

    async fn send_inline(&self, bytes: &[u8], trace_headers: &HashMap<String, String>) -> Result<(), WorkerError> {
        let req = self
            .client
            .post(format!("{}/internal/api/v1/wizard/callback", self.base_url))
            .header("Content-Type", "application/json")
            .body(bytes.to_vec());
        let resp = with_trace_headers(req, trace_headers)
            .send()
            .await
            .map_err(|e| WorkerError::External(e.to_string()))?;

        if resp.status().as_u16() == 413 {
            return Err(WorkerError::PayloadTooLarge);
        }
        if !resp.status().is_success() {
            return Err(WorkerError::External(format!("callback rejected: {}", resp.status())));
        }
        Ok(())
    }

    async fn send_via_s3(&self, task_id: &str, bytes: &[u8], trace_headers: &HashMap<String, String>) -> Result<(), WorkerError> {
        let upload_url = self.request_presigned_url(task_id, trace_headers).await?;
        self.upload_to_s3(&upload_url, bytes, trace_headers).await?;
        self.notify_s3_callback(task_id, trace_headers).await
    }

    async fn request_presigned_url(&self, task_id: &str, trace_headers: &HashMap<String, String>) -> Result<String, WorkerError> {
        let req = self
            .client
            .post(format!("{}/internal/api/v1/wizard/tasks/{task_id}/upload", self.base_url));
        let resp = with_trace_headers(req, trace_headers)
            .send()
            .await
            .map_err(|e| WorkerError::External(e.to_string()))?;
        let body: serde_json::Value = resp.json().await.map_err(|e| WorkerError::External(e.to_string()))?;
        body.get("url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| WorkerError::External("presigned url response missing `url`".into()))
    }

    async fn upload_to_s3(&self, upload_url: &str, bytes: &[u8], trace_headers: &HashMap<String, String>) -> Result<(), WorkerError> {
        // A bare client, not the backend-configured one: this goes straight
        // to the object store, not through the backend.
        let req = reqwest::Client::new()
            .put(upload_url)
            .header("Content-Type", "application/json")
            .body(bytes.to_vec());
        let resp = with_trace_headers(req, trace_headers)
            .send()
            .await
            .map_err(|e| WorkerError::External(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(WorkerError::External(format!("s3 upload failed: {}", resp.status())));
        }
        Ok(())
    }

    async fn notify_s3_callback(&self, task_id: &str, trace_headers: &HashMap<String, String>) -> Result<(), WorkerError> {
        let req = self
            .client
            .post(format!("{}/internal/api/v1/wizard/tasks/{task_id}/callback", self.base_url));
        let resp = with_trace_headers(req, trace_headers)
            .send()
            .await
            .map_err(|e| WorkerError::External(e.to_string()))?;
        if resp.status().as_u16() == 413 {
            return Err(WorkerError::PayloadTooLarge);
        }
        if !resp.status().is_success() {
            return Err(WorkerError::External(format!("s3 callback rejected: {}", resp.status())));
        }
        Ok(())
    }

    async fn send_summary_fallback(&self, task_id: &str, message: &str, payload: &CallbackPayload<'_>, trace_headers: &HashMap<String, String>) {
        let summary = serde_json::json!({
            "id": task_id,
            "exception": {
                "message": message,
                "task": {
                    "has_exception": payload.exception.is_some(),
                    "has_output": payload.output.is_some(),
                },
            },
        });
        let req = self
            .client
            .post(format!("{}/internal/api/v1/wizard/callback", self.base_url))
            .json(&summary);
        let _ = with_trace_headers(req, trace_headers).send().await;
    }
}

/// Attaches `task.payload.trace_headers` verbatim to an outbound request
/// builder so the receiving end's tracing can parent it under the task
/// producer's span (spec.md §4.7).
fn with_trace_headers(mut req: RequestBuilder, trace_headers: &HashMap<String, String>) -> RequestBuilder {
    for (name, value) in trace_headers {
        req = req.header(name, value);
    }
    req
}
