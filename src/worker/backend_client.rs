//! HTTP client for the task-queue side of the backend: `GET /task`,
//! `GET /tasks/{id}`. The object-store and callback endpoints live in
//! [`crate::worker::callback`]; this client is only what the poll loop and
//! cancellation monitor need.

use crate::error::WorkerError;
use crate::model::Task;

pub struct TaskBackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl TaskBackendClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `GET /task`: `Ok(Some(task))` on 200, `Ok(None)` on 204 (idle queue).
    /// A connection failure is a transient error the caller should log and
    /// retry, not exit on.
    pub async fn fetch_task(&self) -> Result<Option<Task>, WorkerError> {
        let resp = self
            .client
            .get(format!("{}/internal/api/v1/wizard/task", self.base_url))
            .send()
            .await
            .map_err(|e| WorkerError::Transient(e.to_string()))?;

        if resp.status().as_u16() == 204 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(WorkerError::Transient(format!("unexpected status {}", resp.status())));
        }
        resp.json()
            .await
            .map(Some)
            .map_err(|e| WorkerError::External(e.to_string()))
    }

    /// `GET /tasks/{id}`: current task state, used by the cancellation
    /// monitor. Returns `None` on any failure (transient fetch errors are
    /// swallowed and logged by the caller, matching the source's
    /// polling-loop-keeps-going discipline).
    pub async fn check_task_status(&self, task_id: &str) -> Option<Task> {
        let resp = self
            .client
            .get(format!("{}/internal/api/v1/wizard/tasks/{task_id}", self.base_url))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json().await.ok()
    }
}
