//! [`Task`]: the unit of work dispatched to a worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TimeoutSource;

/// The shape a worker writes into `task.exception` on failure. Field
/// presence mirrors the literal dicts built by each failure path (timeout,
/// cancellation, generic exception), not a single fixed schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskException {
    pub error: String,
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_source: Option<TimeoutSource>,
}

impl TaskException {
    pub fn timeout(timeout_secs: u64, source: TimeoutSource) -> Self {
        Self {
            error: format!("Task timed out after {timeout_secs}s"),
            r#type: "TimeoutError".to_string(),
            traceback: None,
            timeout: Some(timeout_secs),
            timeout_source: Some(source),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            error: "Task cancelled by user".to_string(),
            r#type: "CancelledError".to_string(),
            traceback: None,
            timeout: None,
            timeout_source: None,
        }
    }

    pub fn generic(error: impl Into<String>, traceback: Option<String>) -> Self {
        Self {
            error: error.into(),
            r#type: "Exception".to_string(),
            traceback,
            timeout: None,
            timeout_source: None,
        }
    }
}

/// Derived, not stored: a task's outcome as seen by the callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
}

/// A unit of work dispatched to a worker: `id` and `function` select the
/// handler, `input` is opaque per-function payload, `payload` carries
/// pass-through metadata such as `trace_headers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub priority: i32,
    pub namespace_id: String,
    pub user_id: String,
    pub function: String,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<TaskException>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task is terminal once `ended_at` is set, regardless of whether it
    /// also carries `canceled_at` (a canceled task still records an end
    /// time for audit).
    pub fn is_terminal(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn status(&self) -> TaskStatus {
        if self.exception.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Success
        }
    }

    /// Opaque pass-through trace headers found under `payload.trace_headers`,
    /// if present. The worker forwards these verbatim on its own outbound
    /// HTTP calls so a tracing backend can parent the child spans; this
    /// crate does not parse or validate the header names.
    pub fn trace_headers(&self) -> std::collections::HashMap<String, String> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("trace_headers"))
            .and_then(|h| h.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}
