//! Worker: polls for one task at a time, dispatches it to a named function
//! handler under the [`TaskManager`]'s supervision, and calls back with the
//! result — idle → running → terminal → idle, looping forever.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, WorkerError};
use crate::model::{Task, TaskException};

use super::backend_client::TaskBackendClient;
use super::callback::CallbackClient;
use super::health::{HealthTracker, WorkerStatus};
use super::rate_limiter::RateLimiter;
use super::task_manager::TaskManager;

/// One named unit of work a worker can dispatch to, e.g. `file_reader`,
/// `upsert_index`, `generate_title`. Handlers receive trace headers
/// extracted from `task.payload.trace_headers` so they can parent their own
/// outbound spans under the task producer's.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn handle(
        &self,
        task: &Task,
        trace_headers: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, BoxError>;
}

pub struct Worker {
    id: u32,
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
    backend: Arc<TaskBackendClient>,
    task_manager: Arc<TaskManager>,
    callback: Arc<CallbackClient>,
    health: Arc<HealthTracker>,
    rate_limiter: Arc<RateLimiter>,
}

impl Worker {
    pub fn new(
        id: u32,
        handlers: HashMap<String, Arc<dyn FunctionHandler>>,
        backend: Arc<TaskBackendClient>,
        task_manager: Arc<TaskManager>,
        callback: Arc<CallbackClient>,
        health: Arc<HealthTracker>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        health.register_worker(id);
        Self {
            id,
            handlers,
            backend,
            task_manager,
            callback,
            health,
            rate_limiter,
        }
    }

    /// Runs the idle/poll/dispatch loop forever. Connection refusals are
    /// logged and looped past, never cause the worker to exit.
    pub async fn run(&self) {
        loop {
            match self.run_once().await {
                Ok(()) => {}
                Err(WorkerError::Transient(msg)) => {
                    log::warn!("worker {}: backend poll failed: {msg}", self.id);
                }
                Err(err) => {
                    self.health.increment_error_count(self.id);
                    self.health.update_worker_status(self.id, WorkerStatus::Error);
                    log::error!("worker {}: {err}", self.id);
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }

    async fn run_once(&self) -> Result<(), WorkerError> {
        let Some(mut task) = self.backend.fetch_task().await? else {
            return Ok(());
        };

        self.health.update_worker_status(self.id, WorkerStatus::Running);
        task.started_at = Some(chrono::Utc::now());

        let trace_headers = task.trace_headers();
        let _permit = self.rate_limiter.limit(&task).await;

        let handler = self.handlers.get(&task.function).cloned();
        let outcome = match handler {
            Some(handler) => {
                self.task_manager
                    .run_with_timeout_and_cancellation(&task, |cancel| {
                        let handler = handler.clone();
                        let task_snapshot = task.clone();
                        let trace_headers = trace_headers.clone();
                        async move { handler.handle(&task_snapshot, &trace_headers, cancel).await.map_err(|e| WorkerError::External(e.to_string())) }
                    })
                    .await
            }
            None => Err(WorkerError::Validation(format!("unknown function: {}", task.function))),
        };

        match outcome {
            Ok(output) => {
                task.output = Some(output);
            }
            Err(WorkerError::ToolTimeout { timeout_secs, source }) => {
                task.exception = Some(TaskException::timeout(timeout_secs, source));
            }
            Err(WorkerError::Cancelled) => {
                task.exception = Some(TaskException::cancelled());
                task.canceled_at = Some(chrono::Utc::now());
            }
            Err(err) => {
                task.exception = Some(TaskException::generic(err.to_string(), None));
            }
        }

        task.ended_at = Some(chrono::Utc::now());
        self.callback.send_callback(&task, &trace_headers).await;
        self.health.update_worker_status(self.id, WorkerStatus::Idle);
        Ok(())
    }
}
