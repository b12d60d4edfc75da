//! Task Manager: wraps a task's execution with two concurrent supervisors —
//! a deadline timeout and a cancellation-poll monitor — exactly mirroring
//! the two-task supervisor shape of the source worker: execution task +
//! monitor task, whichever finishes or cancels first wins, the monitor
//! always torn down once the race is decided.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::TaskConfig;
use crate::error::{TimeoutSource, WorkerError};
use crate::model::Task;

use super::backend_client::TaskBackendClient;

pub struct TaskManager {
    config: TaskConfig,
    backend: Arc<TaskBackendClient>,
}

impl TaskManager {
    pub fn new(config: TaskConfig, backend: Arc<TaskBackendClient>) -> Self {
        Self { config, backend }
    }

    /// Races `execution` against a deadline and a polling cancellation
    /// monitor. Exactly one of three outcomes occurs: `execution` finishes
    /// first (`Ok`), the deadline elapses first (`ToolTimeout`), or the
    /// monitor observes `canceled_at` set on the backend first (`Cancelled`).
    /// The monitor is always stopped once a winner is decided, matching the
    /// source's `finally: monitor_task.cancel()`.
    pub async fn run_with_timeout_and_cancellation<F, Fut, T>(
        &self,
        task: &Task,
        execution: F,
    ) -> Result<T, WorkerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<T, WorkerError>>,
    {
        let cancel_token = CancellationToken::new();
        let (timeout_duration, used_function_override) = self
            .config
            .function_timeouts
            .resolve(&task.function, self.config.timeout);
        let timeout_source = if used_function_override {
            TimeoutSource::Function
        } else {
            TimeoutSource::Global
        };

        let execution_future = execution(cancel_token.clone());

        let monitor_token = cancel_token.clone();
        let monitor_task_id = task.id.clone();
        let backend = self.backend.clone();
        let check_interval = self.config.cancellation_check_interval;
        let monitor = tokio::spawn(async move {
            monitor_cancellation(backend, monitor_task_id, check_interval, monitor_token).await;
        });

        let result = tokio::select! {
            result = timeout(timeout_duration, execution_future) => {
                match result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(err),
                    Err(_elapsed) => {
                        cancel_token.cancel();
                        Err(WorkerError::ToolTimeout { timeout_secs: timeout_duration.as_secs(), source: timeout_source })
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                Err(WorkerError::Cancelled)
            }
        };

        monitor.abort();
        result
    }
}

/// Polls the backend every `check_interval` for `task_id`'s `canceled_at`
/// field; cancels `token` the moment it's set. Transient fetch errors are
/// swallowed and the loop continues, matching the source's `except`-and-log
/// discipline — a flaky backend should never spuriously cancel a task.
async fn monitor_cancellation(
    backend: Arc<TaskBackendClient>,
    task_id: String,
    check_interval: Duration,
    token: CancellationToken,
) {
    loop {
        tokio::time::sleep(check_interval).await;
        if token.is_cancelled() {
            return;
        }
        if let Some(task) = backend.check_task_status(&task_id).await {
            if task.canceled_at.is_some() {
                token.cancel();
                return;
            }
        }
    }
}
