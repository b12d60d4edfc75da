//! Worker Pool: spawns N [`Worker::run`] loops concurrently via
//! `tokio::spawn`, the same fan-out idiom the agent side uses for
//! concurrent sessions, reused here for worker concurrency instead of a raw
//! OS thread pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::AppConfig;

use super::backend_client::TaskBackendClient;
use super::callback::CallbackClient;
use super::health::HealthTracker;
use super::rate_limiter::RateLimiter;
use super::task_manager::TaskManager;
use super::worker::{FunctionHandler, Worker};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    pub health: Arc<HealthTracker>,
}

impl WorkerPool {
    pub fn spawn(config: AppConfig, handlers: HashMap<String, Arc<dyn FunctionHandler>>) -> Self {
        let http = reqwest::Client::new();
        let backend = Arc::new(TaskBackendClient::new(http.clone(), config.backend_base_url.clone()));
        let task_manager = Arc::new(TaskManager::new(config.task.clone(), backend.clone()));
        let callback = Arc::new(CallbackClient::new(http.clone(), config.backend_base_url.clone(), config.callback.clone()));
        let health = Arc::new(HealthTracker::new());
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let mut handles = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count as u32 {
            let worker = Worker::new(
                id,
                handlers.clone(),
                backend.clone(),
                task_manager.clone(),
                callback.clone(),
                health.clone(),
                rate_limiter.clone(),
            );
            handles.push(tokio::spawn(async move { worker.run().await }));
        }

        Self { handles, health }
    }

    /// Waits for every worker loop to exit. Workers never exit under normal
    /// operation (their inner loop is infinite), so this only returns if a
    /// worker panics.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
