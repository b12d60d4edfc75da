//! Process-wide health tracker: each worker registers and publishes
//! heartbeats on state transitions; the health HTTP handler reads the
//! aggregate. Guarded by a single mutex — writers are workers, readers are
//! the `/health` handler, per the shared-resources design.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

const UNHEALTHY_AFTER_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Running,
    Error,
}

#[derive(Debug, Clone)]
struct WorkerHealth {
    status: WorkerStatus,
    last_heartbeat: DateTime<Utc>,
    last_task_at: Option<DateTime<Utc>>,
    error_count: u64,
    total_tasks: u64,
}

#[derive(Debug, Serialize)]
pub struct WorkerHealthDetail {
    pub worker_id: u32,
    pub status: WorkerStatus,
    pub healthy: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub last_task_at: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub total_tasks: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub started_at: DateTime<Utc>,
    pub workers: WorkersSummary,
}

#[derive(Debug, Serialize)]
pub struct WorkersSummary {
    pub total: usize,
    pub healthy: usize,
    pub details: Vec<WorkerHealthDetail>,
}

pub struct HealthTracker {
    workers: Mutex<HashMap<u32, WorkerHealth>>,
    started_at: DateTime<Utc>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    pub fn register_worker(&self, worker_id: u32) {
        self.workers.lock().unwrap().insert(
            worker_id,
            WorkerHealth {
                status: WorkerStatus::Idle,
                last_heartbeat: Utc::now(),
                last_task_at: None,
                error_count: 0,
                total_tasks: 0,
            },
        );
    }

    pub fn update_worker_status(&self, worker_id: u32, status: WorkerStatus) {
        let mut workers = self.workers.lock().unwrap();
        let entry = workers.entry(worker_id).or_insert_with(|| WorkerHealth {
            status,
            last_heartbeat: Utc::now(),
            last_task_at: None,
            error_count: 0,
            total_tasks: 0,
        });
        entry.status = status;
        entry.last_heartbeat = Utc::now();
        if status == WorkerStatus::Running {
            entry.total_tasks += 1;
            entry.last_task_at = Some(Utc::now());
        }
    }

    pub fn increment_error_count(&self, worker_id: u32) {
        if let Some(entry) = self.workers.lock().unwrap().get_mut(&worker_id) {
            entry.error_count += 1;
        }
    }

    pub fn report(&self) -> HealthReport {
        let workers = self.workers.lock().unwrap();
        let now = Utc::now();
        let mut details = Vec::with_capacity(workers.len());
        let mut healthy_count = 0;
        for (&id, health) in workers.iter() {
            let healthy = (now - health.last_heartbeat).num_seconds() < UNHEALTHY_AFTER_SECS;
            if healthy {
                healthy_count += 1;
            }
            details.push(WorkerHealthDetail {
                worker_id: id,
                status: health.status,
                healthy,
                last_heartbeat: health.last_heartbeat,
                last_task_at: health.last_task_at,
                error_count: health.error_count,
                total_tasks: health.total_tasks,
            });
        }
        let total = workers.len();
        let overall_healthy = total > 0 && healthy_count == total;

        HealthReport {
            status: if overall_healthy { "healthy" } else { "unhealthy" },
            uptime_secs: (now - self.started_at).num_seconds(),
            started_at: self.started_at,
            workers: WorkersSummary {
                total,
                healthy: healthy_count,
                details,
            },
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_healthy_requires_every_worker_healthy() {
        let tracker = HealthTracker::new();
        tracker.register_worker(1);
        tracker.register_worker(2);
        tracker.update_worker_status(1, WorkerStatus::Idle);
        let report = tracker.report();
        assert_eq!(report.status, "healthy");
        assert_eq!(report.workers.healthy, 2);
    }

    #[test]
    fn empty_pool_is_not_healthy() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.report().status, "unhealthy");
    }
}
