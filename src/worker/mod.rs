//! Worker Pool with Task Lifecycle Management: polling, dispatch, timeout +
//! cancellation supervision, health tracking, rate limiting, and the
//! callback protocol.

pub mod agent_handler;
pub mod backend_client;
pub mod callback;
pub mod health;
pub mod pool;
pub mod rate_limiter;
pub mod task_manager;
pub mod worker;

pub use agent_handler::AgentTaskHandler;
pub use backend_client::TaskBackendClient;
pub use callback::CallbackClient;
pub use health::{HealthTracker, WorkerStatus};
pub use pool::WorkerPool;
pub use rate_limiter::RateLimiter;
pub use task_manager::TaskManager;
pub use worker::{FunctionHandler, Worker};
