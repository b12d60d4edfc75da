//! Process configuration.
//!
//! A plain struct assembled from environment variables: no TOML, YAML, or
//! other config-file parsing dependency is introduced. Binary entry points
//! (`src/bin/worker.rs`, `src/bin/server.rs`) additionally take a handful of
//! `clap` flags (worker count, bind address) that override or seed fields
//! here; the struct itself is the single source of truth once constructed.

use std::time::Duration;

/// Per-function timeout overrides, consulted before falling back to the
/// global task timeout.
#[derive(Debug, Clone, Default)]
pub struct FunctionTimeouts {
    overrides: std::collections::HashMap<String, Duration>,
}

impl FunctionTimeouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, function: impl Into<String>, timeout: Duration) -> Self {
        self.overrides.insert(function.into(), timeout);
        self
    }

    /// Returns the configured override for `function`, along with whether it
    /// came from the function-specific table (`true`) or the global default.
    pub fn resolve(&self, function: &str, global: Duration) -> (Duration, bool) {
        match self.overrides.get(function) {
            Some(d) => (*d, true),
            None => (global, false),
        }
    }
}

/// Rate limiter permit counts, keyed by category (see
/// [`crate::worker::rate_limiter::RateLimiter`]).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub file_reader_doc: usize,
    pub file_reader_md: usize,
    pub file_reader_txt: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            file_reader_doc: 4,
            file_reader_md: 8,
            file_reader_txt: 8,
        }
    }
}

/// Worker pool and callback protocol configuration.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Default timeout applied when no function-specific override exists.
    pub timeout: Duration,
    pub function_timeouts: FunctionTimeouts,
    /// How often the cancellation monitor polls the backend.
    pub cancellation_check_interval: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            function_timeouts: FunctionTimeouts::new(),
            cancellation_check_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Payloads larger than this go through the S3 upload-then-notify path.
    pub payload_size_threshold_bytes: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            payload_size_threshold_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Top-level configuration for the worker pool and HTTP surfaces.
///
/// Construct with [`AppConfig::from_env`] in binaries, or build one by hand
/// (e.g. in tests) via `AppConfig { ..Default::default() }`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the task-queue/callback/object-store backend.
    pub backend_base_url: String,
    pub task: TaskConfig,
    pub callback: CallbackConfig,
    pub rate_limit: RateLimitConfig,
    /// Number of concurrent workers in the pool.
    pub worker_count: usize,
    /// Address the HTTP surface (health + chat SSE) binds to.
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8000".to_string(),
            task: TaskConfig::default(),
            callback: CallbackConfig::default(),
            rate_limit: RateLimitConfig::default(),
            worker_count: 1,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads overrides from `GRIMOIRE_*` environment variables, falling back
    /// to [`AppConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("GRIMOIRE_BACKEND_BASE_URL") {
            config.backend_base_url = v;
        }
        if let Ok(v) = std::env::var("GRIMOIRE_TASK_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.task.timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("GRIMOIRE_CANCELLATION_CHECK_INTERVAL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.task.cancellation_check_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("GRIMOIRE_CALLBACK_THRESHOLD_BYTES") {
            if let Ok(bytes) = v.parse::<u64>() {
                config.callback.payload_size_threshold_bytes = bytes;
            }
        }
        if let Ok(v) = std::env::var("GRIMOIRE_WORKER_COUNT") {
            if let Ok(n) = v.parse::<usize>() {
                config.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("GRIMOIRE_BIND_ADDR") {
            config.bind_addr = v;
        }
        config
    }
}
