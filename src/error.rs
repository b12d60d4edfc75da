//! Crate-wide error taxonomy.
//!
//! Every semantic failure kind named by the worker and agent-loop design gets
//! its own enum variant here rather than a single catch-all string, so
//! callers can `match` on the kind that actually matters to them (a tool
//! timeout is handled differently from a cancellation). Hand-rolled
//! `Display` impls, no macro, matching [`crate::tool_executor`]'s own
//! `ToolError`/`ResourceError` register. Fallible functions that don't need
//! caller-level matching just return `Box<dyn Error + Send + Sync>`.

use std::error::Error;
use std::fmt;

/// Which timeout fired: the function-specific override, or the global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutSource {
    Function,
    Global,
}

impl fmt::Display for TimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutSource::Function => write!(f, "function"),
            TimeoutSource::Global => write!(f, "global"),
        }
    }
}

/// Errors raised while driving a task through the worker pool.
#[derive(Debug)]
pub enum WorkerError {
    /// Task input was malformed, or referenced an unknown function/tool.
    Validation(String),
    /// A backend poll failed to connect; the worker should retry, not exit.
    Transient(String),
    /// A function handler did not finish inside its allotted deadline.
    ToolTimeout {
        timeout_secs: u64,
        source: TimeoutSource,
    },
    /// The backend marked the task canceled while it was running.
    Cancelled,
    /// An external collaborator (LLM, retriever, reranker, object store)
    /// returned a non-2xx or malformed response.
    External(String),
    /// The callback payload exceeded the inline threshold and the S3 path
    /// also failed.
    PayloadTooLarge,
    /// A tool-call buffer line failed to parse as JSON.
    StreamDecode(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Validation(msg) => write!(f, "validation error: {msg}"),
            WorkerError::Transient(msg) => write!(f, "transient error: {msg}"),
            WorkerError::ToolTimeout {
                timeout_secs,
                source,
            } => write!(
                f,
                "timed out after {timeout_secs}s ({source} timeout)"
            ),
            WorkerError::Cancelled => write!(f, "task cancelled"),
            WorkerError::External(msg) => write!(f, "external failure: {msg}"),
            WorkerError::PayloadTooLarge => write!(f, "callback content too large"),
            WorkerError::StreamDecode(msg) => write!(f, "stream decode error: {msg}"),
        }
    }
}

impl Error for WorkerError {}

/// Citation registry resolved an id that was never registered.
#[derive(Debug)]
pub struct UnknownCiteId(pub u64);

impl fmt::Display for UnknownCiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown citation id: {}", self.0)
    }
}

impl Error for UnknownCiteId {}

/// Tool executor was asked to dispatch a function name with no registered
/// handler.
#[derive(Debug)]
pub struct UnknownFunction(pub String);

impl fmt::Display for UnknownFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown function: {}", self.0)
    }
}

impl Error for UnknownFunction {}

/// Errors surfaced by a [`crate::retriever::SearchRetriever`] or
/// [`crate::resource_handler::ResourceHandler`] implementation.
#[derive(Debug)]
pub enum RetrieverError {
    Request(String),
    InvalidResponse(String),
}

impl fmt::Display for RetrieverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieverError::Request(msg) => write!(f, "retriever request failed: {msg}"),
            RetrieverError::InvalidResponse(msg) => {
                write!(f, "retriever returned an invalid response: {msg}")
            }
        }
    }
}

impl Error for RetrieverError {}

pub type BoxError = Box<dyn Error + Send + Sync>;
