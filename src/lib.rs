//! Core of a retrieval-augmented knowledge assistant backend: the agent
//! streaming loop with tool executor, and the worker pool with task
//! lifecycle management.
//!
//! HTTP transport framing, the LLM chat endpoint's exact prompt content, the
//! embedding/rerank endpoints, vector index operations, the object store,
//! and per-format file readers are external collaborators this crate
//! consumes through trait seams (see [`retriever`], [`resource_handler`],
//! [`agent::llm_client`], [`reranker`]) rather than implements.

pub mod agent;
pub mod citation_registry;
pub mod config;
pub mod error;
pub mod model;
pub mod reranker;
pub mod resource_handler;
pub mod retriever;
pub mod stream_parser;
pub mod tool_executor;
pub mod worker;

#[cfg(feature = "server")]
pub mod server;

pub use agent::{AgentEvent, AgentLoop, AgentRequest, ForcePrivateSearch};
pub use citation_registry::CitationRegistry;
pub use model::{Citation, Message, Retrieval, Role, Task};
pub use tool_executor::ToolExecutor;
pub use worker::{TaskManager, Worker, WorkerPool};
