//! Agent streaming loop: drives one chat turn against an LLM, dispatching
//! tool calls through [`crate::tool_executor`] and threading citation state
//! through [`crate::citation_registry`].

pub mod agent_loop;
pub mod llm_client;
pub mod query_context;

pub use agent_loop::{AgentEvent, AgentLoop, AgentRequest, ForcePrivateSearch, DEFAULT_TOOL_NAME};
pub use llm_client::{ChatClient, ChatRequest, OpenAiCompatibleClient};
