//! Transcript, retrieval, and task data types shared across every component.

pub mod citation;
pub mod message;
pub mod resource;
pub mod retrieval;
pub mod task;

pub use citation::Citation;
pub use message::{Message, MessageAttrs, Role, SelectedTool, ToolCall};
pub use resource::{ResourceData, ResourceInfo, ResourceRef, ResourceToolResult};
pub use retrieval::{Retrieval, ResourceChunkRetrieval, Score, WebRetrieval};
pub use task::{Task, TaskException, TaskStatus};
