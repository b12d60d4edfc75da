//! Conversation transcript types: [`Message`], [`Role`], [`ToolCall`].

use serde::{Deserialize, Serialize};

use super::citation::Citation;
use super::resource::ResourceRef;

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// An assistant's request to invoke a named function. Arguments are parsed
/// JSON once the owning message is finalized; the wire form carries them as
/// a JSON string, matching the vendor tool-call protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool previously selected for this conversation, along with whatever
/// scoping the caller attached (namespace, visible resources). Opaque to
/// everything except the query-context renderer and the tool executor
/// construction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTool {
    pub name: String,
    pub namespace_id: Option<String>,
    #[serde(default)]
    pub visible_resources: Vec<ResourceRef>,
}

/// Side-channel state a message carries beyond its role/content: the tools
/// selected for the turn, resources discovered along the way, and citations
/// this message attaches. All are empty by default — most messages carry
/// none of this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageAttrs {
    #[serde(default)]
    pub tools: Vec<SelectedTool>,
    #[serde(default)]
    pub related_resources: Vec<ResourceRef>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// An ordered element of a conversation transcript. Append-only once
/// emitted: nothing in this crate mutates a `Message` after it has been
/// pushed onto a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Visible only to the user; never fed back as LLM context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `Role::Tool` messages; binds the reply to its originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<MessageAttrs>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            attrs: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            attrs: None,
        }
    }

    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            attrs: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            reasoning: None,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            attrs: None,
        }
    }

    /// Number of citations this message attaches, or 0 if it carries none.
    pub fn citation_count(&self) -> usize {
        self.attrs.as_ref().map_or(0, |a| a.citations.len())
    }
}
