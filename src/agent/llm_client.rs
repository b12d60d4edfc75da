//! Streaming LLM client: a thin [`ChatClient`] trait over the
//! OpenAI-compatible chat endpoint named in the external-interfaces design,
//! plus one concrete `reqwest`+SSE implementation.
//!
//! Wire shape consumed: `{model, messages, stream:true, tools?, extra_body?,
//! extra_headers}` in, `choices[0].delta.{content, reasoning_content,
//! tool_calls[]}` chunks out, framed as `data: <json>\n\n`.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

use crate::error::BoxError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_body: Option<Value>,
}

/// Raw per-index tool-call fragment as streamed by the vendor protocol:
/// id/type/name set once, arguments concatenated across chunks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDeltaFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub function: ToolCallDeltaFunction,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunkChoice {
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    pub choices: Vec<ChatChunkChoice>,
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, BoxError>> + Send>>;

/// Streaming chat-completion client seam, shaped like a `ClientWrapper`'s
/// `send_message_stream` but returning a chunk stream rather than one
/// accumulated message, since the agent loop needs to observe deltas as
/// they arrive.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message_stream(
        &self,
        request: ChatRequest,
        extra_headers: Vec<(String, String)>,
    ) -> Result<ChatStream, BoxError>;

    fn model_name(&self) -> &str;
}

/// OpenAI-compatible streaming client built directly on `reqwest` and
/// `eventsource-stream`, parsing the literal `data: <json>\n\n` SSE framing
/// the chat endpoint produces.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn send_message_stream(
        &self,
        request: ChatRequest,
        extra_headers: Vec<(String, String)>,
    ) -> Result<ChatStream, BoxError> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        for (name, value) in extra_headers {
            req = req.header(name, value);
        }

        let resp = req.send().await?;
        let resp = resp.error_for_status()?;

        let stream = resp
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                let event = match event {
                    Ok(e) => e,
                    Err(e) => return Some(Err(Box::new(e) as BoxError)),
                };
                if event.data == "[DONE]" {
                    return None;
                }
                match serde_json::from_str::<ChatChunk>(&event.data) {
                    Ok(chunk) => Some(Ok(chunk)),
                    Err(e) => Some(Err(Box::new(e) as BoxError)),
                }
            });

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
