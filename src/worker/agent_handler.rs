//! Glue between the two subsystems the overview diagram names as
//! tightly-coupled: a [`FunctionHandler`] that dispatches a chat-shaped task
//! (function name `agent_run`) to the [`AgentLoop`], drains its event
//! stream, and folds the finished transcript into the task's output.
//!
//! Everything else about dispatch (timeout, cancellation, rate limiting,
//! callback) is identical to any other function handler — this type exists
//! purely to adapt the agent loop's streaming-event protocol to the single
//! `Result<Value, BoxError>` shape [`FunctionHandler::handle`] expects.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentEvent, AgentLoop, AgentRequest, ChatClient, ForcePrivateSearch};
use crate::error::BoxError;
use crate::model::{Message, SelectedTool, Task};
use crate::reranker::Reranker;
use crate::resource_handler::ResourceHandler;
use crate::retriever::SearchRetriever;

use super::worker::FunctionHandler;

/// `task.function == "agent_run"`'s input payload: everything
/// [`AgentRequest`] needs, plus the prior transcript (empty for a fresh
/// conversation).
#[derive(Debug, Deserialize)]
struct AgentTaskInput {
    conversation_id: String,
    query: String,
    #[serde(default)]
    transcript: Vec<Message>,
    #[serde(default)]
    tools: Vec<SelectedTool>,
    #[serde(default)]
    enable_thinking: bool,
    #[serde(default)]
    merge_search: bool,
    #[serde(default)]
    custom_tool_call: bool,
    #[serde(default = "default_lang")]
    lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

/// The `agent_run` function handler: one [`AgentLoop`] invocation per task,
/// collaborators shared across every task this worker dispatches.
pub struct AgentTaskHandler {
    pub chat_client: Arc<dyn ChatClient>,
    pub search_retrievers: Vec<(String, Arc<dyn SearchRetriever>)>,
    pub resource_handlers: Vec<(String, Arc<dyn ResourceHandler>)>,
    pub reranker: Arc<Reranker>,
}

#[async_trait]
impl FunctionHandler for AgentTaskHandler {
    async fn handle(
        &self,
        task: &Task,
        trace_headers: &HashMap<String, String>,
        _cancel: CancellationToken,
    ) -> Result<Value, BoxError> {
        let input: AgentTaskInput = serde_json::from_value(task.input.clone())?;

        let mut agent = AgentLoop::new(
            self.chat_client.clone(),
            self.search_retrievers.clone(),
            self.resource_handlers.clone(),
            self.reranker.clone(),
            input.transcript,
        );

        let request = AgentRequest {
            conversation_id: input.conversation_id,
            query: input.query,
            tools: input.tools,
            enable_thinking: input.enable_thinking,
            merge_search: input.merge_search,
            custom_tool_call: input.custom_tool_call,
            lang: input.lang,
            force_private_search: ForcePrivateSearch::Auto,
            trace_headers: trace_headers.clone(),
        };

        let (tx, mut rx) = mpsc::channel(64);
        let drain = async {
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        };
        let (_, events) = tokio::join!(agent.run(request, tx), drain);

        if let Some(message) = events.iter().find_map(|event| match event {
            AgentEvent::Error(message) => Some(message.clone()),
            _ => None,
        }) {
            return Err(message.into());
        }

        Ok(serde_json::json!({ "transcript": agent.transcript }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm_client::{ChatChunk, ChatChunkChoice, ChatRequest, ChatStream, Delta};
    use crate::model::{Retrieval, ResourceChunkRetrieval, Score};
    use crate::retriever::SearchRetriever;
    use futures_util::stream;

    struct OneShotChatClient;

    #[async_trait]
    impl ChatClient for OneShotChatClient {
        async fn send_message_stream(
            &self,
            _request: ChatRequest,
            _extra_headers: Vec<(String, String)>,
        ) -> Result<ChatStream, BoxError> {
            let chunk = ChatChunk {
                choices: vec![ChatChunkChoice {
                    delta: Delta {
                        content: Some("final answer".to_string()),
                        reasoning_content: None,
                        tool_calls: vec![],
                    },
                    finish_reason: Some("stop".to_string()),
                }],
            };
            Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
        }

        fn model_name(&self) -> &str {
            "test-model"
        }
    }

    struct StubRetriever;

    #[async_trait]
    impl SearchRetriever for StubRetriever {
        fn schema(&self) -> Value {
            serde_json::json!({"type": "function", "function": {"name": "private_search"}})
        }
        fn name(&self) -> &str {
            "private_search"
        }
        async fn search(&self, _query: &str) -> Result<Vec<Retrieval>, crate::error::RetrieverError> {
            Ok(vec![Retrieval::Chunk(ResourceChunkRetrieval {
                resource_id: "resA".into(),
                folder_id: None,
                start_index: 0,
                end_index: 10,
                text: "hello".into(),
                title: "doc".into(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
                score: Score { recall: 1.0, rerank: None },
            })])
        }
    }

    #[tokio::test]
    async fn agent_run_task_produces_a_transcript_in_output() {
        let handler = AgentTaskHandler {
            chat_client: Arc::new(OneShotChatClient),
            search_retrievers: vec![("private_search".to_string(), Arc::new(StubRetriever))],
            resource_handlers: vec![],
            reranker: Arc::new(Reranker::passthrough()),
        };

        let task = Task {
            id: "t1".into(),
            priority: 0,
            namespace_id: "ns".into(),
            user_id: "u".into(),
            function: "agent_run".into(),
            input: serde_json::json!({
                "conversation_id": "c1",
                "query": "who is Xiaohong?",
                "tools": [{"name": "private_search", "namespace_id": "ns", "visible_resources": []}],
            }),
            payload: None,
            output: None,
            exception: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
            canceled_at: None,
        };

        let output = handler
            .handle(&task, &HashMap::new(), CancellationToken::new())
            .await
            .expect("agent_run should succeed");

        let transcript = output.get("transcript").and_then(Value::as_array).unwrap();
        assert!(!transcript.is_empty());
        let last = transcript.last().unwrap();
        assert_eq!(last.get("role").and_then(Value::as_str), Some("assistant"));
    }
}
