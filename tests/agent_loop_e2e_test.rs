//! End-to-end scenarios from spec.md §8: a fresh conversation forces a
//! `private_search` call without consulting the LLM for that call (scenario
//! 1 — the LLM is still invoked once afterward, to produce the final
//! answer), and a follow-up turn rehydrates prior citation ids and keeps
//! numbering stable across turns (scenario 2).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use grimoire_core::agent::llm_client::{ChatChunk, ChatChunkChoice, ChatRequest, ChatStream, Delta, ToolCallDelta, ToolCallDeltaFunction};
use grimoire_core::agent::{AgentEvent, AgentLoop, AgentRequest, ChatClient, ForcePrivateSearch};
use grimoire_core::error::{BoxError, RetrieverError};
use grimoire_core::model::{
    Citation, Message, MessageAttrs, ResourceChunkRetrieval, Retrieval, Role, Score, SelectedTool,
};
use grimoire_core::reranker::Reranker;
use grimoire_core::retriever::SearchRetriever;
use tokio::sync::mpsc;

/// Answers with plain content exactly once. Used where the forced
/// `private_search` shortcut bypasses the LLM for the tool-call turn, so the
/// only real invocation is the one that produces the final answer after the
/// tool result comes back.
struct AnswersOnceNoToolCalls {
    calls: AtomicUsize,
}

impl AnswersOnceNoToolCalls {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ChatClient for AnswersOnceNoToolCalls {
    async fn send_message_stream(&self, _request: ChatRequest, _headers: Vec<(String, String)>) -> Result<ChatStream, BoxError> {
        assert_eq!(
            self.calls.fetch_add(1, Ordering::SeqCst),
            0,
            "the LLM must be invoked exactly once, after the forced search's tool result lands"
        );
        let chunk = ChatChunk {
            choices: vec![ChatChunkChoice {
                delta: Delta {
                    content: Some("小红 is a character in the story.".to_string()),
                    reasoning_content: None,
                    tool_calls: vec![],
                },
                finish_reason: Some("stop".to_string()),
            }],
        };
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(chunk)])))
    }
    fn model_name(&self) -> &str {
        "test-model"
    }
}

/// Calls `private_search` natively on its first invocation, then answers
/// with plain content once the tool result is back on the transcript.
struct CallsPrivateSearchThenAnswers {
    calls: AtomicUsize,
}

impl CallsPrivateSearchThenAnswers {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ChatClient for CallsPrivateSearchThenAnswers {
    async fn send_message_stream(&self, _request: ChatRequest, _headers: Vec<(String, String)>) -> Result<ChatStream, BoxError> {
        let chunk = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            ChatChunk {
                choices: vec![ChatChunkChoice {
                    delta: Delta {
                        content: None,
                        reasoning_content: None,
                        tool_calls: vec![ToolCallDelta {
                            index: 0,
                            id: Some("call-1".to_string()),
                            r#type: Some("function".to_string()),
                            function: ToolCallDeltaFunction {
                                name: Some("private_search".to_string()),
                                arguments: Some(serde_json::json!({"query": "follow up question"}).to_string()),
                            },
                        }],
                    },
                    finish_reason: Some("tool_calls".to_string()),
                }],
            }
        } else {
            ChatChunk {
                choices: vec![ChatChunkChoice {
                    delta: Delta {
                        content: Some("小红 is a character in the story.".to_string()),
                        reasoning_content: None,
                        tool_calls: vec![],
                    },
                    finish_reason: Some("stop".to_string()),
                }],
            }
        };
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(chunk)])))
    }
    fn model_name(&self) -> &str {
        "test-model"
    }
}

struct StaticPrivateSearch {
    results: Vec<Retrieval>,
}

#[async_trait]
impl SearchRetriever for StaticPrivateSearch {
    fn schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "function", "function": {"name": "private_search", "parameters": {"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}}})
    }
    fn name(&self) -> &str {
        "private_search"
    }
    async fn search(&self, _query: &str) -> Result<Vec<Retrieval>, RetrieverError> {
        Ok(self.results.clone())
    }
}

fn chunk_retrieval(resource_id: &str) -> Retrieval {
    Retrieval::Chunk(ResourceChunkRetrieval {
        resource_id: resource_id.to_string(),
        folder_id: None,
        start_index: 0,
        end_index: 10,
        text: "小红是一个角色".to_string(),
        title: "story.txt".to_string(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
        score: Score { recall: 0.9, rerank: None },
    })
}

async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn fresh_conversation_forces_private_search_without_calling_the_llm() {
    let retriever: Arc<dyn SearchRetriever> = Arc::new(StaticPrivateSearch {
        results: vec![chunk_retrieval("resA")],
    });

    let mut agent = AgentLoop::new(
        Arc::new(AnswersOnceNoToolCalls::new()),
        vec![("private_search".to_string(), retriever)],
        vec![],
        Arc::new(Reranker::passthrough()),
        vec![],
    );

    let request = AgentRequest {
        conversation_id: "c1".to_string(),
        query: "小红是谁？".to_string(),
        tools: vec![SelectedTool {
            name: "private_search".to_string(),
            namespace_id: Some("n1".to_string()),
            visible_resources: vec![],
        }],
        enable_thinking: false,
        merge_search: false,
        custom_tool_call: false,
        lang: "zh".to_string(),
        force_private_search: ForcePrivateSearch::Auto,
        trace_headers: std::collections::HashMap::new(),
    };

    let (tx, rx) = mpsc::channel(64);
    agent.run(request, tx).await;
    let events = drain(rx).await;

    assert!(matches!(events.last(), Some(AgentEvent::Done)));
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error(_))));

    // system, user, assistant(tool_calls), tool, assistant(final) == 5.
    assert_eq!(agent.transcript.len(), 5);
    assert_eq!(agent.transcript[0].role, Role::System);
    assert_eq!(agent.transcript[1].role, Role::User);

    let assistant_call = &agent.transcript[2];
    assert_eq!(assistant_call.role, Role::Assistant);
    assert_eq!(assistant_call.tool_calls.len(), 1);
    assert_eq!(assistant_call.tool_calls[0].name, "private_search");

    let tool_reply = &agent.transcript[3];
    assert_eq!(tool_reply.role, Role::Tool);
    assert_eq!(tool_reply.tool_call_id, Some(assistant_call.tool_calls[0].id.clone()));
    assert!(tool_reply.content.as_deref().unwrap_or_default().contains("<retrievals>"));

    let citations = &tool_reply.attrs.as_ref().unwrap().citations;
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0].id, 1);
    assert_eq!(citations[0].link, "resA");

    assert_eq!(agent.transcript[4].role, Role::Assistant);
    assert!(agent.transcript[4].tool_calls.is_empty());
}

#[tokio::test]
async fn multi_turn_conversation_preserves_prior_citation_ids() {
    let mut prior_tool_message = Message::tool("call-0", "<retrievals/>");
    prior_tool_message.attrs = Some(MessageAttrs {
        citations: vec![Citation {
            title: "old doc".to_string(),
            snippet: None,
            link: "resA".to_string(),
            updated_at: None,
            source: "private_search".to_string(),
            id: 7,
        }],
        ..Default::default()
    });

    let prior_transcript = vec![
        Message::system("sys"),
        Message::user("first question"),
        {
            let mut assistant = Message::assistant();
            assistant.tool_calls = vec![grimoire_core::model::ToolCall {
                id: "call-0".to_string(),
                name: "private_search".to_string(),
                arguments: serde_json::json!({"query": "first question"}),
            }];
            assistant
        },
        prior_tool_message,
        {
            let mut assistant = Message::assistant();
            assistant.content = Some("first answer".to_string());
            assistant
        },
    ];

    let retriever: Arc<dyn SearchRetriever> = Arc::new(StaticPrivateSearch {
        results: vec![chunk_retrieval("resB"), chunk_retrieval("resA")],
    });

    let mut agent = AgentLoop::new(
        Arc::new(CallsPrivateSearchThenAnswers::new()),
        vec![("private_search".to_string(), retriever)],
        vec![],
        Arc::new(Reranker::passthrough()),
        prior_transcript,
    );

    let request = AgentRequest {
        conversation_id: "c1".to_string(),
        query: "follow up question".to_string(),
        tools: vec![SelectedTool {
            name: "private_search".to_string(),
            namespace_id: Some("n1".to_string()),
            visible_resources: vec![],
        }],
        enable_thinking: false,
        merge_search: false,
        custom_tool_call: false,
        lang: "zh".to_string(),
        // The force-private-search shortcut only applies to a fresh
        // (system+user-only) transcript; it must not fire here.
        force_private_search: ForcePrivateSearch::Auto,
        trace_headers: std::collections::HashMap::new(),
    };

    let (tx, rx) = mpsc::channel(64);
    agent.run(request, tx).await;
    let events = drain(rx).await;
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error(_))));

    // Registry rehydrated with resA -> 7; a fresh search returning [resB, resA]
    // allocates 8 for resB and reuses 7 for resA (spec.md scenario 2).
    assert_eq!(agent.registry.get("resA"), Some(7));
    assert_eq!(agent.registry.get("resB"), Some(8));
}
