//! Agent Streaming Loop: the top-level state machine driving one chat turn
//! to completion, intercepting tool calls (native or inline-tagged),
//! threading citation state, and re-entering the LLM until a final
//! tool-call-free assistant message is produced.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::citation_registry::CitationRegistry;
use crate::error::BoxError;
use crate::model::{Message, MessageAttrs, Role, ResourceRef, SelectedTool, ToolCall};
use crate::stream_parser::{DeltaTag, StreamParser};
use crate::tool_executor::ToolExecutor;

use super::llm_client::{ChatClient, ChatRequest};
use super::query_context;

/// `Literal["disable","enable","auto"]` in the source: whether to bypass the
/// LLM on a fresh non-thinking conversation and synthesize a
/// `private_search` call directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcePrivateSearch {
    Disable,
    Enable,
    Auto,
}

pub const DEFAULT_TOOL_NAME: &str = "private_search";

/// What the caller asks for when starting or continuing a turn.
pub struct AgentRequest {
    pub conversation_id: String,
    pub query: String,
    pub tools: Vec<SelectedTool>,
    pub enable_thinking: bool,
    pub merge_search: bool,
    pub custom_tool_call: bool,
    pub lang: String,
    pub force_private_search: ForcePrivateSearch,
    /// Forwarded verbatim as extra headers on the LLM chat request, so the
    /// endpoint's tracing parents this turn under the task producer's span
    /// (spec.md §4.7). Empty when the caller has no trace context to carry.
    pub trace_headers: std::collections::HashMap<String, String>,
}

/// One event in the streaming protocol exposed to the caller: a sequence of
/// `Bos`/`Delta`/`Eos` per message, repeated, ending in `Done` (or an
/// `Error` followed by `Done` on failure).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Bos { role: Role },
    Delta { message: Message },
    Eos,
    Error(String),
    Done,
}

/// Drives one conversation's turns. Owns the transcript and citation
/// registry for the lifetime of the conversation; the tool executor is
/// rebuilt per-turn from the request's tool selection (resources/filters can
/// change turn to turn).
pub struct AgentLoop {
    pub transcript: Vec<Message>,
    pub registry: CitationRegistry,
    chat_client: Arc<dyn ChatClient>,
    search_retrievers: Vec<(String, Arc<dyn crate::retriever::SearchRetriever>)>,
    resource_handlers: Vec<(String, Arc<dyn crate::resource_handler::ResourceHandler>)>,
    reranker: Arc<crate::reranker::Reranker>,
}

impl AgentLoop {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        search_retrievers: Vec<(String, Arc<dyn crate::retriever::SearchRetriever>)>,
        resource_handlers: Vec<(String, Arc<dyn crate::resource_handler::ResourceHandler>)>,
        reranker: Arc<crate::reranker::Reranker>,
        transcript: Vec<Message>,
    ) -> Self {
        Self {
            transcript,
            registry: CitationRegistry::new(),
            chat_client,
            search_retrievers,
            resource_handlers,
            reranker,
        }
    }

    /// Runs one full turn, emitting [`AgentEvent`]s to `tx` as they occur.
    /// The channel is closed (by dropping `tx`) immediately after `Done` is
    /// sent — bounded, single-consumer, per the streaming-event-fan-out
    /// design note.
    pub async fn run(&mut self, request: AgentRequest, tx: mpsc::Sender<AgentEvent>) {
        if let Err(err) = self.run_inner(request, &tx).await {
            let _ = tx.send(AgentEvent::Error(err.to_string())).await;
        }
        let _ = tx.send(AgentEvent::Done).await;
    }

    async fn run_inner(&mut self, request: AgentRequest, tx: &mpsc::Sender<AgentEvent>) -> Result<(), BoxError> {
        self.registry.rehydrate(&self.transcript);

        let executor = self.build_tool_executor(&request).await?;
        let all_tool_names: Vec<String> = request.tools.iter().map(|t| t.name.clone()).collect();

        if self.transcript.is_empty() {
            let prompt = render_system_prompt(&request, &all_tool_names);
            self.emit_complete(tx, Message::system(prompt)).await?;
        }

        let needs_user_message = !matches!(self.transcript.last().map(|m| m.role), Some(Role::User));
        if needs_user_message {
            let related = self.discover_related_resources(&request, &executor).await?;
            let mut user_message = Message::user(request.query.clone());
            user_message.attrs = Some(MessageAttrs {
                tools: request.tools.clone(),
                related_resources: related,
                citations: Vec::new(),
            });
            self.emit_complete(tx, user_message).await?;
        }

        while !self.turn_is_finished() {
            let assistant_message = self.step_llm_or_shortcut(&request, &executor, &all_tool_names, tx).await?;

            if assistant_message.tool_calls.is_empty() {
                break;
            }

            let tool_messages = executor.execute(&assistant_message, &mut self.registry).await?;
            for message in tool_messages {
                self.emit_complete(tx, message).await?;
            }
        }

        Ok(())
    }

    fn turn_is_finished(&self) -> bool {
        matches!(
            self.transcript.last(),
            Some(Message { role: Role::Assistant, tool_calls, .. }) if tool_calls.is_empty()
        )
    }

    /// §4.4.B: on the very first turn of a fresh non-thinking conversation,
    /// skip the LLM entirely and synthesize a `private_search` call.
    fn should_force_private_search(&self, request: &AgentRequest, executor: &ToolExecutor) -> bool {
        let policy_enabled = match request.force_private_search {
            ForcePrivateSearch::Enable => true,
            ForcePrivateSearch::Disable => false,
            ForcePrivateSearch::Auto => !request.enable_thinking,
        };
        policy_enabled && self.transcript.len() == 2 && executor.has(DEFAULT_TOOL_NAME)
    }

    async fn step_llm_or_shortcut(
        &mut self,
        request: &AgentRequest,
        executor: &ToolExecutor,
        all_tool_names: &[String],
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<Message, BoxError> {
        if self.should_force_private_search(request, executor) {
            let message = synth_private_search_call(&request.query);
            self.emit_complete(tx, message.clone()).await?;
            return Ok(message);
        }
        self.invoke_llm(request, executor, all_tool_names, tx).await
    }

    async fn invoke_llm(
        &mut self,
        request: &AgentRequest,
        executor: &ToolExecutor,
        all_tool_names: &[String],
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<Message, BoxError> {
        let wire_messages = self.build_wire_messages(request, executor, all_tool_names);

        let chat_request = ChatRequest {
            model: self.chat_client.model_name().to_string(),
            messages: wire_messages,
            stream: true,
            tools: if request.custom_tool_call { None } else { Some(executor.schemas()) },
            extra_body: Some(serde_json::json!({"enable_thinking": request.enable_thinking})),
        };

        let mut extra_headers = vec![("X-Conversation-Id".to_string(), request.conversation_id.clone())];
        extra_headers.extend(request.trace_headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut stream = self
            .chat_client
            .send_message_stream(chat_request, extra_headers)
            .await?;

        tx.send(AgentEvent::Bos { role: Role::Assistant }).await.ok();

        let mut parser = StreamParser::new();
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut tool_call_buffer = String::new();
        let mut native_tool_calls: Vec<(usize, String, String, String)> = Vec::new();

        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let Some(choice) = chunk.choices.into_iter().next() else { continue };

            for call in choice.delta.tool_calls {
                match native_tool_calls.iter_mut().find(|(idx, ..)| *idx == call.index) {
                    Some(entry) => {
                        if let Some(name) = call.function.name {
                            entry.2.push_str(&name);
                        }
                        if let Some(args) = call.function.arguments {
                            entry.3.push_str(&args);
                        }
                    }
                    None => native_tool_calls.push((
                        call.index,
                        call.id.unwrap_or_default(),
                        call.function.name.unwrap_or_default(),
                        call.function.arguments.unwrap_or_default(),
                    )),
                }
            }

            if let Some(r) = choice.delta.reasoning_content {
                reasoning.push_str(&r);
                self.emit_delta_fragment(tx, Message::assistant_reasoning(&r)).await;
            }

            if let Some(c) = choice.delta.content {
                if request.custom_tool_call {
                    for op in parser.parse(&c) {
                        match op.tag {
                            DeltaTag::Think => {
                                reasoning.push_str(&op.delta);
                                self.emit_delta_fragment(tx, Message::assistant_reasoning(&op.delta)).await;
                            }
                            DeltaTag::ToolCall => tool_call_buffer.push_str(&op.delta),
                            DeltaTag::Content => {
                                content.push_str(&op.delta);
                                self.emit_delta_fragment(tx, Message::assistant_content(&op.delta)).await;
                            }
                        }
                    }
                } else {
                    content.push_str(&c);
                    self.emit_delta_fragment(tx, Message::assistant_content(&c)).await;
                }
            }
        }

        let mut tool_calls: Vec<ToolCall> = native_tool_calls
            .into_iter()
            .map(|(_, id, name, arguments)| ToolCall {
                id,
                name,
                arguments: serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null),
            })
            .collect();

        for line in tool_call_buffer.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Malformed lines are skipped, not fatal — spec.md §7
            // "stream-decode-error".
            let Ok(parsed) = serde_json::from_str::<serde_json::Value>(line) else { continue };
            let name = parsed.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let arguments = parsed.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
            tool_calls.push(ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                arguments,
            });
        }

        let mut message = Message::assistant();
        if !content.is_empty() {
            message.content = Some(content);
        }
        if !reasoning.is_empty() {
            message.reasoning = Some(reasoning);
        }
        message.tool_calls = tool_calls;

        tx.send(AgentEvent::Delta { message: message.clone() }).await.ok();
        tx.send(AgentEvent::Eos).await.ok();

        self.transcript.push(message.clone());
        Ok(message)
    }

    async fn emit_delta_fragment(&self, tx: &mpsc::Sender<AgentEvent>, message: Message) {
        tx.send(AgentEvent::Delta { message }).await.ok();
    }

    async fn emit_complete(&mut self, tx: &mpsc::Sender<AgentEvent>, message: Message) -> Result<(), BoxError> {
        tx.send(AgentEvent::Bos { role: message.role }).await.ok();
        tx.send(AgentEvent::Delta { message: message.clone() }).await.ok();
        tx.send(AgentEvent::Eos).await.ok();
        self.transcript.push(message);
        Ok(())
    }

    /// Builds the OpenAI-compatible wire form of the transcript, injecting a
    /// system-role follow-up containing the selected-tools/resources context
    /// immediately after the last user message (not after every user
    /// message).
    fn build_wire_messages(&self, request: &AgentRequest, _executor: &ToolExecutor, all_tool_names: &[String]) -> Vec<serde_json::Value> {
        let last_user_idx = self.transcript.iter().rposition(|m| matches!(m.role, Role::User));

        let mut wire = Vec::with_capacity(self.transcript.len() + 1);
        for (idx, message) in self.transcript.iter().enumerate() {
            wire.push(message_to_wire(message));
            if Some(idx) == last_user_idx {
                let attrs = message.attrs.clone().unwrap_or_default();
                let context = query_context::parse_context(
                    &attrs.tools,
                    &attrs.tools.iter().flat_map(|t| t.visible_resources.clone()).collect::<Vec<_>>(),
                    &attrs.related_resources,
                    all_tool_names,
                );
                wire.push(serde_json::json!({"role": "system", "content": context}));
            }
        }
        wire
    }

    async fn build_tool_executor(&self, request: &AgentRequest) -> Result<ToolExecutor, BoxError> {
        let mut executor = ToolExecutor::new();

        let selected_names: std::collections::HashSet<&str> =
            request.tools.iter().map(|t| t.name.as_str()).collect();

        let active_search: Vec<Arc<dyn crate::retriever::SearchRetriever>> = self
            .search_retrievers
            .iter()
            .filter(|(name, _)| selected_names.contains(name.as_str()))
            .map(|(_, r)| r.clone())
            .collect();

        if request.merge_search && active_search.len() > 1 {
            let reranker = self.reranker.clone();
            let retrievers = active_search.clone();
            let schema = serde_json::json!({
                "type": "function",
                "function": {"name": "search", "description": "Search across every selected source.", "parameters": {"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}}
            });
            executor.register(crate::tool_executor::ToolExecutorConfig {
                name: "search".to_string(),
                schema,
                kind: crate::tool_executor::ToolKind::Search(Arc::new(MergedSearchRetriever { reranker, retrievers })),
            });
        } else {
            for retriever in &active_search {
                let schema = retriever.schema();
                let name = retriever.name().to_string();
                let wrapped: Arc<dyn crate::retriever::SearchRetriever> =
                    Arc::new(RerankedRetriever { inner: retriever.clone(), reranker: self.reranker.clone() });
                executor.register(crate::tool_executor::ToolExecutorConfig {
                    name,
                    schema,
                    kind: crate::tool_executor::ToolKind::Search(wrapped),
                });
            }
        }

        for (name, handler) in &self.resource_handlers {
            if !selected_names.contains(name.as_str()) && !selected_names.contains(DEFAULT_TOOL_NAME) {
                continue;
            }
            executor.register(crate::tool_executor::ToolExecutorConfig {
                name: name.clone(),
                schema: handler.schema(),
                kind: crate::tool_executor::ToolKind::Resource(handler.clone()),
            });
        }

        Ok(executor)
    }

    /// If `private_search` has no explicit resources chosen, pre-execute it
    /// with the query so the LLM's first-turn context already carries
    /// `related_resources` (biases it toward relevant documents without an
    /// extra round-trip later).
    async fn discover_related_resources(&self, request: &AgentRequest, executor: &ToolExecutor) -> Result<Vec<ResourceRef>, BoxError> {
        let wants_private_search = request
            .tools
            .iter()
            .find(|t| t.name == DEFAULT_TOOL_NAME)
            .map(|t| t.visible_resources.is_empty())
            .unwrap_or(false);

        if !wants_private_search || !executor.has(DEFAULT_TOOL_NAME) {
            return Ok(Vec::new());
        }

        let call = ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            name: DEFAULT_TOOL_NAME.to_string(),
            arguments: serde_json::json!({"query": request.query}),
        };
        let mut probe = Message::assistant();
        probe.tool_calls = vec![call];

        let mut scratch_registry = CitationRegistry::new();
        let tool_messages = executor.execute(&probe, &mut scratch_registry).await?;

        let mut related = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for message in &tool_messages {
            if let Some(attrs) = &message.attrs {
                for citation in &attrs.citations {
                    if seen.insert(citation.link.clone()) {
                        related.push(ResourceRef {
                            resource_id: citation.link.clone(),
                            is_folder: false,
                        });
                    }
                }
            }
        }
        Ok(related)
    }
}

/// Wraps a single retriever with a rerank pass, used when `merge_search` is
/// off and each search tool is independently ranked.
struct RerankedRetriever {
    inner: Arc<dyn crate::retriever::SearchRetriever>,
    reranker: Arc<crate::reranker::Reranker>,
}

#[async_trait::async_trait]
impl crate::retriever::SearchRetriever for RerankedRetriever {
    fn schema(&self) -> serde_json::Value {
        self.inner.schema()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, query: &str) -> Result<Vec<crate::model::Retrieval>, crate::error::RetrieverError> {
        let retrievals = self.inner.search(query).await?;
        self.reranker.rerank(query, retrievals).await
    }
}

/// Collapses N retrievers under one synthetic `search` tool, fanning out in
/// parallel via the reranker's `merge_search`.
struct MergedSearchRetriever {
    reranker: Arc<crate::reranker::Reranker>,
    retrievers: Vec<Arc<dyn crate::retriever::SearchRetriever>>,
}

#[async_trait::async_trait]
impl crate::retriever::SearchRetriever for MergedSearchRetriever {
    fn schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "function", "function": {"name": "search", "parameters": {"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}}})
    }

    fn name(&self) -> &str {
        "search"
    }

    async fn search(&self, query: &str) -> Result<Vec<crate::model::Retrieval>, crate::error::RetrieverError> {
        self.reranker.merge_search(query, &self.retrievers).await
    }
}

fn synth_private_search_call(query: &str) -> Message {
    let mut message = Message::assistant();
    message.tool_calls = vec![ToolCall {
        id: uuid::Uuid::new_v4().to_string(),
        name: DEFAULT_TOOL_NAME.to_string(),
        arguments: serde_json::json!({"query": query}),
    }];
    message
}

fn render_system_prompt(request: &AgentRequest, tool_names: &[String]) -> String {
    format!(
        "You are a retrieval-augmented assistant (lang={}). Available tools: {}.{}",
        request.lang,
        tool_names.join(", "),
        if request.custom_tool_call {
            " Emit tool calls as <tool_call>{\"name\":...,\"arguments\":...}</tool_call> inline in your response."
        } else {
            ""
        }
    )
}

fn message_to_wire(message: &Message) -> serde_json::Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut wire = serde_json::json!({"role": role});
    if let Some(content) = &message.content {
        wire["content"] = serde_json::Value::String(content.clone());
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        wire["tool_call_id"] = serde_json::Value::String(tool_call_id.clone());
    }
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = serde_json::json!(message
            .tool_calls
            .iter()
            .map(|c| serde_json::json!({
                "id": c.id,
                "type": "function",
                "function": {"name": c.name, "arguments": serde_json::to_string(&c.arguments).unwrap_or_default()},
            }))
            .collect::<Vec<_>>());
    }
    wire
}

impl Message {
    fn assistant_content(fragment: &str) -> Self {
        let mut m = Message::assistant();
        m.content = Some(fragment.to_string());
        m
    }

    fn assistant_reasoning(fragment: &str) -> Self {
        let mut m = Message::assistant();
        m.reasoning = Some(fragment.to_string());
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_private_search_requires_exactly_system_and_user_messages() {
        let request = AgentRequest {
            conversation_id: "c1".into(),
            query: "hi".into(),
            tools: vec![SelectedTool { name: DEFAULT_TOOL_NAME.into(), namespace_id: None, visible_resources: vec![] }],
            enable_thinking: false,
            merge_search: false,
            custom_tool_call: false,
            lang: "en".into(),
            force_private_search: ForcePrivateSearch::Auto,
            trace_headers: std::collections::HashMap::new(),
        };
        let mut executor = ToolExecutor::new();
        executor.register(crate::tool_executor::ToolExecutorConfig {
            name: DEFAULT_TOOL_NAME.into(),
            schema: serde_json::json!({}),
            kind: crate::tool_executor::ToolKind::Search(Arc::new(NoOpRetriever)),
        });

        let mut agent = AgentLoop {
            transcript: vec![Message::system("sys"), Message::user("hi")],
            registry: CitationRegistry::new(),
            chat_client: Arc::new(NoOpChatClient),
            search_retrievers: vec![],
            resource_handlers: vec![],
            reranker: Arc::new(crate::reranker::Reranker::passthrough()),
        };
        assert!(agent.should_force_private_search(&request, &executor));

        agent.transcript.push(Message::assistant());
        assert!(!agent.should_force_private_search(&request, &executor));
    }

    struct NoOpRetriever;
    #[async_trait::async_trait]
    impl crate::retriever::SearchRetriever for NoOpRetriever {
        fn schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn name(&self) -> &str {
            DEFAULT_TOOL_NAME
        }
        async fn search(&self, _query: &str) -> Result<Vec<crate::model::Retrieval>, crate::error::RetrieverError> {
            Ok(vec![])
        }
    }

    struct NoOpChatClient;
    #[async_trait::async_trait]
    impl ChatClient for NoOpChatClient {
        async fn send_message_stream(
            &self,
            _request: ChatRequest,
            _extra_headers: Vec<(String, String)>,
        ) -> Result<super::super::llm_client::ChatStream, BoxError> {
            Ok(Box::pin(futures_util::stream::empty()))
        }
        fn model_name(&self) -> &str {
            "noop"
        }
    }
}
