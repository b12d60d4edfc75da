//! `POST /chat`: server-sent events framed as `data: <json>\n\n`, each event
//! object carrying `response_type` ∈ {bos, delta, eos, error, done}.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::agent::{AgentEvent, AgentLoop, AgentRequest, ChatClient, ForcePrivateSearch};
use crate::model::{Message, SelectedTool};
use crate::reranker::Reranker;
use crate::resource_handler::ResourceHandler;
use crate::retriever::SearchRetriever;

use super::ServerState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub conversation_id: String,
    pub query: String,
    #[serde(default)]
    pub transcript: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<SelectedTool>,
    #[serde(default)]
    pub enable_thinking: bool,
    #[serde(default)]
    pub merge_search: bool,
    #[serde(default)]
    pub custom_tool_call: bool,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

/// Wires the agent-loop collaborators together per request. A production
/// deployment would construct these once from configuration; this is the
/// seam the HTTP layer drives.
pub struct ChatService {
    pub chat_client: Arc<dyn ChatClient>,
    pub search_retrievers: Vec<(String, Arc<dyn SearchRetriever>)>,
    pub resource_handlers: Vec<(String, Arc<dyn ResourceHandler>)>,
    pub reranker: Arc<Reranker>,
}

pub async fn chat(
    State(state): State<ServerState>,
    Json(body): Json<ChatRequestBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(32);

    let mut agent = AgentLoop::new(
        state.chat.chat_client.clone(),
        state.chat.search_retrievers.clone(),
        state.chat.resource_handlers.clone(),
        state.chat.reranker.clone(),
        body.transcript,
    );

    let request = AgentRequest {
        conversation_id: body.conversation_id,
        query: body.query,
        tools: body.tools,
        enable_thinking: body.enable_thinking,
        merge_search: body.merge_search,
        custom_tool_call: body.custom_tool_call,
        lang: body.lang,
        force_private_search: ForcePrivateSearch::Auto,
        // Driven directly over HTTP, not dispatched through a Task, so there
        // is no `payload.trace_headers` to forward here.
        trace_headers: std::collections::HashMap::new(),
    };

    tokio::spawn(async move {
        agent.run(request, tx).await;
    });

    let events = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: AgentEvent) -> Event {
    let payload = match event {
        AgentEvent::Bos { role } => serde_json::json!({"response_type": "bos", "role": role}),
        AgentEvent::Delta { message } => serde_json::json!({"response_type": "delta", "message": message}),
        AgentEvent::Eos => serde_json::json!({"response_type": "eos"}),
        AgentEvent::Error(message) => serde_json::json!({"response_type": "error", "message": message}),
        AgentEvent::Done => serde_json::json!({"response_type": "done"}),
    };
    Event::default().data(payload.to_string())
}
