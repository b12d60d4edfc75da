//! HTTP surface process: `POST /chat` (server-sent events) and `GET
//! /health`. Drives the agent loop directly per request rather than going
//! through the task queue — the two exposed surfaces named in the
//! external-interfaces design are independent entry points into the same
//! collaborators the worker binary wires up.

use std::sync::Arc;

use clap::Parser;
use grimoire_core::agent::llm_client::OpenAiCompatibleClient;
use grimoire_core::config::AppConfig;
use grimoire_core::reranker::Reranker;
use grimoire_core::retriever::WebSearchRetriever;
use grimoire_core::server::chat_handler::ChatService;
use grimoire_core::server::{build_router, ServerState};
use grimoire_core::worker::HealthTracker;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grimoire-server", about = "Chat SSE and health HTTP surfaces")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long)]
    addr: Option<String>,

    /// Base URL of the OpenAI-compatible chat completion endpoint.
    #[arg(long, default_value = "http://localhost:11434/v1")]
    llm_url: String,

    /// Model name to request from the chat endpoint.
    #[arg(long, default_value = "default")]
    model: String,

    /// Base URL of a SearXNG-compatible web search backend, if available.
    #[arg(long)]
    web_search_url: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(addr) = args.addr {
        config.bind_addr = addr;
    }

    let http = reqwest::Client::new();
    let chat_client = Arc::new(OpenAiCompatibleClient::new(
        http.clone(),
        args.llm_url,
        std::env::var("GRIMOIRE_LLM_API_KEY").ok(),
        args.model,
    ));

    let mut search_retrievers: Vec<(String, Arc<dyn grimoire_core::retriever::SearchRetriever>)> = Vec::new();
    if let Some(web_search_url) = args.web_search_url {
        let retriever = Arc::new(WebSearchRetriever::new(http.clone(), web_search_url));
        search_retrievers.push(("web_search".to_string(), retriever));
    }

    let state = ServerState {
        health: Arc::new(HealthTracker::new()),
        chat: Arc::new(ChatService {
            chat_client,
            search_retrievers,
            resource_handlers: Vec::new(),
            reranker: Arc::new(Reranker::passthrough()),
        }),
    };

    let router = build_router(state);

    tracing::info!(addr = %config.bind_addr, "starting HTTP surface");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind HTTP listener");
    axum::serve(listener, router).await.expect("server error");
}
