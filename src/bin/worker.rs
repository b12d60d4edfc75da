//! Worker pool process: polls the task-queue backend, dispatches each task
//! to its named function handler, enforces timeout + cancellation, and
//! calls back with the result. `--workers N` sets the pool size (default 1).

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use grimoire_core::agent::llm_client::OpenAiCompatibleClient;
use grimoire_core::config::AppConfig;
use grimoire_core::reranker::Reranker;
use grimoire_core::retriever::WebSearchRetriever;
use grimoire_core::worker::{AgentTaskHandler, FunctionHandler, WorkerPool};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grimoire-worker", about = "Worker pool for the agent task queue")]
struct Args {
    /// Number of concurrent workers.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Base URL of the task-queue/callback/object-store backend.
    #[arg(long)]
    backend_url: Option<String>,

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
    config.worker_count = args.workers;
    if let Some(backend_url) = args.backend_url {
        config.backend_base_url = backend_url;
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

    let agent_handler: Arc<dyn FunctionHandler> = Arc::new(AgentTaskHandler {
        chat_client,
        search_retrievers,
        resource_handlers: Vec::new(),
        reranker: Arc::new(Reranker::passthrough()),
    });

    let mut handlers: HashMap<String, Arc<dyn FunctionHandler>> = HashMap::new();
    handlers.insert("agent_run".to_string(), agent_handler);

    tracing::info!(workers = config.worker_count, backend = %config.backend_base_url, "starting worker pool");

    let pool = WorkerPool::spawn(config, handlers);
    pool.join().await;
}
