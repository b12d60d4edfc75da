//! [`SearchRetriever`]: the consumed interface a search tool (private
//! document search, web search) implements. The core only requires the
//! result shape; it never specifies how a retriever finds anything.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RetrieverError;
use crate::model::{Retrieval, Score, WebRetrieval};

#[async_trait]
pub trait SearchRetriever: Send + Sync {
    /// OpenAI-compatible function schema naming this tool (e.g.
    /// `private_search`, `web_search`) and declaring its `query` parameter.
    fn schema(&self) -> Value;
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<Vec<Retrieval>, RetrieverError>;
}

/// One illustrative concrete [`SearchRetriever`]: a web-search backend
/// speaking a SearXNG-style JSON API, reachable over HTTP. Proves the seam
/// compiles end-to-end; the crate does not implement any other search
/// backend (vector index internals are an explicit out-of-scope
/// collaborator).
pub struct WebSearchRetriever {
    client: reqwest::Client,
    base_url: String,
}

impl WebSearchRetriever {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct SearXNGResult {
    url: String,
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    score: f32,
}

#[derive(serde::Deserialize)]
struct SearXNGResponse {
    #[serde(default)]
    results: Vec<SearXNGResult>,
}

#[async_trait]
impl SearchRetriever for WebSearchRetriever {
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": "web_search",
                "description": "Search the public web.",
                "parameters": {
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"],
                },
            },
        })
    }

    fn name(&self) -> &str {
        "web_search"
    }

    async fn search(&self, query: &str) -> Result<Vec<Retrieval>, RetrieverError> {
        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?;

        let parsed: SearXNGResponse = resp
            .json()
            .await
            .map_err(|e| RetrieverError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| {
                Retrieval::Web(WebRetrieval {
                    url: r.url,
                    title: r.title,
                    snippet: r.content,
                    publish_date: r.published_date,
                    score: Score {
                        recall: r.score,
                        rerank: None,
                    },
                })
            })
            .collect())
    }
}
