//! Reranker: dedups a flat retrieval list by identity, optionally submits it
//! to a rerank endpoint, drops below-threshold hits, and truncates to `k`.
//! Passes retrievals through unchanged when no rerank endpoint is
//! configured. Also hosts `merge_search`, which fans out N retrievers'
//! `search()` calls in parallel and reranks the concatenation.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::error::RetrieverError;
use crate::model::Retrieval;
use crate::retriever::SearchRetriever;

/// Client for an external rerank endpoint: `{model, query, documents} ->
/// {results: [{index, relevance_score}]}`. The wire format itself is an
/// out-of-scope external collaborator; this trait is the seam.
#[async_trait::async_trait]
pub trait RerankClient: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RetrieverError>;
}

#[derive(Default)]
pub struct Reranker {
    client: Option<Arc<dyn RerankClient>>,
    threshold: Option<f32>,
    top_k: Option<usize>,
}

impl Reranker {
    pub fn new(client: Option<Arc<dyn RerankClient>>, threshold: Option<f32>, top_k: Option<usize>) -> Self {
        Self {
            client,
            threshold,
            top_k,
        }
    }

    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Dedups by [`Retrieval::identity`] (first occurrence wins), reranks if
    /// a client is configured, drops anything below `threshold`, and
    /// truncates to `top_k`.
    pub async fn rerank(&self, query: &str, retrievals: Vec<Retrieval>) -> Result<Vec<Retrieval>, RetrieverError> {
        let mut seen = HashSet::new();
        let mut deduped: Vec<Retrieval> = retrievals
            .into_iter()
            .filter(|r| seen.insert(r.identity()))
            .collect();

        if let Some(client) = &self.client {
            let documents: Vec<String> = deduped
                .iter()
                .map(|r| match r {
                    Retrieval::Chunk(c) => c.text.clone(),
                    Retrieval::Web(w) => w.snippet.clone(),
                })
                .collect();
            let scores = client.rerank(query, &documents).await?;
            for (retrieval, score) in deduped.iter_mut().zip(scores) {
                retrieval.set_rerank(score);
            }
            if let Some(threshold) = self.threshold {
                deduped.retain(|r| r.score().rerank.unwrap_or(0.0) >= threshold);
            }
            deduped.sort_by(|a, b| {
                b.score()
                    .rerank
                    .unwrap_or(0.0)
                    .partial_cmp(&a.score().rerank.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if let Some(k) = self.top_k {
            deduped.truncate(k);
        }

        Ok(deduped)
    }

    /// Fans out every retriever's `search(query)` concurrently, concatenates
    /// the results, and reranks the merged list.
    pub async fn merge_search(
        &self,
        query: &str,
        retrievers: &[Arc<dyn SearchRetriever>],
    ) -> Result<Vec<Retrieval>, RetrieverError> {
        let futures = retrievers.iter().map(|r| {
            let query = query.to_string();
            async move { r.search(&query).await }
        });
        let results = join_all(futures).await;

        let mut merged = Vec::new();
        for result in results {
            merged.extend(result?);
        }

        self.rerank(query, merged).await
    }
}
