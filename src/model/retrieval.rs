//! [`Retrieval`]: a single search result, before citation numbering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::citation::Citation;

/// Recall and (once reranked) rerank scores for one retrieval.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Score {
    pub recall: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<f32>,
}

/// A hit against a private document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChunkRetrieval {
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
    pub text: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub score: Score,
}

/// A hit from a web search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRetrieval {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub score: Score,
}

/// Discriminated union of everything a search tool can return. Both variants
/// render to an XML cite block for LLM consumption and to a [`Citation`] for
/// user-facing attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Retrieval {
    Chunk(ResourceChunkRetrieval),
    Web(WebRetrieval),
}

impl Retrieval {
    pub fn score(&self) -> Score {
        match self {
            Retrieval::Chunk(c) => c.score,
            Retrieval::Web(w) => w.score,
        }
    }

    pub fn set_rerank(&mut self, rerank: f32) {
        match self {
            Retrieval::Chunk(c) => c.score.rerank = Some(rerank),
            Retrieval::Web(w) => w.score.rerank = Some(rerank),
        }
    }

    /// Identity used for rerank-stage dedup: chunks are identified by
    /// `(resource_id, start_index)`, web hits by `url`.
    pub fn identity(&self) -> String {
        match self {
            Retrieval::Chunk(c) => format!("chunk:{}:{}", c.resource_id, c.start_index),
            Retrieval::Web(w) => format!("web:{}", w.url),
        }
    }

    /// Sort key used by the tool executor to order search-tool results:
    /// `(kind_rank, resource_id, start_index, -rerank)`. Chunks (kind_rank 0)
    /// from the same resource cluster in document order; web hits
    /// (kind_rank 1) rank by descending rerank score. Compared with
    /// [`Retrieval::cmp_key`] rather than `Ord` since the trailing field is
    /// a float.
    pub fn cmp_key(&self) -> (u8, &str, usize, f32) {
        let neg_rerank = -self.score().rerank.unwrap_or(0.0);
        match self {
            Retrieval::Chunk(c) => (0, c.resource_id.as_str(), c.start_index, neg_rerank),
            Retrieval::Web(_) => (1, "", 0, neg_rerank),
        }
    }

    /// Renders `<cite id="…" source="…">…</cite>` for one retrieval, given
    /// its already-assigned citation id.
    pub fn render_cite(&self, cite_id: u64) -> String {
        match self {
            Retrieval::Chunk(c) => format!(
                "<cite id=\"{}\" source=\"{}\">{}</cite>",
                cite_id, c.resource_id, c.text
            ),
            Retrieval::Web(w) => format!(
                "<cite id=\"{}\" source=\"{}\">{}</cite>",
                cite_id, w.url, w.snippet
            ),
        }
    }

    /// The resource identity used for citation numbering: the same value
    /// that ends up as [`Citation::link`]. Two retrievals sharing this value
    /// (e.g. two chunks from the same document, or the same document cited
    /// again on a later turn) share a citation id.
    pub fn identity_resource_id(&self) -> String {
        match self {
            Retrieval::Chunk(c) => c.resource_id.clone(),
            Retrieval::Web(w) => w.url.clone(),
        }
    }

    /// Builds the user-visible [`Citation`] for this retrieval.
    pub fn to_citation(&self, cite_id: u64, tool_name: &str) -> Citation {
        match self {
            Retrieval::Chunk(c) => Citation {
                title: c.title.clone(),
                snippet: Some(c.text.clone()),
                link: c.resource_id.clone(),
                updated_at: Some(c.updated_at),
                source: tool_name.to_string(),
                id: cite_id,
            },
            Retrieval::Web(w) => Citation {
                title: w.title.clone(),
                snippet: Some(w.snippet.clone()),
                link: w.url.clone(),
                updated_at: w.publish_date,
                source: tool_name.to_string(),
                id: cite_id,
            },
        }
    }
}
