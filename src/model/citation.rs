//! [`Citation`]: the user-visible record of a retrieval, numbered by the
//! [`crate::citation_registry::CitationRegistry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Which search tool produced this (e.g. `"private_search"`, `"web_search"`).
    pub source: String,
    pub id: u64,
}
