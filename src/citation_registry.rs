//! Citation Registry: bijective resource-id ↔ citation-id maps for one
//! conversation.
//!
//! Owned by the agent-loop instance for the duration of a turn; no global
//! state, no cross-conversation sharing (per the mixed-ownership design
//! note: the registry is mutated by the tool executor and read by the
//! message formatter, so it's passed by reference into that scope rather
//! than stashed anywhere static).

use std::collections::HashMap;

use crate::error::UnknownCiteId;
use crate::model::Message;

/// Maintains `resource_id -> citation_id` and its inverse within a single
/// conversation, plus a monotonically increasing counter starting at 1.
#[derive(Debug, Default)]
pub struct CitationRegistry {
    cite_to_resource: HashMap<u64, String>,
    resource_to_cite: HashMap<String, u64>,
    next_cite_id: u64,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self {
            cite_to_resource: HashMap::new(),
            resource_to_cite: HashMap::new(),
            next_cite_id: 1,
        }
    }

    /// Rebuilds registry state by walking every message's `attrs.citations`
    /// in the supplied transcript, regardless of which tool produced them.
    /// Essential for multi-turn correctness: the LLM refers to prior
    /// documents by cite-id and resolution must be stable across turns.
    pub fn rehydrate(&mut self, transcript: &[Message]) {
        for message in transcript {
            if let Some(attrs) = &message.attrs {
                for citation in &attrs.citations {
                    self.register_with_id(citation.link.clone(), citation.id);
                }
            }
        }
    }

    /// Returns the existing citation id for `resource_id` if already seen,
    /// else allocates the next counter value.
    pub fn register(&mut self, resource_id: impl Into<String>) -> u64 {
        let resource_id = resource_id.into();
        if let Some(id) = self.resource_to_cite.get(&resource_id) {
            return *id;
        }
        let id = self.next_cite_id;
        self.next_cite_id += 1;
        self.resource_to_cite.insert(resource_id.clone(), id);
        self.cite_to_resource.insert(id, resource_id);
        id
    }

    /// Used when rebuilding state from historical messages: registers
    /// `resource_id` under the exact `citation_id` given, advancing the
    /// counter past it if needed.
    pub fn register_with_id(&mut self, resource_id: impl Into<String>, citation_id: u64) {
        let resource_id = resource_id.into();
        self.resource_to_cite.insert(resource_id.clone(), citation_id);
        self.cite_to_resource.insert(citation_id, resource_id);
        if citation_id >= self.next_cite_id {
            self.next_cite_id = citation_id + 1;
        }
    }

    pub fn resolve(&self, citation_id: u64) -> Result<&str, UnknownCiteId> {
        self.cite_to_resource
            .get(&citation_id)
            .map(|s| s.as_str())
            .ok_or(UnknownCiteId(citation_id))
    }

    pub fn get(&self, resource_id: &str) -> Option<u64> {
        self.resource_to_cite.get(resource_id).copied()
    }

    pub fn next_id(&self) -> u64 {
        self.next_cite_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Citation, MessageAttrs, Role};

    #[test]
    fn register_same_resource_twice_returns_same_id() {
        let mut registry = CitationRegistry::new();
        let a = registry.register("resA");
        let b = registry.register("resA");
        assert_eq!(a, b);
    }

    #[test]
    fn register_with_id_then_register_allocates_past_it() {
        let mut registry = CitationRegistry::new();
        registry.register_with_id("resA", 7);
        let next = registry.register("resB");
        assert!(next > 7);
        assert_eq!(next, 8);
    }

    #[test]
    fn resolving_unseen_id_is_unknown_cite_id() {
        let registry = CitationRegistry::new();
        assert!(registry.resolve(42).is_err());
    }

    #[test]
    fn rehydrate_walks_every_message_regardless_of_source() {
        let mut message = Message::tool("call1", "<retrievals/>");
        message.attrs = Some(MessageAttrs {
            citations: vec![Citation {
                title: "doc".into(),
                snippet: None,
                link: "resA".into(),
                updated_at: None,
                source: "private_search".into(),
                id: 7,
            }],
            ..Default::default()
        });
        let mut registry = CitationRegistry::new();
        registry.rehydrate(&[Message::user("hi"), message]);
        assert_eq!(registry.get("resA"), Some(7));
        assert_eq!(registry.register("resB"), 8);
        assert!(matches!(Role::User, Role::User));
    }
}
