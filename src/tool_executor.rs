//! Tool Executor: dispatches an assistant message's tool-calls to their
//! registered handlers and renders the results back into tool messages.
//!
//! Dispatch is a tagged union (a [`ToolKind`] enum) rather than a
//! string-prefix/suffix check at runtime — the redesign the source's
//! dynamic dispatch calls for. The name-suffix rule (`name.ends_with("search")`)
//! survives only as a debug assertion in [`ToolExecutor::register`], not as
//! the dispatch path itself.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::citation_registry::CitationRegistry;
use crate::error::{BoxError, UnknownFunction};
use crate::model::{Message, MessageAttrs, Retrieval, ResourceToolResult};
use crate::resource_handler::ResourceHandler;
use crate::retriever::SearchRetriever;

/// Which kind of handler a registered tool wraps. The variant tag *is* the
/// classification used for result wrapping — the legacy "name ends with
/// search" rule is checked only as a debug assertion at registration time.
pub enum ToolKind {
    Search(Arc<dyn SearchRetriever>),
    Resource(Arc<dyn ResourceHandler>),
}

/// One registered tool: its OpenAI-compatible function schema plus the
/// handler that executes it.
pub struct ToolExecutorConfig {
    pub name: String,
    pub schema: Value,
    pub kind: ToolKind,
}

/// Handles every tool-call in an assistant message, in declaration order,
/// against a fixed set of registered tools for this turn.
pub struct ToolExecutor {
    tools: HashMap<String, ToolExecutorConfig>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, config: ToolExecutorConfig) {
        debug_assert!(
            matches!(config.kind, ToolKind::Search(_)) == config.name.ends_with("search")
                || matches!(config.kind, ToolKind::Resource(_)),
            "tool `{}` kind disagrees with the legacy name-suffix classifier",
            config.name
        );
        self.tools.insert(config.name.clone(), config);
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Executes every tool-call in `assistant_message` against the registry,
    /// returning one tool [`Message`] per call in the same order. Both
    /// search-tool and resource-tool results number their citations through
    /// the registry: a resource already cited earlier in the conversation
    /// keeps its id, a new one gets the next free id. For an all-new batch
    /// this produces the same contiguous run a purely positional counter
    /// would (`current_cite_count + 1, + 2, ...`); the registry additionally
    /// gets this right when a retrieval repeats a resource a prior turn
    /// already cited.
    pub async fn execute(
        &self,
        assistant_message: &Message,
        registry: &mut CitationRegistry,
    ) -> Result<Vec<Message>, BoxError> {
        let mut results = Vec::with_capacity(assistant_message.tool_calls.len());

        for call in &assistant_message.tool_calls {
            let config = self
                .tools
                .get(&call.name)
                .ok_or_else(|| UnknownFunction(call.name.clone()))?;

            match &config.kind {
                ToolKind::Search(retriever) => {
                    let query = call
                        .arguments
                        .get("query")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let mut retrievals = retriever.search(query).await?;
                    retrievals.sort_by(|a, b| a.cmp_key().partial_cmp(&b.cmp_key()).unwrap_or(std::cmp::Ordering::Equal));

                    let (content, citations) = render_retrievals(&retrievals, registry, &config.name);

                    let mut message = Message::tool(call.id.clone(), content);
                    message.attrs = Some(MessageAttrs {
                        citations,
                        ..Default::default()
                    });
                    results.push(message);
                }
                ToolKind::Resource(handler) => {
                    let result = handler.call(call.arguments.clone()).await?;
                    let (content, citations) = render_resource_result(&result, registry);
                    let mut message = Message::tool(call.id.clone(), content);
                    message.attrs = Some(MessageAttrs {
                        citations,
                        ..Default::default()
                    });
                    results.push(message);
                }
            }
        }

        Ok(results)
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn render_retrievals(
    retrievals: &[Retrieval],
    registry: &mut CitationRegistry,
    tool_name: &str,
) -> (String, Vec<crate::model::Citation>) {
    let mut cites = Vec::with_capacity(retrievals.len());
    let mut citations = Vec::with_capacity(retrievals.len());

    for retrieval in retrievals {
        let cite_id = registry.register(retrieval.identity_resource_id());
        cites.push(retrieval.render_cite(cite_id));
        citations.push(retrieval.to_citation(cite_id, tool_name));
    }

    let content = format!("<retrievals>{}</retrievals>", cites.join(""));
    (content, citations)
}

fn render_resource_result(
    result: &ResourceToolResult,
    registry: &mut CitationRegistry,
) -> (String, Vec<crate::model::Citation>) {
    let mut citations = Vec::new();
    let mut items = Vec::new();

    for info in result.data.iter() {
        let cite_id = registry.register(info.resource_id.clone());
        let mut item = serde_json::json!({
            "cite_id": cite_id,
            "resource_type": info.resource_type,
            "name": info.name,
        });
        if result.metadata_only {
            if let Some(summary) = &info.summary {
                item["summary"] = Value::String(summary.clone());
            }
        }
        items.push(item);
        citations.push(crate::model::Citation {
            title: info.name.clone(),
            snippet: info.summary.clone(),
            link: info.resource_id.clone(),
            updated_at: None,
            source: "resource".to_string(),
            id: cite_id,
        });
    }

    let content = serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string());
    (content, citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceChunkRetrieval, Score, WebRetrieval};

    fn chunk(resource_id: &str, start: usize, rerank: Option<f32>) -> Retrieval {
        Retrieval::Chunk(ResourceChunkRetrieval {
            resource_id: resource_id.into(),
            folder_id: None,
            start_index: start,
            end_index: start + 10,
            text: "text".into(),
            title: "title".into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            score: Score { recall: 1.0, rerank },
        })
    }

    fn web(url: &str, rerank: Option<f32>) -> Retrieval {
        Retrieval::Web(WebRetrieval {
            url: url.into(),
            title: "title".into(),
            snippet: "snippet".into(),
            publish_date: None,
            score: Score { recall: 1.0, rerank },
        })
    }

    #[test]
    fn sort_key_clusters_chunks_by_resource_then_web_by_rerank() {
        let mut retrievals = vec![
            web("u2", Some(0.4)),
            chunk("resA", 10, None),
            web("u1", Some(0.9)),
            chunk("resA", 0, None),
        ];
        retrievals.sort_by(|a, b| a.cmp_key().partial_cmp(&b.cmp_key()).unwrap());

        match &retrievals[0] {
            Retrieval::Chunk(c) => assert_eq!(c.start_index, 0),
            _ => panic!("expected chunk first"),
        }
        match &retrievals[1] {
            Retrieval::Chunk(c) => assert_eq!(c.start_index, 10),
            _ => panic!("expected chunk second"),
        }
        match &retrievals[2] {
            Retrieval::Web(w) => assert_eq!(w.url, "u1"),
            _ => panic!("expected higher-rerank web third"),
        }
    }

    #[test]
    fn sort_applied_twice_is_idempotent() {
        let mut once = vec![web("u2", Some(0.4)), chunk("resA", 10, None), chunk("resA", 0, None)];
        once.sort_by(|a, b| a.cmp_key().partial_cmp(&b.cmp_key()).unwrap());
        let mut twice = once.clone();
        twice.sort_by(|a, b| a.cmp_key().partial_cmp(&b.cmp_key()).unwrap());
        assert_eq!(
            once.iter().map(Retrieval::identity).collect::<Vec<_>>(),
            twice.iter().map(Retrieval::identity).collect::<Vec<_>>()
        );
    }

    #[test]
    fn new_resources_get_a_contiguous_id_run_starting_after_existing_citations() {
        let mut registry = CitationRegistry::new();
        registry.register_with_id("resX", 1);
        registry.register_with_id("resY", 2);
        registry.register_with_id("resZ", 3);

        let retrievals = vec![chunk("resA", 0, None), chunk("resB", 0, None)];
        let (_, citations) = render_retrievals(&retrievals, &mut registry, "private_search");
        assert_eq!(citations[0].id, 4);
        assert_eq!(citations[1].id, 5);
    }

    #[test]
    fn a_resource_cited_on_a_prior_turn_keeps_its_id_on_reappearance() {
        let mut registry = CitationRegistry::new();
        registry.register_with_id("resA", 7);

        let retrievals = vec![chunk("resB", 0, None), chunk("resA", 0, None)];
        let (_, citations) = render_retrievals(&retrievals, &mut registry, "private_search");
        assert_eq!(citations[0].link, "resB");
        assert_eq!(citations[0].id, 8);
        assert_eq!(citations[1].link, "resA");
        assert_eq!(citations[1].id, 7);
    }

    #[test]
    fn two_chunks_from_the_same_resource_in_one_batch_share_a_citation_id() {
        let mut registry = CitationRegistry::new();
        let retrievals = vec![chunk("resA", 0, None), chunk("resA", 10, None)];
        let (_, citations) = render_retrievals(&retrievals, &mut registry, "private_search");
        assert_eq!(citations[0].id, citations[1].id);
    }
}
