//! [`ResourceHandler`]: the consumed interface behind `get_resources`,
//! `get_children`, `get_parent`, `filter_by_time`, `filter_by_tag`-style
//! tools. Schemas are treated verbatim for the LLM tool list; the core only
//! requires the [`ResourceToolResult`] shape back.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RetrieverError;
use crate::model::{ResourceData, ResourceToolResult};

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn schema(&self) -> Value;
    fn name(&self) -> &str;
    async fn call(&self, args: Value) -> Result<ResourceToolResult, RetrieverError>;
}

/// REST client for the resource backend named in the external-interfaces
/// design: `GET /resources?id=…`, `GET /resources/{id}/children?depth=n`,
/// `POST /resources/filter/time`, `POST /resources/filter/tag`. Each call
/// returns a JSON document or array that maps onto [`ResourceInfo`].
pub struct ResourceApiClient {
    client: reqwest::Client,
    base_url: String,
    namespace_id: String,
}

impl ResourceApiClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, namespace_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            namespace_id: namespace_id.into(),
        }
    }

    pub async fn get_resources(&self, id: &str) -> Result<ResourceData, RetrieverError> {
        let url = format!(
            "{}/namespaces/{}/resources",
            self.base_url, self.namespace_id
        );
        self.get_json(&url, &[("id", id)]).await
    }

    pub async fn get_children(&self, id: &str, depth: u32) -> Result<ResourceData, RetrieverError> {
        let url = format!(
            "{}/namespaces/{}/resources/{}/children",
            self.base_url, self.namespace_id, id
        );
        self.get_json(&url, &[("depth", &depth.to_string())]).await
    }

    pub async fn get_parent(&self, id: &str) -> Result<ResourceData, RetrieverError> {
        let url = format!(
            "{}/namespaces/{}/resources/{}/parent",
            self.base_url, self.namespace_id, id
        );
        self.get_json(&url, &[]).await
    }

    /// `time_bound`'s wire format (ISO-8601 vs float timestamp) is opaque to
    /// this crate — forwarded untouched as JSON.
    pub async fn filter_by_time(&self, time_bound: Value) -> Result<ResourceData, RetrieverError> {
        let url = format!("{}/resources/filter/time", self.base_url);
        self.post_json(&url, &time_bound).await
    }

    pub async fn filter_by_tag(&self, tag: &str) -> Result<ResourceData, RetrieverError> {
        let url = format!("{}/resources/filter/tag", self.base_url);
        self.post_json(&url, &serde_json::json!({"tag": tag})).await
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<ResourceData, RetrieverError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| RetrieverError::InvalidResponse(e.to_string()))
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<ResourceData, RetrieverError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RetrieverError::Request(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| RetrieverError::InvalidResponse(e.to_string()))
    }
}

/// Wraps a single [`ResourceApiClient`] method as a named, schema-carrying
/// [`ResourceHandler`] — `get_resources`, `get_children`, `get_parent`,
/// `filter_by_time`, `filter_by_tag` each get one of these at construction.
pub struct ResourceEndpointHandler {
    name: &'static str,
    schema: Value,
    client: std::sync::Arc<ResourceApiClient>,
    endpoint: ResourceEndpoint,
}

enum ResourceEndpoint {
    GetResources,
    GetChildren,
    GetParent,
    FilterByTime,
    FilterByTag,
}

impl ResourceEndpointHandler {
    fn new(name: &'static str, client: std::sync::Arc<ResourceApiClient>, endpoint: ResourceEndpoint, schema: Value) -> Self {
        Self {
            name,
            schema,
            client,
            endpoint,
        }
    }

    pub fn get_resources(client: std::sync::Arc<ResourceApiClient>) -> Self {
        Self::new(
            "get_resources",
            client,
            ResourceEndpoint::GetResources,
            serde_json::json!({"type":"function","function":{"name":"get_resources","description":"Fetch a resource by id.","parameters":{"type":"object","properties":{"id":{"type":"string"}},"required":["id"]}}}),
        )
    }

    pub fn get_children(client: std::sync::Arc<ResourceApiClient>) -> Self {
        Self::new(
            "get_children",
            client,
            ResourceEndpoint::GetChildren,
            serde_json::json!({"type":"function","function":{"name":"get_children","description":"List a folder's children.","parameters":{"type":"object","properties":{"id":{"type":"string"},"depth":{"type":"integer"}},"required":["id"]}}}),
        )
    }

    pub fn get_parent(client: std::sync::Arc<ResourceApiClient>) -> Self {
        Self::new(
            "get_parent",
            client,
            ResourceEndpoint::GetParent,
            serde_json::json!({"type":"function","function":{"name":"get_parent","description":"Fetch a resource's parent folder.","parameters":{"type":"object","properties":{"id":{"type":"string"}},"required":["id"]}}}),
        )
    }

    pub fn filter_by_time(client: std::sync::Arc<ResourceApiClient>) -> Self {
        Self::new(
            "filter_by_time",
            client,
            ResourceEndpoint::FilterByTime,
            serde_json::json!({"type":"function","function":{"name":"filter_by_time","description":"Filter resources by a time bound.","parameters":{"type":"object","properties":{"time_bound":{}},"required":["time_bound"]}}}),
        )
    }

    pub fn filter_by_tag(client: std::sync::Arc<ResourceApiClient>) -> Self {
        Self::new(
            "filter_by_tag",
            client,
            ResourceEndpoint::FilterByTag,
            serde_json::json!({"type":"function","function":{"name":"filter_by_tag","description":"Filter resources by tag.","parameters":{"type":"object","properties":{"tag":{"type":"string"}},"required":["tag"]}}}),
        )
    }
}

#[async_trait]
impl ResourceHandler for ResourceEndpointHandler {
    fn schema(&self) -> Value {
        self.schema.clone()
    }

    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, args: Value) -> Result<ResourceToolResult, RetrieverError> {
        let data = match self.endpoint {
            ResourceEndpoint::GetResources => {
                let id = required_str(&args, "id")?;
                self.client.get_resources(id).await?
            }
            ResourceEndpoint::GetChildren => {
                let id = required_str(&args, "id")?;
                let depth = args.get("depth").and_then(Value::as_u64).unwrap_or(1) as u32;
                self.client.get_children(id, depth).await?
            }
            ResourceEndpoint::GetParent => {
                let id = required_str(&args, "id")?;
                self.client.get_parent(id).await?
            }
            ResourceEndpoint::FilterByTime => {
                let bound = args
                    .get("time_bound")
                    .cloned()
                    .ok_or_else(|| RetrieverError::Request("missing `time_bound`".into()))?;
                self.client.filter_by_time(bound).await?
            }
            ResourceEndpoint::FilterByTag => {
                let tag = required_str(&args, "tag")?;
                self.client.filter_by_tag(tag).await?
            }
        };

        let metadata_only = matches!(data, ResourceData::Many(_));
        Ok(ResourceToolResult { data, metadata_only })
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, RetrieverError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RetrieverError::Request(format!("missing `{key}`")))
}
