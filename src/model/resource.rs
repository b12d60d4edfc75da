//! Resource handler result types: [`ResourceInfo`], [`ResourceToolResult`].

use serde::{Deserialize, Serialize};

/// A reference to a document or folder, as carried in `attrs.related_resources`
/// and `SelectedTool::visible_resources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_id: String,
    #[serde(default)]
    pub is_folder: bool,
}

/// One record returned by a resource handler (`get_resources`, `get_children`,
/// `get_parent`, `filter_by_time`, `filter_by_tag`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub resource_id: String,
    pub resource_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Either a single resource or a list, matching the two shapes a resource
/// handler's backend can hand back (`get_parent` returns one, `get_children`
/// returns many).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceData {
    One(ResourceInfo),
    Many(Vec<ResourceInfo>),
}

impl ResourceData {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &ResourceInfo> + '_> {
        match self {
            ResourceData::One(info) => Box::new(std::iter::once(info)),
            ResourceData::Many(infos) => Box::new(infos.iter()),
        }
    }
}

/// Result of invoking a resource handler: the records themselves, plus
/// whether the caller only wants metadata (in which case a `summary` field
/// is attached to each record in the rendered tool message, when available).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceToolResult {
    pub data: ResourceData,
    #[serde(default)]
    pub metadata_only: bool,
}
