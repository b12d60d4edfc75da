//! Renders the XML-tag side-channel the agent loop injects as a system-role
//! follow-up after the triggering user message: which tools are selected
//! and which resources are already known or suggested.
//!
//! This is the concrete mechanism spec.md describes abstractly as "serialised
//! as XML tags" for the LLM's fresh-per-turn context.

use serde_json::json;

use crate::model::{ResourceRef, SelectedTool};

/// Resource tools auto-added to the selected set whenever `private_search`
/// is selected, so the LLM can follow up on a search hit by id.
const RESOURCE_TOOLS: &[&str] = &["get_resources", "get_children", "get_parent", "filter_by_time", "filter_by_tag"];

/// Renders `<selected_private_resources>`/`<system_suggested_private_resources>`
/// blocks: explicitly chosen resources vs. ones the loop discovered on the
/// caller's behalf via `discover_related_resources`.
pub fn render_selected_resources(selected: &[ResourceRef], suggested: &[ResourceRef]) -> String {
    let mut out = String::new();
    if !selected.is_empty() {
        out.push_str(&format!(
            "<selected_private_resources>{}</selected_private_resources>",
            serde_json::to_string(selected).unwrap_or_default()
        ));
    }
    if !suggested.is_empty() {
        out.push_str(&format!(
            "<system_suggested_private_resources>{}</system_suggested_private_resources>",
            serde_json::to_string(suggested).unwrap_or_default()
        ));
    }
    out
}

/// Renders `<selected_tools>{"selected":[...],"disabled":[...]}</selected_tools>`,
/// auto-adding the resource-handler tools whenever `private_search` was
/// selected by the caller.
pub fn render_selected_tools(selected: &[SelectedTool], all_tool_names: &[String]) -> String {
    let mut selected_names: Vec<String> = selected.iter().map(|t| t.name.clone()).collect();
    if selected_names.iter().any(|n| n == "private_search") {
        for name in RESOURCE_TOOLS {
            if !selected_names.iter().any(|n| n == name) {
                selected_names.push(name.to_string());
            }
        }
    }
    let disabled: Vec<&String> = all_tool_names
        .iter()
        .filter(|n| !selected_names.contains(n))
        .collect();

    format!(
        "<selected_tools>{}</selected_tools>",
        json!({"selected": selected_names, "disabled": disabled})
    )
}

fn remove_continuous_break_lines(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
}

/// Renders the selected-resources/selected-tools blocks for injection as a
/// system-role follow-up after the triggering user message.
pub fn parse_context(
    selected: &[SelectedTool],
    selected_resources: &[ResourceRef],
    suggested_resources: &[ResourceRef],
    all_tool_names: &[String],
) -> String {
    let mut parts = vec![render_selected_resources(selected_resources, suggested_resources)];
    parts.push(render_selected_tools(selected, all_tool_names));
    remove_continuous_break_lines(&parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_tools_auto_adds_resource_tools_for_private_search() {
        let selected = vec![SelectedTool {
            name: "private_search".into(),
            namespace_id: None,
            visible_resources: vec![],
        }];
        let rendered = render_selected_tools(&selected, &["private_search".to_string(), "web_search".to_string()]);
        assert!(rendered.contains("get_resources"));
        assert!(rendered.contains("web_search"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(remove_continuous_break_lines("a\n\n  b\tc"), "a b c");
    }
}
