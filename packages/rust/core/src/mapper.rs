//! Flattens a plan's section tree into positioned component descriptors.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use contentplan_shared::{
    ComponentDescriptor, ContentPlan, FALLBACK_COMPONENT_TYPE, GENERIC_COMPONENT_TYPES,
    PlanSection,
};

use crate::catalog::ComponentCatalog;

/// Slot used for children that do not name one.
pub const DEFAULT_SLOT: &str = "content";

/// `component_config` key naming the slot a child goes into.
const SLOT_CONFIG_KEY: &str = "slot";

/// How a component's inputs are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputShape {
    List,
    Heading,
    Generic,
}

impl InputShape {
    fn of(component_id: &str) -> Self {
        let base = component_id
            .rsplit(':')
            .next()
            .unwrap_or(component_id)
            .to_ascii_lowercase();
        if base.contains("list") {
            Self::List
        } else if base.contains("heading") || base == "title" || base == "header" {
            Self::Heading
        } else {
            Self::Generic
        }
    }
}

/// Maps plan sections onto catalog components.
#[derive(Default)]
pub struct ComponentMapper {
    catalog: Option<Arc<dyn ComponentCatalog>>,
}

impl ComponentMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Arc<dyn ComponentCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// One descriptor per section, depth-first.
    pub fn map_plan(&self, plan: &ContentPlan) -> Vec<ComponentDescriptor> {
        let descriptors = self.map_sections(&plan.sections);
        debug!(plan_id = %plan.id, components = descriptors.len(), "plan mapped");
        descriptors
    }

    pub fn map_sections(&self, sections: &[PlanSection]) -> Vec<ComponentDescriptor> {
        let mut out = Vec::new();
        self.visit(sections, None, &mut out);
        out
    }

    fn visit(
        &self,
        sections: &[PlanSection],
        parent_uuid: Option<&str>,
        out: &mut Vec<ComponentDescriptor>,
    ) {
        let mut ordered: Vec<&PlanSection> = sections.iter().collect();
        ordered.sort_by_key(|s| s.order);

        for (position, section) in ordered.into_iter().enumerate() {
            let uuid = Uuid::now_v7().to_string();
            let component_id = self.resolve_component_id(section);
            let slot = parent_uuid.map(|_| {
                section
                    .component_config
                    .get(SLOT_CONFIG_KEY)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_SLOT)
                    .to_string()
            });

            out.push(ComponentDescriptor {
                inputs: build_inputs(section, InputShape::of(&component_id)),
                uuid: uuid.clone(),
                component_id,
                parent_uuid: parent_uuid.map(str::to_string),
                slot,
                position,
                section_id: section.id.clone(),
            });

            self.visit(&section.children, Some(uuid.as_str()), out);
        }
    }

    fn resolve_component_id(&self, section: &PlanSection) -> String {
        let wanted = section.component_type.trim();
        match self.catalog.as_deref().filter(|c| !c.is_empty()) {
            Some(catalog) => {
                if let Some(entry) = catalog.resolve(wanted) {
                    return entry.component_id.clone();
                }
                let fallback = catalog
                    .resolve(FALLBACK_COMPONENT_TYPE)
                    .map_or(FALLBACK_COMPONENT_TYPE, |e| e.component_id.as_str());
                warn!(
                    section = %section.id,
                    component_type = wanted,
                    fallback,
                    "component type not in catalog"
                );
                fallback.to_string()
            }
            None if GENERIC_COMPONENT_TYPES.contains(&wanted) => wanted.to_string(),
            None => {
                warn!(
                    section = %section.id,
                    component_type = wanted,
                    fallback = FALLBACK_COMPONENT_TYPE,
                    "unknown component type"
                );
                FALLBACK_COMPONENT_TYPE.to_string()
            }
        }
    }
}

fn build_inputs(section: &PlanSection, shape: InputShape) -> Map<String, Value> {
    let mut inputs = Map::new();
    let title = section.title.trim();

    match shape {
        InputShape::List => {
            if !title.is_empty() {
                inputs.insert("title".into(), Value::String(title.to_string()));
            }
            let items = parse_list_items(&section.content)
                .into_iter()
                .map(Value::String)
                .collect();
            inputs.insert("items".into(), Value::Array(items));
        }
        InputShape::Heading => {
            inputs.insert("text".into(), Value::String(title.to_string()));
        }
        InputShape::Generic => {
            if !title.is_empty() {
                inputs.insert("title".into(), Value::String(title.to_string()));
            }
            inputs.insert("content".into(), Value::String(section.content.clone()));
        }
    }

    for (key, value) in &section.component_config {
        if key != SLOT_CONFIG_KEY && !inputs.contains_key(key) {
            inputs.insert(key.clone(), value.clone());
        }
    }
    inputs
}

static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+(?:\[[ xX]\]\s+)?").expect("valid regex")
});

/// Split list content into items: one per non-blank line, markers stripped.
pub fn parse_list_items(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use contentplan_shared::ComponentCatalogEntry;

    fn section(id: &str, component_type: &str, title: &str, content: &str) -> PlanSection {
        PlanSection {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            component_type: component_type.into(),
            order: 0,
            component_config: Map::new(),
            children: vec![],
        }
    }

    fn entry(id: &str, name: &str) -> ComponentCatalogEntry {
        ComponentCatalogEntry {
            component_id: id.into(),
            name: name.into(),
            description: String::new(),
            prop_names: vec![],
        }
    }

    #[test]
    fn list_items_strip_markers() {
        assert_eq!(parse_list_items("- a\n- b\n\n1. c"), vec!["a", "b", "c"]);
        assert_eq!(
            parse_list_items("* one\n+ two\n3) three\n- [x] done\nplain"),
            vec!["one", "two", "three", "done", "plain"]
        );
    }

    #[test]
    fn initials_are_not_list_markers() {
        assert_eq!(
            parse_list_items("- A. Smith wrote it\nB) Jones replied"),
            vec!["A. Smith wrote it", "B) Jones replied"]
        );
    }

    #[test]
    fn list_section_maps_items() {
        let mapper = ComponentMapper::new();
        let out = mapper.map_sections(&[section("l", "list", "", "- a\n- b\n\n1. c")]);
        assert_eq!(out[0].component_id, "list");
        assert_eq!(out[0].inputs["items"], serde_json::json!(["a", "b", "c"]));
        assert!(!out[0].inputs.contains_key("content"));
    }

    #[test]
    fn heading_maps_title_only() {
        let out = ComponentMapper::new().map_sections(&[section("h", "heading", "Welcome", "ignored")]);
        assert_eq!(out[0].inputs.len(), 1);
        assert_eq!(out[0].inputs["text"], "Welcome");
    }

    #[test]
    fn untitled_heading_stays_empty() {
        let out = ComponentMapper::new().map_sections(&[section("h", "heading", "  ", "Body line")]);
        assert_eq!(out[0].inputs["text"], "");
    }

    #[test]
    fn generic_maps_title_content_and_config() {
        let mut s = section("t", "callout", "Note", "Body");
        s.component_config.insert("variant".into(), serde_json::json!("warning"));
        s.component_config.insert("title".into(), serde_json::json!("ignored"));
        let out = ComponentMapper::new().map_sections(&[s]);

        assert_eq!(out[0].inputs["title"], "Note");
        assert_eq!(out[0].inputs["content"], "Body");
        assert_eq!(out[0].inputs["variant"], "warning");
    }

    #[test]
    fn depth_first_with_parent_and_slot() {
        let mut first_child = section("c1", "text", "Child one", "x");
        first_child.component_config.insert("slot".into(), serde_json::json!("sidebar"));
        let mut second_child = section("c2", "text", "Child two", "y");
        second_child.order = 1;
        let mut parent = section("p", "text", "Parent", "z");
        parent.children = vec![second_child, first_child];
        let mut last = section("q", "quote", "Quote", "w");
        last.order = 1;

        let out = ComponentMapper::new().map_sections(&[last, parent]);
        let ids: Vec<&str> = out.iter().map(|d| d.section_id.as_str()).collect();
        assert_eq!(ids, vec!["p", "c1", "c2", "q"]);

        assert!(out[0].parent_uuid.is_none() && out[0].slot.is_none());
        assert_eq!(out[1].parent_uuid.as_deref(), Some(out[0].uuid.as_str()));
        assert_eq!(out[1].slot.as_deref(), Some("sidebar"));
        assert!(!out[1].inputs.contains_key("slot"));
        assert_eq!(out[2].slot.as_deref(), Some(DEFAULT_SLOT));
        assert_eq!((out[1].position, out[2].position, out[3].position), (0, 1, 1));

        let uuids: std::collections::HashSet<&str> = out.iter().map(|d| d.uuid.as_str()).collect();
        assert_eq!(uuids.len(), 4);
    }

    #[test]
    fn catalog_resolution_and_fallback() {
        let catalog = StaticCatalog::new(vec![
            entry("sdc:theme:text", "Text"),
            entry("sdc:theme:bullet-list", "Bullet list"),
        ]);
        let mapper = ComponentMapper::with_catalog(Arc::new(catalog));
        let out = mapper.map_sections(&[
            section("a", "sdc:theme:bullet-list", "", "- x"),
            section("b", "Bullet List", "", "- y"),
            section("c", "carousel", "Slides", "z"),
        ]);

        assert_eq!(out[0].component_id, "sdc:theme:bullet-list");
        assert_eq!(out[0].inputs["items"], serde_json::json!(["x"]));
        assert_eq!(out[1].component_id, "sdc:theme:bullet-list");
        assert_eq!(out[2].component_id, "sdc:theme:text");
        assert_eq!(out[2].inputs["content"], "z");
    }

    #[test]
    fn unknown_type_without_catalog_falls_back() {
        let out = ComponentMapper::new().map_sections(&[section("a", "carousel", "", "z")]);
        assert_eq!(out[0].component_id, "text");
        assert!(!out[0].inputs.contains_key("title"));
    }
}
