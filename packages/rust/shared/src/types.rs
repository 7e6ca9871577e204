//! Core domain types for content plans and normalized sources.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContentPlanError, Result};

/// Component types offered to the model when no catalog is available.
pub const GENERIC_COMPONENT_TYPES: &[&str] = &["heading", "text", "image", "list", "quote", "callout"];

/// Component type used whenever a section's type is unknown or missing.
pub const FALLBACK_COMPONENT_TYPE: &str = "text";

// ---------------------------------------------------------------------------
// Normalized sources
// ---------------------------------------------------------------------------

/// Where a piece of processed content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Document,
    Webpage,
}

/// A single `#`-style heading found in a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Metadata attached to every processed source. Empty rather than absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub headings: Vec<Heading>,
    /// Word count, character count, source URL, frontmatter extras, ...
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

impl DocumentMetadata {
    /// Record word, character and line counts for `text`.
    pub fn record_counts(&mut self, text: &str) {
        self.custom_properties
            .insert("word_count".into(), text.split_whitespace().count().to_string());
        self.custom_properties
            .insert("character_count".into(), text.chars().count().to_string());
        self.custom_properties
            .insert("line_count".into(), text.lines().count().to_string());
    }
}

/// The unified result of normalizing a document or a webpage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub id: String,
    /// Filename or URL.
    pub source_identifier: String,
    pub markdown_content: String,
    pub metadata: DocumentMetadata,
    /// Which converter produced this content.
    pub processor_id: String,
    pub processed_at: DateTime<Utc>,
    pub kind: SourceKind,
}

impl ProcessedContent {
    pub fn new(
        kind: SourceKind,
        source_identifier: impl Into<String>,
        processor_id: impl Into<String>,
        markdown_content: String,
        metadata: DocumentMetadata,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            source_identifier: source_identifier.into(),
            markdown_content,
            metadata,
            processor_id: processor_id.into(),
            processed_at: Utc::now(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Lifecycle of a content plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Approved,
    Creating,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Creating => "creating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the plan's section tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSection {
    /// Stable across refinements while the section is conceptually unchanged.
    pub id: String,
    pub title: String,
    pub content: String,
    pub component_type: String,
    /// Unique within a sibling group.
    pub order: u32,
    #[serde(default)]
    pub component_config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub children: Vec<PlanSection>,
}

impl PlanSection {
    /// Depth-first iterator over this section and all of its descendants.
    pub fn walk(&self) -> Vec<&PlanSection> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// A single applied refinement. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementEntry {
    pub instructions: String,
    pub response_summary: String,
    #[serde(default)]
    pub affected_sections: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
}

/// The structured, section-tree representation of content destined for a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPlan {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub target_audience: String,
    /// Minutes.
    pub estimated_read_time: u32,
    pub sections: Vec<PlanSection>,
    pub status: PlanStatus,
    #[serde(default)]
    pub refinement_history: Vec<RefinementEntry>,
    #[serde(default)]
    pub source_content_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentPlan {
    /// All sections of the tree, depth-first.
    pub fn all_sections(&self) -> Vec<&PlanSection> {
        self.sections.iter().flat_map(|s| s.walk()).collect()
    }

    /// Draft and approved plans may still be refined.
    pub fn is_refinable(&self) -> bool {
        matches!(self.status, PlanStatus::Draft | PlanStatus::Approved)
    }

    /// `draft` → `approved`.
    pub fn approve(self) -> Result<Self> {
        self.transition(&[PlanStatus::Draft], PlanStatus::Approved, "approve")
    }

    /// `approved` → `creating`.
    pub fn begin_creating(self) -> Result<Self> {
        self.transition(&[PlanStatus::Approved], PlanStatus::Creating, "start creating")
    }

    /// `creating` → `completed`.
    pub fn complete(self) -> Result<Self> {
        self.transition(&[PlanStatus::Creating], PlanStatus::Completed, "complete")
    }

    /// `creating` → `failed`.
    pub fn fail(self) -> Result<Self> {
        self.transition(&[PlanStatus::Creating], PlanStatus::Failed, "fail")
    }

    fn transition(self, allowed: &[PlanStatus], to: PlanStatus, action: &str) -> Result<Self> {
        if !allowed.contains(&self.status) {
            return Err(ContentPlanError::InvalidStatusTransition {
                from: self.status,
                action: action.to_string(),
            });
        }
        Ok(Self {
            status: to,
            updated_at: Utc::now(),
            ..self
        })
    }
}

// ---------------------------------------------------------------------------
// Catalog, templates, mapper output
// ---------------------------------------------------------------------------

/// An entry of the external component catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentCatalogEntry {
    pub component_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prop_names: Vec<String>,
}

/// One component position in an analyzed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub position: usize,
    pub component_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub has_text_inputs: bool,
    #[serde(default)]
    pub text_fields: Vec<String>,
}

/// The slot structure of an existing page template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAnalysis {
    pub template_id: String,
    pub total_components: usize,
    pub fillable_component_count: usize,
    pub structure: Vec<TemplateSlot>,
}

impl TemplateAnalysis {
    /// Slots that carry text inputs, in template order.
    pub fn fillable_slots(&self) -> impl Iterator<Item = &TemplateSlot> {
        self.structure.iter().filter(|s| s.has_text_inputs)
    }

    /// Whether `plan` has exactly one top-level section per fillable slot.
    pub fn conforms(&self, plan: &ContentPlan) -> bool {
        plan.sections.len() == self.fillable_component_count
    }
}

/// A positioned component ready for a page builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub uuid: String,
    pub component_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Position among siblings.
    pub position: usize,
    pub inputs: serde_json::Map<String, serde_json::Value>,
    /// The plan section this component was built from.
    pub section_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, children: Vec<PlanSection>) -> PlanSection {
        PlanSection {
            id: id.into(),
            title: id.to_uppercase(),
            content: String::new(),
            component_type: "text".into(),
            order: 0,
            component_config: serde_json::Map::new(),
            children,
        }
    }

    fn plan(status: PlanStatus) -> ContentPlan {
        ContentPlan {
            id: "plan-1".into(),
            title: "Plan".into(),
            summary: "Summary".into(),
            target_audience: "Everyone".into(),
            estimated_read_time: 3,
            sections: vec![section("a", vec![section("a1", vec![])]), section("b", vec![])],
            status,
            refinement_history: vec![],
            source_content_ids: BTreeSet::new(),
            template_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn all_sections_is_depth_first() {
        let p = plan(PlanStatus::Draft);
        let ids: Vec<&str> = p
            .all_sections()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "a1", "b"]);
    }

    #[test]
    fn lifecycle_happy_path() {
        let p = plan(PlanStatus::Draft)
            .approve()
            .and_then(ContentPlan::begin_creating)
            .and_then(ContentPlan::complete)
            .expect("valid transitions");
        assert_eq!(p.status, PlanStatus::Completed);
    }

    #[test]
    fn creating_requires_approval() {
        let err = plan(PlanStatus::Draft).begin_creating().unwrap_err();
        assert!(matches!(
            err,
            ContentPlanError::InvalidStatusTransition {
                from: PlanStatus::Draft,
                ..
            }
        ));
    }

    #[test]
    fn refinable_only_before_creating() {
        assert!(plan(PlanStatus::Draft).is_refinable());
        assert!(plan(PlanStatus::Approved).is_refinable());
        assert!(!plan(PlanStatus::Creating).is_refinable());
        assert!(!plan(PlanStatus::Failed).is_refinable());
    }

    #[test]
    fn plan_serialization_uses_snake_case_status() {
        let json = serde_json::to_string(&plan(PlanStatus::Approved)).expect("serialize");
        assert!(json.contains(r#""status":"approved""#));
        let parsed: ContentPlan = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.sections[0].children.len(), 1);
    }

    #[test]
    fn metadata_defaults_to_empty() {
        let meta: DocumentMetadata = serde_json::from_str("{}").expect("deserialize");
        assert!(meta.title.is_none());
        assert!(meta.headings.is_empty());
        assert!(meta.custom_properties.is_empty());
    }

    #[test]
    fn record_counts_counts_words_and_chars() {
        let mut meta = DocumentMetadata::default();
        meta.record_counts("héllo world\nsecond line");
        assert_eq!(meta.custom_properties["word_count"], "4");
        assert_eq!(meta.custom_properties["character_count"], "23");
        assert_eq!(meta.custom_properties["line_count"], "2");
    }
}
