//! Instruction-driven refinement of an existing plan.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use contentplan_shared::{
    ContentPlan, ContentPlanError, PlanSection, PlannerConfig, RefinementEntry, Result,
};

use crate::catalog::ComponentCatalog;
use crate::chat::ChatCompletion;
use crate::parse::parse_response;
use crate::prompts;
use crate::synthesizer::complete_with_retries;

const PREVIEW_ELLIPSIS: &str = "...";

/// Applies free-text instructions to a plan, at most `max_refinements` times.
pub struct PlanRefiner {
    chat: Option<Arc<dyn ChatCompletion>>,
    catalog: Option<Arc<dyn ComponentCatalog>>,
    config: PlannerConfig,
}

impl PlanRefiner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            chat: None,
            catalog: None,
            config,
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatCompletion>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ComponentCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Produce the refined plan. `plan` itself is left untouched.
    #[instrument(skip_all, fields(plan_id = %plan.id, round = plan.refinement_history.len() + 1))]
    pub async fn refine(&self, plan: &ContentPlan, instructions: &str) -> Result<ContentPlan> {
        let max = self.config.max_refinements;
        if plan.refinement_history.len() >= max {
            return Err(ContentPlanError::RefinementLimitExceeded { max });
        }
        if !plan.is_refinable() {
            return Err(ContentPlanError::InvalidStatusTransition {
                from: plan.status,
                action: "refine".into(),
            });
        }
        if instructions.trim().is_empty() {
            return Err(ContentPlanError::validation("refinement instructions are empty"));
        }
        let chat = self.chat.as_deref().ok_or_else(|| ContentPlanError::NoProviderConfigured {
            hint: "no chat-completion provider was supplied".into(),
        })?;

        let minimized = minimize_plan(plan, self.config.section_preview_chars);
        let plan_json = serde_json::to_string_pretty(&minimized)
            .map_err(|e| ContentPlanError::validation(format!("cannot serialize plan: {e}")))?;

        let catalog = self.catalog.as_deref();
        let system = prompts::refinement_system_prompt(catalog);
        let user = prompts::refinement_user_prompt(&plan_json, instructions);
        debug!(plan_json_len = plan_json.len(), "refinement prompt built");

        let parsed = complete_with_retries(chat, &system, &user, self.config.model.as_deref(), |text| {
            parse_response(text, catalog)
        })
        .await?;

        let sections = match parsed.sections {
            Some(new_sections) => {
                let previous: HashMap<&str, &PlanSection> = plan
                    .all_sections()
                    .into_iter()
                    .map(|s| (s.id.as_str(), s))
                    .collect();
                restore_abbreviated(new_sections, &previous, self.config.section_preview_chars)
            }
            None => plan.sections.clone(),
        };

        let affected_sections = match parsed.affected_sections {
            Some(ids) if !ids.is_empty() => ids,
            _ => changed_section_ids(&plan.sections, &sections),
        };

        let entry = RefinementEntry {
            instructions: instructions.trim().to_string(),
            response_summary: parsed
                .refinement_summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Plan updated".to_string()),
            affected_sections,
            timestamp: Utc::now(),
        };

        let mut refinement_history = plan.refinement_history.clone();
        refinement_history.push(entry);

        let refined = ContentPlan {
            title: parsed.title.filter(|t| !t.is_empty()).unwrap_or_else(|| plan.title.clone()),
            summary: parsed
                .summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| plan.summary.clone()),
            target_audience: parsed
                .target_audience
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| plan.target_audience.clone()),
            estimated_read_time: parsed.estimated_read_time.unwrap_or(plan.estimated_read_time),
            sections,
            refinement_history,
            updated_at: Utc::now(),
            ..plan.clone()
        };

        info!(
            sections = refined.sections.len(),
            affected = refined
                .refinement_history
                .last()
                .map_or(0, |e| e.affected_sections.len()),
            "plan refined"
        );
        Ok(refined)
    }
}

// ---------------------------------------------------------------------------
// Minimized plan
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MinimalPlan<'a> {
    title: &'a str,
    summary: &'a str,
    target_audience: &'a str,
    sections: Vec<MinimalSection<'a>>,
}

#[derive(Debug, Serialize)]
struct MinimalSection<'a> {
    id: &'a str,
    title: &'a str,
    content: String,
    component_type: &'a str,
    order: u32,
    #[serde(skip_serializing_if = "Map::is_empty")]
    component_config: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<MinimalSection<'a>>,
}

fn minimize_plan(plan: &ContentPlan, preview_chars: usize) -> MinimalPlan<'_> {
    MinimalPlan {
        title: &plan.title,
        summary: &plan.summary,
        target_audience: &plan.target_audience,
        sections: plan
            .sections
            .iter()
            .map(|s| minimize_section(s, preview_chars))
            .collect(),
    }
}

fn minimize_section(section: &PlanSection, preview_chars: usize) -> MinimalSection<'_> {
    MinimalSection {
        id: &section.id,
        title: &section.title,
        content: preview(&section.content, preview_chars),
        component_type: &section.component_type,
        order: section.order,
        component_config: &section.component_config,
        children: section
            .children
            .iter()
            .map(|c| minimize_section(c, preview_chars))
            .collect(),
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}{PREVIEW_ELLIPSIS}", text[..byte_idx].trim_end()),
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Put back full content for kept sections the model echoed as a preview
/// or left empty.
fn restore_abbreviated(
    sections: Vec<PlanSection>,
    previous: &HashMap<&str, &PlanSection>,
    preview_chars: usize,
) -> Vec<PlanSection> {
    sections
        .into_iter()
        .map(|mut section| {
            if let Some(old) = previous.get(section.id.as_str()) {
                let content = section.content.trim();
                if content.is_empty() || content == preview(&old.content, preview_chars) {
                    section.content = old.content.clone();
                }
                if section.title.is_empty() {
                    section.title = old.title.clone();
                }
            }
            section.children = restore_abbreviated(
                std::mem::take(&mut section.children),
                previous,
                preview_chars,
            );
            section
        })
        .collect()
}

/// Ids added, removed or changed between two section trees.
fn changed_section_ids(before: &[PlanSection], after: &[PlanSection]) -> BTreeSet<String> {
    fn index(sections: &[PlanSection]) -> HashMap<&str, &PlanSection> {
        sections
            .iter()
            .flat_map(|s| s.walk())
            .map(|s| (s.id.as_str(), s))
            .collect()
    }
    let old = index(before);
    let new = index(after);

    let mut changed: BTreeSet<String> = old
        .keys()
        .filter(|id| !new.contains_key(*id))
        .map(|id| id.to_string())
        .collect();
    for (id, section) in &new {
        let differs = match old.get(id) {
            None => true,
            Some(prev) => {
                prev.title != section.title
                    || prev.content != section.content
                    || prev.component_type != section.component_type
                    || prev.component_config != section.component_config
            }
        };
        if differs {
            changed.insert(id.to_string());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::StubChat;
    use contentplan_shared::PlanStatus;

    fn section(id: &str, title: &str, content: &str) -> PlanSection {
        PlanSection {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            component_type: "text".into(),
            order: 0,
            component_config: Map::new(),
            children: vec![],
        }
    }

    fn plan() -> ContentPlan {
        let mut second = section("body", "Details", &"Long body text. ".repeat(40));
        second.order = 1;
        ContentPlan {
            id: "plan-1".into(),
            title: "Original".into(),
            summary: "Original summary".into(),
            target_audience: "Everyone".into(),
            estimated_read_time: 4,
            sections: vec![section("intro", "Intro", "Welcome text"), second],
            status: PlanStatus::Draft,
            refinement_history: vec![],
            source_content_ids: BTreeSet::from(["src-1".to_string()]),
            template_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn config(max_refinements: usize) -> PlannerConfig {
        PlannerConfig {
            max_refinements,
            section_preview_chars: 50,
            ..PlannerConfig::default()
        }
    }

    fn refiner(chat: &Arc<StubChat>, max: usize) -> PlanRefiner {
        PlanRefiner::new(config(max)).with_chat(chat.clone())
    }

    fn history_entry() -> RefinementEntry {
        RefinementEntry {
            instructions: "earlier".into(),
            response_summary: "done".into(),
            affected_sections: BTreeSet::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn limit_reached_makes_no_call() {
        let chat = Arc::new(StubChat::always("{}"));
        let mut at_limit = plan();
        at_limit.refinement_history = vec![history_entry(), history_entry()];

        let err = refiner(&chat, 2).refine(&at_limit, "More").await.unwrap_err();
        assert!(matches!(err, ContentPlanError::RefinementLimitExceeded { max: 2 }));
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn creating_plans_cannot_be_refined() {
        let chat = Arc::new(StubChat::always("{}"));
        let creating = plan().approve().and_then(ContentPlan::begin_creating).unwrap();
        let err = refiner(&chat, 5).refine(&creating, "More").await.unwrap_err();
        assert!(matches!(err, ContentPlanError::InvalidStatusTransition { .. }));
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn refinement_updates_and_appends_history() {
        let reply = r#"{
            "title": "Sharper title",
            "sections": [
                {"id": "intro", "title": "Intro", "content": "Shorter welcome", "component_type": "text", "order": 0},
                {"id": "body", "title": "Details", "content": "", "component_type": "text", "order": 1},
                {"id": "faq", "title": "FAQ", "content": "Q and A", "component_type": "text", "order": 2}
            ],
            "refinement_summary": "Tightened intro, added FAQ",
            "affected_sections": ["intro", "faq"]
        }"#;
        let chat = Arc::new(StubChat::always(reply));
        let original = plan();
        let refined = refiner(&chat, 5).refine(&original, "Add an FAQ").await.unwrap();

        assert_eq!(chat.calls(), 1);
        assert_eq!(refined.id, original.id);
        assert_eq!(refined.title, "Sharper title");
        assert_eq!(refined.summary, "Original summary");
        assert_eq!(refined.estimated_read_time, 4);
        assert_eq!(refined.source_content_ids, original.source_content_ids);
        assert_eq!(refined.sections.len(), 3);
        assert_eq!(refined.sections[1].content, original.sections[1].content);

        let entry = refined.refinement_history.last().unwrap();
        assert_eq!(refined.refinement_history.len(), 1);
        assert_eq!(entry.instructions, "Add an FAQ");
        assert_eq!(entry.response_summary, "Tightened intro, added FAQ");
        assert_eq!(
            entry.affected_sections,
            BTreeSet::from(["faq".to_string(), "intro".to_string()])
        );
        assert!(original.refinement_history.is_empty());
    }

    #[tokio::test]
    async fn prompt_carries_previews_not_history() {
        let chat = Arc::new(StubChat::always(r#"{"refinement_summary": "noop"}"#));
        let mut with_history = plan();
        with_history.refinement_history.push(history_entry());
        refiner(&chat, 5).refine(&with_history, "Tweak").await.unwrap();

        let (_, user) = &chat.prompts()[0];
        assert!(user.contains("Long body text."));
        assert!(user.contains(PREVIEW_ELLIPSIS));
        assert!(!user.contains(&with_history.sections[1].content));
        assert!(!user.contains("refinement_history"));
        assert!(!user.contains("estimated_read_time"));
        assert!(user.ends_with("# Instructions\n\nTweak\n"));
    }

    #[tokio::test]
    async fn affected_sections_derived_when_omitted() {
        let reply = r#"{"sections": [
            {"id": "intro", "title": "Intro, revised", "content": "Welcome text"}
        ]}"#;
        let chat = Arc::new(StubChat::always(reply));
        let refined = refiner(&chat, 5).refine(&plan(), "Drop the body").await.unwrap();

        let entry = &refined.refinement_history[0];
        assert_eq!(
            entry.affected_sections,
            BTreeSet::from(["body".to_string(), "intro".to_string()])
        );
        assert_eq!(entry.response_summary, "Plan updated");
    }

    #[tokio::test]
    async fn malformed_refinement_retries_then_fails() {
        let chat = Arc::new(StubChat::always("I could not do that"));
        let original = plan();
        let err = refiner(&chat, 5).refine(&original, "Anything").await.unwrap_err();
        assert_eq!(chat.calls(), 3);
        assert!(matches!(err, ContentPlanError::PlanGenerationFailed { attempts: 3, .. }));
    }

    #[test]
    fn preview_is_char_safe() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
