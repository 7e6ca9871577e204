//! Plan synthesis: sources in, draft [`ContentPlan`] out.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use contentplan_shared::{
    ContentPlan, ContentPlanError, PlanStatus, PlannerConfig, ProcessedContent, Result,
    TemplateAnalysis,
};

use crate::assembler::assemble;
use crate::catalog::{ComponentCatalog, TemplateSource};
use crate::chat::ChatCompletion;
use crate::parse::{PlanParseError, estimate_read_time, parse_generation};
use crate::prompts;

/// Total chat attempts per generation or refinement.
pub const MAX_GENERATION_ATTEMPTS: u32 = 3;

const DEFAULT_AUDIENCE: &str = "General audience";

/// What the caller wants the page to be.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub description: String,
    pub target_audience: Option<String>,
    /// Existing page template whose fillable slots the plan must match.
    pub template_id: Option<String>,
}

impl PlanRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Builds draft plans through a [`ChatCompletion`] provider.
pub struct PlanSynthesizer {
    chat: Option<Arc<dyn ChatCompletion>>,
    catalog: Option<Arc<dyn ComponentCatalog>>,
    templates: Option<Arc<dyn TemplateSource>>,
    config: PlannerConfig,
}

impl PlanSynthesizer {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            chat: None,
            catalog: None,
            templates: None,
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

    pub fn with_templates(mut self, templates: Arc<dyn TemplateSource>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn catalog(&self) -> Option<&dyn ComponentCatalog> {
        self.catalog.as_deref()
    }

    /// Slot structure of `template_id` from the configured template source.
    pub fn template_analysis(&self, template_id: &str) -> Result<TemplateAnalysis> {
        let templates = self.templates.as_ref().ok_or_else(|| {
            ContentPlanError::validation(format!(
                "template '{template_id}' requested but no template source is configured"
            ))
        })?;
        templates.template_structure(template_id)
    }

    /// Generate a draft plan from normalized `sources`.
    #[instrument(skip_all, fields(sources = sources.len(), template = request.template_id.as_deref()))]
    pub async fn generate(
        &self,
        sources: &[ProcessedContent],
        request: &PlanRequest,
    ) -> Result<ContentPlan> {
        if sources.is_empty() {
            return Err(ContentPlanError::NoSourceContent);
        }
        let content = assemble(sources, &self.config.limits);
        if content.is_empty() {
            return Err(ContentPlanError::NoSourceContent);
        }
        let chat = self.chat.as_deref().ok_or_else(|| ContentPlanError::NoProviderConfigured {
            hint: "no chat-completion provider was supplied".into(),
        })?;

        let template = request
            .template_id
            .as_deref()
            .map(|id| self.template_analysis(id))
            .transpose()?;

        let system = prompts::generation_system_prompt(self.catalog(), template.as_ref());
        let user = prompts::generation_user_prompt(
            &request.description,
            request.target_audience.as_deref(),
            &content,
        );
        debug!(
            system_len = system.len(),
            user_len = user.len(),
            provider = chat.provider_id(),
            "generation prompt built"
        );

        let catalog = self.catalog();
        let generated = complete_with_retries(chat, &system, &user, self.config.model.as_deref(), |text| {
            parse_generation(text, catalog)
        })
        .await?;

        let now = Utc::now();
        let plan = ContentPlan {
            id: Uuid::now_v7().to_string(),
            title: generated.title,
            summary: generated.summary,
            target_audience: request
                .target_audience
                .clone()
                .filter(|a| !a.trim().is_empty())
                .or(generated.target_audience)
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            estimated_read_time: generated
                .estimated_read_time
                .unwrap_or_else(|| estimate_read_time(&generated.sections)),
            sections: generated.sections,
            status: PlanStatus::Draft,
            refinement_history: Vec::new(),
            source_content_ids: content.source_ids,
            template_id: request.template_id.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Some(template) = &template {
            if !template.conforms(&plan) {
                warn!(
                    expected = template.fillable_component_count,
                    actual = plan.sections.len(),
                    "plan does not match the template's fillable slots"
                );
            }
        }

        info!(
            plan_id = %plan.id,
            sections = plan.sections.len(),
            "plan generated"
        );
        Ok(plan)
    }
}

/// Call `chat` and parse the reply, re-sending the identical request on
/// parse failures. Chat errors are returned as-is.
pub(crate) async fn complete_with_retries<T>(
    chat: &dyn ChatCompletion,
    system: &str,
    user: &str,
    model: Option<&str>,
    parse: impl Fn(&str) -> std::result::Result<T, PlanParseError>,
) -> Result<T> {
    let mut last_err: Option<PlanParseError> = None;

    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        let reply = chat.complete(system, user, model).await?;
        match parse(&reply) {
            Ok(parsed) => {
                if attempt > 1 {
                    info!(attempt, "response parsed after retry");
                }
                return Ok(parsed);
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts = MAX_GENERATION_ATTEMPTS,
                    error = %e,
                    "unusable plan response"
                );
                last_err = Some(e);
            }
        }
    }

    Err(ContentPlanError::PlanGenerationFailed {
        attempts: MAX_GENERATION_ATTEMPTS,
        reason: last_err.map_or_else(|| "no response".to_string(), |e| e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{JsonTemplateSource, StaticCatalog};
    use crate::chat::tests::StubChat;
    use contentplan_shared::{ComponentCatalogEntry, DocumentMetadata, SourceKind};

    const VALID: &str = r#"{
        "title": "Onboarding guide",
        "summary": "How to get started.",
        "target_audience": "New hires",
        "estimated_read_time": 3,
        "sections": [
            {"id": "intro", "title": "Welcome", "content": "Hello", "component_type": "heading", "order": 0},
            {"id": "steps", "title": "First week", "content": "- a\n- b", "component_type": "list", "order": 1},
            {"id": "tip", "title": "Ask questions", "content": "Always", "component_type": "callout", "order": 2}
        ]
    }"#;

    fn sources() -> Vec<ProcessedContent> {
        vec![ProcessedContent::new(
            SourceKind::Document,
            "handbook.md",
            "markdown",
            "# Handbook\n\nEverything you need.".into(),
            DocumentMetadata::default(),
        )]
    }

    fn synthesizer(chat: &Arc<StubChat>) -> PlanSynthesizer {
        PlanSynthesizer::new(PlannerConfig::default()).with_chat(chat.clone())
    }

    #[tokio::test]
    async fn generates_draft_plan() {
        let chat = Arc::new(StubChat::always(VALID));
        let sources = sources();
        let plan = synthesizer(&chat)
            .generate(&sources, &PlanRequest::new("Onboarding page"))
            .await
            .unwrap();

        assert_eq!(chat.calls(), 1);
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.title, "Onboarding guide");
        assert_eq!(plan.target_audience, "New hires");
        assert_eq!(plan.estimated_read_time, 3);
        assert_eq!(plan.sections.len(), 3);
        assert!(plan.source_content_ids.contains(&sources[0].id));
        assert!(plan.refinement_history.is_empty());

        let (system, user) = &chat.prompts()[0];
        assert!(system.contains("- callout"));
        assert!(user.contains("Onboarding page"));
        assert!(user.contains("Everything you need."));
    }

    #[tokio::test]
    async fn requested_audience_wins() {
        let chat = Arc::new(StubChat::always(VALID));
        let request = PlanRequest {
            target_audience: Some("Managers".into()),
            ..PlanRequest::new("Page")
        };
        let plan = synthesizer(&chat).generate(&sources(), &request).await.unwrap();
        assert_eq!(plan.target_audience, "Managers");
    }

    #[tokio::test]
    async fn malformed_output_exhausts_three_attempts() {
        let chat = Arc::new(StubChat::always("Sure! Here is your plan."));
        let err = synthesizer(&chat)
            .generate(&sources(), &PlanRequest::new("Page"))
            .await
            .unwrap_err();

        assert_eq!(chat.calls(), 3);
        assert!(matches!(err, ContentPlanError::PlanGenerationFailed { attempts: 3, .. }));
        let prompts = chat.prompts();
        assert!(prompts.iter().all(|p| p == &prompts[0]), "retries resend the same request");
    }

    #[tokio::test]
    async fn missing_sections_is_retried_to_the_cap() {
        let chat = Arc::new(StubChat::always(r#"{"title": "T", "summary": "S"}"#));
        let err = synthesizer(&chat)
            .generate(&sources(), &PlanRequest::new("Page"))
            .await
            .unwrap_err();
        assert_eq!(chat.calls(), 3);
        match err {
            ContentPlanError::PlanGenerationFailed { reason, .. } => {
                assert!(reason.contains("sections"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn recovers_on_second_attempt() {
        let chat = Arc::new(StubChat::sequence(vec![
            Ok("not json".into()),
            Ok(format!("```json\n{VALID}\n```")),
        ]));
        let plan = synthesizer(&chat)
            .generate(&sources(), &PlanRequest::new("Page"))
            .await
            .unwrap();
        assert_eq!(chat.calls(), 2);
        assert_eq!(plan.sections.len(), 3);
    }

    #[tokio::test]
    async fn chat_errors_are_not_retried() {
        let chat = Arc::new(StubChat::sequence(vec![Err(ContentPlanError::chat_failed(
            "stub", "HTTP 500",
        ))]));
        let err = synthesizer(&chat)
            .generate(&sources(), &PlanRequest::new("Page"))
            .await
            .unwrap_err();
        assert_eq!(chat.calls(), 1);
        assert!(matches!(err, ContentPlanError::ChatFailed { .. }));
    }

    #[tokio::test]
    async fn no_sources_checked_before_provider() {
        let bare = PlanSynthesizer::new(PlannerConfig::default());
        let err = bare.generate(&[], &PlanRequest::new("Page")).await.unwrap_err();
        assert!(matches!(err, ContentPlanError::NoSourceContent));

        let err = bare.generate(&sources(), &PlanRequest::new("Page")).await.unwrap_err();
        assert!(matches!(err, ContentPlanError::NoProviderConfigured { .. }));
    }

    #[tokio::test]
    async fn catalog_types_are_enforced() {
        let catalog = StaticCatalog::new(vec![
            ComponentCatalogEntry {
                component_id: "sdc:theme:heading".into(),
                name: "Heading".into(),
                description: String::new(),
                prop_names: vec![],
            },
            ComponentCatalogEntry {
                component_id: "sdc:theme:list".into(),
                name: "List".into(),
                description: String::new(),
                prop_names: vec![],
            },
        ]);
        let chat = Arc::new(StubChat::always(VALID));
        let plan = synthesizer(&chat)
            .with_catalog(Arc::new(catalog))
            .generate(&sources(), &PlanRequest::new("Page"))
            .await
            .unwrap();

        let types: Vec<&str> = plan.sections.iter().map(|s| s.component_type.as_str()).collect();
        assert_eq!(types, vec!["sdc:theme:heading", "sdc:theme:list", "text"]);
        assert!(chat.prompts()[0].0.contains("- sdc:theme:list (List)"));
    }

    #[tokio::test]
    async fn template_guided_generation_conforms() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("landing.json"),
            r#"[
                {"component_id": "hero", "name": "Hero", "inputs": {"heading": ""}},
                {"component_id": "divider"},
                {"component_id": "list", "name": "Steps", "inputs": {"items": ""}},
                {"component_id": "callout", "name": "Tip", "inputs": {"text": ""}}
            ]"#,
        )
        .unwrap();

        let chat = Arc::new(StubChat::always(VALID));
        let synth = synthesizer(&chat).with_templates(Arc::new(JsonTemplateSource::new(dir.path())));
        let request = PlanRequest {
            template_id: Some("landing".into()),
            ..PlanRequest::new("Landing page")
        };
        let plan = synth.generate(&sources(), &request).await.unwrap();

        let analysis = synth.template_analysis("landing").unwrap();
        assert_eq!(analysis.fillable_component_count, 3);
        assert!(chat.prompts()[0].0.contains("EXACTLY 3 top-level sections"));
        assert!(analysis.conforms(&plan));
        assert_eq!(plan.template_id.as_deref(), Some("landing"));
    }

    #[tokio::test]
    async fn template_without_source_is_rejected() {
        let chat = Arc::new(StubChat::always(VALID));
        let request = PlanRequest {
            template_id: Some("landing".into()),
            ..PlanRequest::new("Page")
        };
        let err = synthesizer(&chat).generate(&sources(), &request).await.unwrap_err();
        assert!(matches!(err, ContentPlanError::Validation { .. }));
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn read_time_estimated_when_missing() {
        let chat = Arc::new(StubChat::always(
            r#"{"title": "T", "summary": "S", "sections": [{"id": "a", "content": "short"}]}"#,
        ));
        let plan = synthesizer(&chat)
            .generate(&sources(), &PlanRequest::new("Page"))
            .await
            .unwrap();
        assert_eq!(plan.estimated_read_time, 1);
        assert_eq!(plan.target_audience, DEFAULT_AUDIENCE);
    }
}
