//! End-to-end `plan` pipeline: files + URLs → normalized sources → draft plan.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use contentplan_converters::{ConverterRegistry, SourceFile, TokioProcessRunner};
use contentplan_fetcher::WebNormalizer;
use contentplan_shared::{
    AppConfig, ContentPlan, ConverterConfig, PlannerConfig, ProcessedContent, Result, WebConfig,
};

use crate::catalog::{JsonTemplateSource, StaticCatalog};
use crate::chat::OpenRouterChat;
use crate::synthesizer::{PlanRequest, PlanSynthesizer};

/// What to build a plan from.
#[derive(Debug, Clone, Default)]
pub struct PlanInputs {
    /// Local documents, converted through the registry.
    pub documents: Vec<PathBuf>,
    /// Webpages, normalized in one sequential batch.
    pub urls: Vec<String>,
    pub request: PlanRequest,
    /// JSON component catalog.
    pub catalog: Option<PathBuf>,
    /// Directory of `<template_id>.json` files.
    pub template_dir: Option<PathBuf>,
}

/// Result of the `plan` pipeline.
#[derive(Debug)]
pub struct PlanBuild {
    pub plan: ContentPlan,
    /// Every source that went into the plan.
    pub sources: Vec<ProcessedContent>,
    /// URLs that were skipped, with the reason.
    pub skipped: Vec<(String, String)>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document or webpage is normalized.
    fn source_processed(&self, source: &str, current: usize, total: usize);
    /// Called when a webpage is skipped.
    fn source_skipped(&self, source: &str, reason: &str);
    /// Called when the pipeline completes.
    fn done(&self, build: &PlanBuild);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_processed(&self, _source: &str, _current: usize, _total: usize) {}
    fn source_skipped(&self, _source: &str, _reason: &str) {}
    fn done(&self, _build: &PlanBuild) {}
}

/// The three stages wired together.
pub struct PlanPipeline {
    registry: ConverterRegistry,
    normalizer: WebNormalizer,
    synthesizer: PlanSynthesizer,
}

impl PlanPipeline {
    pub fn new(
        registry: ConverterRegistry,
        normalizer: WebNormalizer,
        synthesizer: PlanSynthesizer,
    ) -> Self {
        Self {
            registry,
            normalizer,
            synthesizer,
        }
    }

    /// Wire the stages from config. A missing API key leaves the synthesizer
    /// without a chat provider, which surfaces as `NoProviderConfigured`.
    pub fn from_config(config: &AppConfig, inputs: &PlanInputs) -> Result<Self> {
        let registry = ConverterRegistry::with_defaults(
            &ConverterConfig::from(config),
            Arc::new(TokioProcessRunner),
        );
        let normalizer = WebNormalizer::from_config(&WebConfig::from(config))?;

        let mut synthesizer = PlanSynthesizer::new(PlannerConfig::from(config));
        match OpenRouterChat::from_app_config(config) {
            Ok(chat) => synthesizer = synthesizer.with_chat(Arc::new(chat)),
            Err(e) => warn!(error = %e, "no chat provider available"),
        }
        if let Some(path) = &inputs.catalog {
            synthesizer = synthesizer.with_catalog(Arc::new(StaticCatalog::load(path)?));
        }
        if let Some(dir) = &inputs.template_dir {
            synthesizer = synthesizer.with_templates(Arc::new(JsonTemplateSource::new(dir.clone())));
        }

        Ok(Self::new(registry, normalizer, synthesizer))
    }

    /// Run the full pipeline.
    ///
    /// 1. Convert documents (any failure aborts)
    /// 2. Normalize webpages (failures are skipped)
    /// 3. Generate the plan
    #[instrument(skip_all, fields(documents = inputs.documents.len(), urls = inputs.urls.len()))]
    pub async fn run(
        &self,
        inputs: &PlanInputs,
        progress: &dyn ProgressReporter,
    ) -> Result<PlanBuild> {
        let start = Instant::now();
        let total = inputs.documents.len() + inputs.urls.len();
        let mut sources = Vec::with_capacity(total);

        // --- Phase 1: Documents ---
        if !inputs.documents.is_empty() {
            progress.phase("Converting documents");
        }
        for path in &inputs.documents {
            let file = SourceFile::read(path).await?;
            let content = self.registry.process(&file).await?;
            sources.push(content);
            progress.source_processed(&file.filename, sources.len(), total);
        }

        // --- Phase 2: Webpages ---
        let mut skipped = Vec::new();
        if !inputs.urls.is_empty() {
            progress.phase("Fetching webpages");
            let batch = self.normalizer.normalize_all(inputs.urls.as_slice()).await;
            for content in batch.contents {
                let current = sources.len() + 1;
                progress.source_processed(&content.source_identifier, current, total);
                sources.push(content);
            }
            for (url, reason) in batch.errors {
                progress.source_skipped(&url, &reason);
                skipped.push((url, reason));
            }
        }

        // --- Phase 3: Plan ---
        progress.phase("Generating plan");
        let plan = self.synthesizer.generate(&sources, &inputs.request).await?;

        let build = PlanBuild {
            plan,
            sources,
            skipped,
            elapsed: start.elapsed(),
        };
        info!(
            plan_id = %build.plan.id,
            sources = build.sources.len(),
            skipped = build.skipped.len(),
            elapsed_ms = build.elapsed.as_millis() as u64,
            "plan pipeline complete"
        );
        progress.done(&build);
        Ok(build)
    }
}

/// Build a plan from `inputs` using `config`.
pub async fn build_plan(
    config: &AppConfig,
    inputs: &PlanInputs,
    progress: &dyn ProgressReporter,
) -> Result<PlanBuild> {
    PlanPipeline::from_config(config, inputs)?
        .run(inputs, progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::chat::tests::StubChat;
    use contentplan_shared::{ContentPlanError, SourceKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PLAN: &str = r#"{"title": "T", "summary": "S", "sections": [
        {"id": "a", "title": "A", "content": "x", "component_type": "text"}
    ]}"#;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.events.lock().unwrap().push(format!("phase:{name}"));
        }
        fn source_processed(&self, source: &str, current: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("ok:{source}:{current}/{total}"));
        }
        fn source_skipped(&self, source: &str, _reason: &str) {
            self.events.lock().unwrap().push(format!("skip:{source}"));
        }
        fn done(&self, _build: &PlanBuild) {
            self.events.lock().unwrap().push("done".into());
        }
    }

    fn pipeline(chat: &Arc<StubChat>) -> PlanPipeline {
        let web = WebConfig {
            block_private_hosts: false,
            ..WebConfig::default()
        };
        PlanPipeline::new(
            ConverterRegistry::with_defaults(
                &ConverterConfig {
                    builtin_external: false,
                    ..ConverterConfig::default()
                },
                Arc::new(TokioProcessRunner),
            ),
            WebNormalizer::from_config(&web).unwrap(),
            PlanSynthesizer::new(PlannerConfig::default()).with_chat(chat.clone()),
        )
    }

    #[tokio::test]
    async fn documents_and_pages_feed_the_plan() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html><body><article><h1>Web</h1><p>Page body</p></article></body></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("notes.md");
        std::fs::write(&doc, "---\ntitle: Notes\n---\n# Notes\n\nDocument body").unwrap();

        let chat = Arc::new(StubChat::always(PLAN));
        let inputs = PlanInputs {
            documents: vec![doc],
            urls: vec![format!("{}/article", server.uri()), format!("{}/gone", server.uri())],
            request: PlanRequest::new("A page"),
            ..PlanInputs::default()
        };
        let recorder = Recorder::default();
        let build = pipeline(&chat).run(&inputs, &recorder).await.unwrap();

        assert_eq!(build.sources.len(), 2);
        assert_eq!(build.sources[0].kind, SourceKind::Document);
        assert_eq!(build.sources[1].kind, SourceKind::Webpage);
        assert_eq!(build.skipped.len(), 1);
        assert!(build.skipped[0].0.ends_with("/gone"));
        assert_eq!(build.plan.source_content_ids.len(), 2);

        let (_, user) = &chat.prompts()[0];
        assert!(user.contains("Document body"));
        assert!(user.contains("Page body"));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("phase:Converting documents"));
        assert!(events.iter().any(|e| e == "ok:notes.md:1/3"));
        assert!(events.iter().any(|e| e.starts_with("skip:") && e.ends_with("/gone")));
        assert_eq!(events.last().map(String::as_str), Some("done"));
    }

    #[tokio::test]
    async fn all_pages_failing_is_no_source_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let chat = Arc::new(StubChat::always(PLAN));
        let inputs = PlanInputs {
            urls: vec![format!("{}/a", server.uri())],
            request: PlanRequest::new("A page"),
            ..PlanInputs::default()
        };
        let err = pipeline(&chat).run(&inputs, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, ContentPlanError::NoSourceContent));
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn unsupported_document_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("slides.key");
        std::fs::write(&doc, b"binary").unwrap();

        let chat = Arc::new(StubChat::always(PLAN));
        let inputs = PlanInputs {
            documents: vec![doc],
            request: PlanRequest::new("A page"),
            ..PlanInputs::default()
        };
        let err = pipeline(&chat).run(&inputs, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, ContentPlanError::NoProcessorAvailable { ref extension } if extension == "key"));
    }
}
