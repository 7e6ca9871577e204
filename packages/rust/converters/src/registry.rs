//! Capability-matched converter registry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use contentplan_shared::{
    ContentPlanError, ConverterConfig, DocumentMetadata, ProcessedContent, Result, SourceKind,
};

use crate::converter::{FormatConverter, SourceFile};
use crate::external::{ExternalConverter, builtin_converters};
use crate::html::HtmlConverter;
use crate::markdown::MarkdownConverter;
use crate::plain_text::PlainTextConverter;
use crate::process::ProcessRunner;

/// Holds registered converters. Selection is by extension, then weight.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn FormatConverter>>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in text, Markdown and HTML converters plus the external ones
    /// enabled in `config`.
    pub fn with_defaults(config: &ConverterConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut registry = Self::new();
        registry.register(Arc::new(PlainTextConverter::new()));
        registry.register(Arc::new(MarkdownConverter::new()));
        registry.register(Arc::new(HtmlConverter::new()));

        if config.builtin_external {
            for converter in builtin_converters(&runner, timeout) {
                registry.register(Arc::new(converter));
            }
        }
        for external in &config.external {
            registry.register(Arc::new(ExternalConverter::from_config(
                external,
                Arc::clone(&runner),
                timeout,
            )));
        }

        debug!(converters = registry.converters.len(), "converter registry ready");
        registry
    }

    pub fn register(&mut self, converter: Arc<dyn FormatConverter>) {
        self.converters.push(converter);
    }

    /// Converters handling `extension`, lowest weight first (registration
    /// order breaks ties).
    pub fn candidates(&self, extension: &str) -> Vec<&dyn FormatConverter> {
        let mut matching: Vec<&dyn FormatConverter> = self
            .converters
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| c.supports(extension))
            .collect();
        matching.sort_by_key(|c| c.weight());
        matching
    }

    /// The preferred converter for `extension` whose requirements are met.
    pub fn select(&self, extension: &str) -> Result<&dyn FormatConverter> {
        self.candidates(extension)
            .into_iter()
            .find(|c| c.requirements_met())
            .ok_or_else(|| ContentPlanError::NoProcessorAvailable {
                extension: extension.to_string(),
            })
    }

    /// Every extension some registered converter claims, sorted.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .converters
            .iter()
            .flat_map(|c| c.extensions().iter().cloned())
            .collect();
        exts.sort();
        exts.dedup();
        exts
    }

    /// Convert a file into [`ProcessedContent`].
    #[instrument(skip_all, fields(file = %file.filename))]
    pub async fn process(&self, file: &SourceFile) -> Result<ProcessedContent> {
        let extension = file.extension();
        let converter = self.select(&extension)?;
        debug!(converter = converter.id(), "converter selected");

        let converted = converter.process(file).await?;
        if converted.markdown.trim().is_empty() {
            return Err(ContentPlanError::NoExtractableContent {
                source_id: file.filename.clone(),
            });
        }

        info!(
            converter = converter.id(),
            markdown_len = converted.markdown.len(),
            "document converted"
        );

        Ok(ProcessedContent::new(
            SourceKind::Document,
            &file.filename,
            converter.id(),
            converted.markdown,
            converted.metadata,
        ))
    }

    /// Metadata only, through the same converter [`process`](Self::process) would use.
    pub async fn extract_metadata(&self, file: &SourceFile) -> Result<DocumentMetadata> {
        let converter = self.select(&file.extension())?;
        converter.extract_metadata(file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converted;
    use crate::external::tests::StubRunner;
    use async_trait::async_trait;
    use contentplan_shared::ExternalConverterConfig;

    struct Fixed {
        id: &'static str,
        extensions: Vec<String>,
        weight: i32,
        ready: bool,
    }

    fn fixed(id: &'static str, ext: &str, weight: i32, ready: bool) -> Arc<dyn FormatConverter> {
        Arc::new(Fixed {
            id,
            extensions: vec![ext.to_string()],
            weight,
            ready,
        })
    }

    #[async_trait]
    impl FormatConverter for Fixed {
        fn id(&self) -> &str {
            self.id
        }
        fn extensions(&self) -> &[String] {
            &self.extensions
        }
        fn weight(&self) -> i32 {
            self.weight
        }
        fn requirements_met(&self) -> bool {
            self.ready
        }
        async fn process(&self, _file: &SourceFile) -> Result<Converted> {
            Ok(Converted {
                markdown: format!("from {}", self.id),
                metadata: DocumentMetadata::default(),
            })
        }
    }

    #[test]
    fn lowest_weight_wins() {
        let mut registry = ConverterRegistry::new();
        registry.register(fixed("heavy", "pdf", 10, true));
        registry.register(fixed("light", "pdf", 0, true));
        assert_eq!(registry.select("pdf").unwrap().id(), "light");
    }

    #[test]
    fn unmet_requirements_are_skipped() {
        let mut registry = ConverterRegistry::new();
        registry.register(fixed("light", "pdf", 0, false));
        registry.register(fixed("heavy", "pdf", 10, true));
        assert_eq!(registry.select("pdf").unwrap().id(), "heavy");
    }

    #[test]
    fn no_candidate_is_an_error() {
        let mut registry = ConverterRegistry::new();
        registry.register(fixed("only", "pdf", 0, false));
        let err = registry.select("pdf").err().unwrap();
        assert!(matches!(err, ContentPlanError::NoProcessorAvailable { ref extension } if extension == "pdf"));
        assert!(registry.select("xyz").is_err());
    }

    #[test]
    fn defaults_prefer_pdftotext_then_markitdown() {
        let registry = ConverterRegistry::with_defaults(
            &ConverterConfig::default(),
            Arc::new(StubRunner::default()),
        );
        assert_eq!(registry.select("pdf").unwrap().id(), "pdftotext");
        assert_eq!(registry.select("docx").unwrap().id(), "pandoc");
        assert_eq!(registry.select("pptx").unwrap().id(), "markitdown");
        assert_eq!(registry.select("md").unwrap().id(), "markdown");
        assert_eq!(registry.select("htm").unwrap().id(), "html");

        let fallback = ConverterRegistry::with_defaults(
            &ConverterConfig::default(),
            Arc::new(StubRunner {
                missing: vec!["pdftotext".into(), "pandoc".into()],
                ..StubRunner::default()
            }),
        );
        assert_eq!(fallback.select("pdf").unwrap().id(), "markitdown");
        assert_eq!(fallback.select("docx").unwrap().id(), "markitdown");
        assert!(fallback.select("odt").is_err());
    }

    #[test]
    fn configured_converters_join_selection() {
        let config = ConverterConfig {
            builtin_external: false,
            external: vec![ExternalConverterConfig {
                id: "tika".into(),
                binary: "tika".into(),
                args: vec!["--text".into(), "{input}".into()],
                extensions: vec![".PDF".into()],
                weight: 5,
            }],
            ..ConverterConfig::default()
        };
        let registry = ConverterRegistry::with_defaults(&config, Arc::new(StubRunner::default()));
        assert_eq!(registry.select("pdf").unwrap().id(), "tika");
        assert!(registry.supported_extensions().contains(&"pdf".to_string()));
    }

    #[tokio::test]
    async fn process_wraps_processed_content() {
        let mut registry = ConverterRegistry::new();
        registry.register(fixed("light", "pdf", 0, true));

        let content = registry
            .process(&SourceFile::new("a.PDF", b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(content.kind, SourceKind::Document);
        assert_eq!(content.processor_id, "light");
        assert_eq!(content.source_identifier, "a.PDF");
        assert_eq!(content.markdown_content, "from light");
    }

    #[tokio::test]
    async fn empty_conversion_is_no_extractable_content() {
        let registry =
            ConverterRegistry::with_defaults(&ConverterConfig::default(), Arc::new(StubRunner::default()));
        let err = registry
            .process(&SourceFile::new("blank.txt", b"  \n ".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentPlanError::NoExtractableContent { .. }));
    }
}
