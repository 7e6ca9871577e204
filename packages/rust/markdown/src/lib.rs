//! HTML-to-Markdown normalization.
//!
//! Parses HTML into an immutable node tree, strips non-content markup,
//! locates the main content region and renders it to minimal Markdown with
//! a pure recursive renderer. A final cleanup pass resolves relative links
//! and normalizes whitespace.

pub mod charset;
mod cleanup;
pub mod dom;
pub mod extract;
pub mod render;
pub mod sanitize;

use tracing::{debug, instrument};
use url::Url;

use contentplan_shared::{ContentPlanError, DocumentMetadata, Result};

pub use charset::{declared_charset, decode_html};
pub use cleanup::{count_words, extract_atx_headings, infer_title, normalize_whitespace};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options for the HTML-to-Markdown conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Filename or URL, used in errors and logs.
    pub source_id: String,
    /// Base for resolving relative links. `None` leaves links untouched.
    pub base_url: Option<Url>,
}

impl ConvertOptions {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

/// Result of converting an HTML document to Markdown.
#[derive(Debug, Clone)]
pub struct HtmlConversion {
    pub markdown: String,
    pub metadata: DocumentMetadata,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert HTML to clean Markdown plus page metadata.
///
/// Fails with [`ContentPlanError::NoExtractableContent`] when nothing but
/// whitespace survives.
#[instrument(skip(html), fields(source = %opts.source_id, html_len = html.len()))]
pub fn convert_html(html: &str, opts: &ConvertOptions) -> Result<HtmlConversion> {
    let root = dom::parse_document(html);
    let info = extract::page_info(&root);

    let cleaned = sanitize::sanitize(&root);
    let content = extract::main_content(&cleaned);
    debug!(region = %content.tag, "rendering main content");

    let raw = render::render(content);
    let markdown = cleanup::run_pipeline(&raw, opts.base_url.as_ref());

    if markdown.is_empty() {
        return Err(ContentPlanError::NoExtractableContent {
            source_id: opts.source_id.clone(),
        });
    }

    let headings = cleanup::extract_atx_headings(&markdown);
    let mut metadata = DocumentMetadata {
        title: info.title.or_else(|| cleanup::infer_title(&headings)),
        author: info.author,
        created_date: info.published,
        language: info.language,
        headings,
        ..DocumentMetadata::default()
    };
    metadata.record_counts(&markdown);
    if let Some(description) = info.description {
        metadata
            .custom_properties
            .insert("description".into(), description);
    }

    debug!(
        markdown_len = markdown.len(),
        headings = metadata.headings.len(),
        "html conversion complete"
    );

    Ok(HtmlConversion { markdown, metadata })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
