//! Content assembler.
//!
//! Merges processed documents and webpages into two bounded, cleaned text
//! blocks for prompting. Each item is capped on its own, then each group is
//! capped as a whole.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use contentplan_markdown::normalize_whitespace;
use contentplan_shared::{AssemblyLimits, ProcessedContent, SourceKind};

/// Appended wherever text was cut.
pub const TRUNCATION_MARKER: &str = "[content truncated]";

/// Separator between items inside a group.
const ITEM_SEPARATOR: &str = "\n\n---\n\n";

/// Prompt-ready text assembled from every source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContent {
    pub documents: String,
    pub webpages: String,
    /// Ids of the processed contents that were included.
    pub source_ids: BTreeSet<String>,
}

impl AssembledContent {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.webpages.is_empty()
    }

    /// The user-prompt block listing both groups.
    pub fn to_prompt_sections(&self) -> String {
        let mut out = String::new();
        if !self.documents.is_empty() {
            out.push_str("## Uploaded documents\n\n");
            out.push_str(&self.documents);
        }
        if !self.webpages.is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("## Referenced webpages\n\n");
            out.push_str(&self.webpages);
        }
        out
    }
}

/// Clean, cap and group `sources`.
#[instrument(skip_all, fields(sources = sources.len()))]
pub fn assemble(sources: &[ProcessedContent], limits: &AssemblyLimits) -> AssembledContent {
    let mut documents = Vec::new();
    let mut webpages = Vec::new();
    let mut source_ids = BTreeSet::new();

    for source in sources {
        let cleaned = clean_content(&source.markdown_content);
        if cleaned.is_empty() {
            debug!(source = %source.source_identifier, "source empty after cleaning, skipped");
            continue;
        }
        source_ids.insert(source.id.clone());

        match source.kind {
            SourceKind::Document => {
                let body = truncate_chars(&cleaned, limits.document_chars);
                documents.push(format_item("Document", source, &body));
            }
            SourceKind::Webpage => {
                let body = truncate_chars(&cleaned, limits.webpage_chars);
                webpages.push(format_item("Webpage", source, &body));
            }
        }
    }

    let assembled = AssembledContent {
        documents: truncate_chars(&documents.join(ITEM_SEPARATOR), limits.documents_total_chars),
        webpages: truncate_chars(&webpages.join(ITEM_SEPARATOR), limits.webpages_total_chars),
        source_ids,
    };

    debug!(
        documents_chars = assembled.documents.chars().count(),
        webpages_chars = assembled.webpages.chars().count(),
        "content assembled"
    );
    assembled
}

fn format_item(label: &str, source: &ProcessedContent, body: &str) -> String {
    match source.metadata.title.as_deref() {
        Some(title) if !title.trim().is_empty() => format!(
            "### {label}: {}\nTitle: {}\n\n{body}",
            source.source_identifier,
            title.trim()
        ),
        _ => format!("### {label}: {}\n\n{body}", source.source_identifier),
    }
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

static DATA_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(\s*data:[^)]*\)").expect("valid regex"));

static DATA_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:[a-zA-Z]+/[a-zA-Z0-9.+-]+;base64,[A-Za-z0-9+/=\s]{16,}").expect("valid regex")
});

static HTML_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

/// Remove inline base64 images, HTML comments and invisible Unicode, then
/// normalize whitespace.
pub fn clean_content(text: &str) -> String {
    let text = DATA_IMAGE_RE.replace_all(text, "");
    let text = DATA_URI_RE.replace_all(&text, "");
    let text = HTML_COMMENT_RE.replace_all(&text, "");
    let visible: String = text.chars().filter(|c| !is_invisible(*c)).collect();
    normalize_whitespace(&visible)
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{FEFF}'
    )
}

/// Keep at most `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => {
            format!("{}\n\n{TRUNCATION_MARKER}", text[..byte_idx].trim_end())
        }
    }
}
