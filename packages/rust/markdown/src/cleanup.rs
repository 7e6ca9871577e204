//! Post-render cleanup passes and Markdown inspection helpers.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use contentplan_shared::Heading;

/// Run the cleanup pipeline on rendered Markdown.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let resolved = resolve_links(md, base_url);
    normalize_whitespace(&resolved)
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

/// Right-trim every line, collapse 3+ consecutive newlines to 2 and trim the
/// document. Applying it twice yields the same string.
pub fn normalize_whitespace(md: &str) -> String {
    static MULTI_NEWLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let trimmed = md
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_NEWLINE_RE
        .replace_all(&trimmed, "\n\n")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Resolve relative URLs in Markdown links against a base URL.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        // Match [text](url); image links (![...]) are filtered in the replacement
        Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex")
    });

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let start = caps.get(0).map_or(0, |m| m.start());
            let text = &caps[1];
            let href = &caps[2];

            if start > 0 && md.as_bytes()[start - 1] == b'!' {
                return caps[0].to_string();
            }

            if href.starts_with("http://")
                || href.starts_with("https://")
                || href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                return caps[0].to_string();
            }

            match base.join(href) {
                Ok(resolved) => format!("[{text}]({resolved})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// ATX (`#`) headings outside fenced code blocks, in document order.
pub fn extract_atx_headings(md: &str) -> Vec<Heading> {
    static H_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t]*#*[ \t]*$").expect("valid regex")
    });

    let mut headings = Vec::new();
    let mut in_code_block = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") || line.trim_start().starts_with("~~~") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }
        if let Some(caps) = H_RE.captures(line) {
            let text = caps[2].trim();
            if !text.is_empty() {
                headings.push(Heading {
                    level: caps[1].len() as u8,
                    text: text.to_string(),
                });
            }
        }
    }

    headings
}

/// Prefer the first level-1 heading, else the first heading of any level.
pub fn infer_title(headings: &[Heading]) -> Option<String> {
    headings
        .iter()
        .find(|h| h.level == 1)
        .or_else(|| headings.first())
        .map(|h| h.text.clone())
}

/// Count words in Markdown, excluding fenced code blocks.
pub fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    let without_code = CODE_BLOCK_RE.replace_all(md, "");
    without_code
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#' || c == '-' || c == '|' || c == '>'))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
