//! Markdown converter with YAML frontmatter support.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_yaml::Value;
use tracing::debug;

use contentplan_markdown::{extract_atx_headings, infer_title};
use contentplan_shared::{DocumentMetadata, Result};

use crate::converter::{Converted, FormatConverter, SourceFile, extension_list};
use crate::language::detect_language;
use crate::plain_text::{decode_text, normalize_line_endings};

pub struct MarkdownConverter {
    extensions: Vec<String>,
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self {
            extensions: extension_list(&["md", "markdown", "mdown", "mkd"]),
        }
    }
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormatConverter for MarkdownConverter {
    fn id(&self) -> &str {
        "markdown"
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn weight(&self) -> i32 {
        0
    }

    async fn process(&self, file: &SourceFile) -> Result<Converted> {
        let (text, _) = decode_text(&file.bytes);
        let text = normalize_line_endings(&text);
        let (frontmatter, body) = split_frontmatter(&text);

        let mut fields = frontmatter.map(parse_frontmatter).unwrap_or_default();
        let markdown = body.trim().to_string();
        let headings = extract_atx_headings(&markdown);

        let title = fields.remove("title").or_else(|| infer_title(&headings));
        let author = fields.remove("author");
        let created_date = fields.remove("date").or_else(|| fields.remove("created"));
        let language = fields
            .remove("language")
            .or_else(|| fields.remove("lang"))
            .or_else(|| detect_language(&markdown).map(str::to_string));

        let mut metadata = DocumentMetadata {
            title,
            author,
            created_date,
            language,
            headings,
            custom_properties: fields,
        };
        metadata.record_counts(&markdown);

        Ok(Converted { markdown, metadata })
    }
}

/// Split a leading `---` block from the body. Without a closing delimiter the
/// whole text is body.
fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix("---\n") else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let body_start = offset + line.len();
            return (Some(&rest[..offset]), &rest[body_start..]);
        }
        offset += line.len();
    }

    (None, text)
}

/// Frontmatter as flat string fields: YAML first, line-based fallback second.
fn parse_frontmatter(raw: &str) -> BTreeMap<String, String> {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Mapping(map)) => map
            .into_iter()
            .filter_map(|(k, v)| {
                let key = scalar_to_string(&k)?;
                let value = value_to_string(&v)?;
                Some((key.to_ascii_lowercase(), value))
            })
            .collect(),
        Ok(Value::Null) => BTreeMap::new(),
        Ok(_) | Err(_) => {
            debug!("frontmatter is not a YAML mapping, using line parser");
            parse_frontmatter_lines(raw)
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => None,
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            Some(items.join(", "))
        }
        Value::Mapping(_) | Value::Tagged(_) => serde_yaml::to_string(value)
            .ok()
            .map(|s| s.trim().to_string()),
        scalar => scalar_to_string(scalar),
    };
    text.filter(|s| !s.is_empty())
}

/// Minimal `key: value` parser; `- item` lines append to the previous key.
fn parse_frontmatter_lines(raw: &str) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    let mut last_key: Option<String> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if let Some(key) = &last_key {
                let entry = fields.entry(key.clone()).or_default();
                if !entry.is_empty() {
                    entry.push_str(", ");
                }
                entry.push_str(unquote(item));
            }
            continue;
        }

        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            let value = unquote(value.trim());
            fields.insert(key.clone(), value.to_string());
            last_key = Some(key);
        }
    }

    fields.retain(|_, v| !v.is_empty());
    fields
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentplan_shared::Heading;

    async fn convert(text: &str) -> Converted {
        MarkdownConverter::new()
            .process(&SourceFile::new("doc.md", text.as_bytes().to_vec()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn frontmatter_is_parsed_and_stripped() {
        let text = "---\ntitle: Launch Plan\nauthor: \"Sam\"\ndate: 2024-03-01\ntags:\n  - product\n  - launch\n---\n\n# Overview\n\nBody text.\n";
        let out = convert(text).await;

        assert_eq!(out.markdown, "# Overview\n\nBody text.");
        assert_eq!(out.metadata.title.as_deref(), Some("Launch Plan"));
        assert_eq!(out.metadata.author.as_deref(), Some("Sam"));
        assert_eq!(out.metadata.created_date.as_deref(), Some("2024-03-01"));
        assert_eq!(
            out.metadata.custom_properties.get("tags").map(String::as_str),
            Some("product, launch")
        );
        assert!(!out.metadata.custom_properties.contains_key("title"));
    }

    #[tokio::test]
    async fn title_from_first_h1_then_any_heading() {
        let out = convert("## Intro\n\n# Main\n\ntext").await;
        assert_eq!(out.metadata.title.as_deref(), Some("Main"));

        let out = convert("### Only Sub\n\ntext").await;
        assert_eq!(out.metadata.title.as_deref(), Some("Only Sub"));
    }

    #[tokio::test]
    async fn headings_ignore_code_fences() {
        let out = convert("# A\n\n```sh\n# comment\n```\n\n## B").await;
        assert_eq!(
            out.metadata.headings,
            vec![
                Heading { level: 1, text: "A".into() },
                Heading { level: 2, text: "B".into() },
            ]
        );
    }

    #[tokio::test]
    async fn unclosed_frontmatter_is_body() {
        let out = convert("---\ntitle: x\n\nNo closing delimiter").await;
        assert!(out.markdown.starts_with("---"));
        assert_eq!(out.metadata.title, None);
    }

    #[test]
    fn invalid_yaml_uses_line_parser() {
        let raw = "title: Plan: Phase 2\nkeywords:\n- a\n- 'b'\n  bad: [unclosed";
        let fields = parse_frontmatter(raw);
        assert_eq!(fields.get("title").map(String::as_str), Some("Plan: Phase 2"));
        assert_eq!(fields.get("keywords").map(String::as_str), Some("a, b"));
    }

    #[test]
    fn split_accepts_dots_terminator() {
        let (fm, body) = split_frontmatter("---\na: 1\n...\nrest");
        assert_eq!(fm, Some("a: 1\n"));
        assert_eq!(body, "rest");
    }
}
