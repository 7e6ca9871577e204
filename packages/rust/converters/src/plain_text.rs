//! Plain-text converter with charset detection.

use async_trait::async_trait;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use contentplan_shared::{DocumentMetadata, Result};

use crate::converter::{Converted, FormatConverter, SourceFile, extension_list};
use crate::language::detect_language;

pub struct PlainTextConverter {
    extensions: Vec<String>,
}

impl PlainTextConverter {
    pub fn new() -> Self {
        Self {
            extensions: extension_list(&["txt", "text"]),
        }
    }
}

impl Default for PlainTextConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormatConverter for PlainTextConverter {
    fn id(&self) -> &str {
        "plain_text"
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn weight(&self) -> i32 {
        0
    }

    async fn process(&self, file: &SourceFile) -> Result<Converted> {
        let (text, encoding) = decode_text(&file.bytes);
        let text = normalize_line_endings(&text);
        let markdown = text.trim().to_string();
        let metadata = text_metadata(&markdown, encoding);
        Ok(Converted { markdown, metadata })
    }
}

/// Decode bytes: BOM first, then strict UTF-8, then a chardetng guess.
/// Undecodable input degrades to lossy UTF-8 with replacement characters removed.
/// Control characters other than tab and newlines are always dropped.
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if !had_errors {
            return (strip_control(&text), encoding.name());
        }
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return (strip_control(text), UTF_8.name());
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if !had_errors {
        debug!(encoding = encoding.name(), "detected text encoding");
        return (strip_control(&text), encoding.name());
    }

    debug!("undecodable text, stripping invalid characters");
    let lossy = String::from_utf8_lossy(bytes).replace('\u{FFFD}', "");
    (strip_control(&lossy), UTF_8.name())
}

fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// CRLF and lone CR become LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn text_metadata(text: &str, encoding: &str) -> DocumentMetadata {
    let mut metadata = DocumentMetadata {
        title: text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string),
        language: detect_language(text).map(str::to_string),
        ..DocumentMetadata::default()
    };
    metadata.record_counts(text);
    metadata
        .custom_properties
        .insert("encoding".into(), encoding.to_string());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn convert(bytes: &[u8]) -> Converted {
        PlainTextConverter::new()
            .process(&SourceFile::new("notes.txt", bytes.to_vec()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn utf8_with_crlf() {
        let out = convert(b"\r\n  Meeting notes\r\nThe budget is approved and the plan is final.\rDone").await;
        assert_eq!(
            out.markdown,
            "Meeting notes\nThe budget is approved and the plan is final.\nDone"
        );
        assert_eq!(out.metadata.title.as_deref(), Some("Meeting notes"));
        assert_eq!(out.metadata.language.as_deref(), Some("en"));
        let props = &out.metadata.custom_properties;
        assert_eq!(props.get("line_count").map(String::as_str), Some("3"));
        assert_eq!(props.get("word_count").map(String::as_str), Some("12"));
    }

    #[tokio::test]
    async fn utf16_bom_is_honored() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Größe".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let out = convert(&bytes).await;
        assert_eq!(out.markdown, "Größe");
        assert_eq!(
            out.metadata.custom_properties.get("encoding").map(String::as_str),
            Some("UTF-16LE")
        );
    }

    #[test]
    fn legacy_encoding_is_detected() {
        // windows-1252 "café crème brûlée"
        let bytes = b"caf\xe9 cr\xe8me br\xfbl\xe9e, une recette fran\xe7aise tr\xe8s appr\xe9ci\xe9e";
        let (text, _) = decode_text(bytes);
        assert!(text.starts_with("café"));
        assert!(!text.contains('\u{FFFD}'));
    }

    #[test]
    fn control_characters_are_removed() {
        let (text, _) = decode_text(b"a\x00b\x07c\td\ne");
        assert_eq!(text, "abc\td\ne");
    }

    #[tokio::test]
    async fn blank_file_has_no_title() {
        let out = convert(b"  \n\n ").await;
        assert_eq!(out.markdown, "");
        assert_eq!(out.metadata.title, None);
    }
}
