//! Character-set detection and decoding for HTML bytes.
//!
//! Precedence: transport `Content-Type` charset (fetched pages only), then `<meta charset>`, then
//! `<meta http-equiv="Content-Type">`, then the XML declaration, then UTF-8.
//! Decoding never fails: an unknown label falls back to lossy UTF-8.

use std::sync::LazyLock;

use encoding_rs::Encoding;
use regex::Regex;
use tracing::debug;

/// Only the head of the document is scanned for in-band declarations.
const SNIFF_BYTES: usize = 4096;

static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<meta\b[^>]*>").expect("valid regex"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z][a-z0-9_:-]*)\s*=\s*("[^"]*"|'[^']*'|[^\s"'>/]+)"#)
        .expect("valid regex")
});

static CHARSET_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).expect("valid regex")
});

static XML_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*\bencoding\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

/// Where the charset label was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    Header,
    MetaCharset,
    MetaHttpEquiv,
    XmlDeclaration,
}

/// Find the declared charset label, honoring the precedence order.
pub fn declared_charset(content_type: Option<&str>, body: &[u8]) -> Option<(String, CharsetSource)> {
    if let Some(label) = content_type.and_then(charset_param) {
        return Some((label, CharsetSource::Header));
    }

    let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_BYTES)]);
    let metas: Vec<Vec<(String, String)>> = META_TAG_RE
        .find_iter(&head)
        .map(|m| attributes(m.as_str()))
        .collect();

    let meta_charset = metas.iter().find_map(|attrs| {
        attrs
            .iter()
            .find(|(name, _)| name == "charset")
            .map(|(_, value)| value.trim().to_string())
            .filter(|v| !v.is_empty())
    });
    if let Some(label) = meta_charset {
        return Some((label, CharsetSource::MetaCharset));
    }

    let http_equiv = metas.iter().find_map(|attrs| {
        let is_content_type = attrs
            .iter()
            .any(|(n, v)| n == "http-equiv" && v.eq_ignore_ascii_case("content-type"));
        if !is_content_type {
            return None;
        }
        attrs
            .iter()
            .find(|(n, _)| n == "content")
            .and_then(|(_, v)| charset_param(v))
    });
    if let Some(label) = http_equiv {
        return Some((label, CharsetSource::MetaHttpEquiv));
    }

    XML_DECL_RE
        .captures(&head)
        .map(|caps| (caps[1].trim().to_string(), CharsetSource::XmlDeclaration))
}

/// Decode an HTML body to a `String`.
pub fn decode_html(content_type: Option<&str>, body: &[u8]) -> String {
    let Some((label, source)) = declared_charset(content_type, body) else {
        return String::from_utf8_lossy(body).into_owned();
    };

    match Encoding::for_label(label.as_bytes()) {
        Some(encoding) => {
            let (text, used, had_errors) = encoding.decode(body);
            debug!(?source, label = %label, encoding = used.name(), had_errors, "decoded body");
            text.into_owned()
        }
        None => {
            debug!(?source, label = %label, "unknown charset label, decoding as UTF-8");
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

fn charset_param(value: &str) -> Option<String> {
    CHARSET_PARAM_RE
        .captures(value)
        .map(|caps| caps[1].to_string())
        .filter(|label| !label.is_empty())
}

fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(tag)
        .map(|caps| {
            let value = caps[2].trim_matches(|c| c == '"' || c == '\'');
            (caps[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wins_over_meta() {
        let body = br#"<html><head><meta charset="utf-8"></head></html>"#;
        let found = declared_charset(Some("text/html; charset=ISO-8859-1"), body);
        assert_eq!(found, Some(("ISO-8859-1".into(), CharsetSource::Header)));
    }

    #[test]
    fn meta_charset_before_http_equiv() {
        let body = br#"<head>
            <meta http-equiv="Content-Type" content="text/html; charset=windows-1251">
            <meta charset='koi8-r'>
        </head>"#;
        let found = declared_charset(Some("text/html"), body);
        assert_eq!(found, Some(("koi8-r".into(), CharsetSource::MetaCharset)));
    }

    #[test]
    fn http_equiv_then_xml_declaration() {
        let body = br#"<head><meta http-equiv="content-type" content="text/html; charset=shift_jis"></head>"#;
        assert_eq!(
            declared_charset(None, body),
            Some(("shift_jis".into(), CharsetSource::MetaHttpEquiv))
        );

        let xml = br#"<?xml version="1.0" encoding="iso-8859-2"?><html></html>"#;
        assert_eq!(
            declared_charset(None, xml),
            Some(("iso-8859-2".into(), CharsetSource::XmlDeclaration))
        );
    }

    #[test]
    fn decodes_latin1_from_header() {
        let body = b"<p>caf\xe9</p>";
        assert_eq!(decode_html(Some("text/html; charset=iso-8859-1"), body), "<p>café</p>");
    }

    #[test]
    fn unknown_label_falls_back_to_lossy_utf8() {
        let body = b"<meta charset=\"x-made-up\"><p>ok \xff</p>";
        let text = decode_html(None, body);
        assert!(text.contains("<p>ok \u{fffd}</p>"));
    }

    #[test]
    fn no_declaration_means_utf8() {
        assert_eq!(decode_html(None, "<p>naïve</p>".as_bytes()), "<p>naïve</p>");
    }
}
