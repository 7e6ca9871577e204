//! Main-content detection and page-level metadata.

use crate::dom::Element;

/// Structural hint used to locate the main content region.
#[derive(Debug, Clone, Copy)]
enum ContentHint {
    Tag(&'static str),
    Role(&'static str),
    ClassOrId(&'static str),
}

/// Hints tried in priority order before falling back to `<body>`.
const CONTENT_HINTS: &[ContentHint] = &[
    ContentHint::Tag("article"),
    ContentHint::Tag("main"),
    ContentHint::Role("main"),
    ContentHint::ClassOrId("content"),
    ContentHint::ClassOrId("post"),
    ContentHint::ClassOrId("entry"),
    ContentHint::ClassOrId("article"),
];

impl ContentHint {
    fn matches(&self, el: &Element) -> bool {
        match self {
            Self::Tag(tag) => el.tag == *tag,
            Self::Role(role) => el
                .attr("role")
                .is_some_and(|r| r.trim().eq_ignore_ascii_case(role)),
            Self::ClassOrId(hint) => {
                let in_class = el.attr("class").is_some_and(|c| {
                    c.split_whitespace()
                        .any(|token| token.to_ascii_lowercase().contains(hint))
                });
                let in_id = el
                    .attr("id")
                    .is_some_and(|id| id.to_ascii_lowercase().contains(hint));
                in_class || in_id
            }
        }
    }
}

/// Locate the main content region: the first hint that matches, else
/// `<body>`, else the whole document.
pub fn main_content(root: &Element) -> &Element {
    for hint in CONTENT_HINTS {
        // The document and body elements are never a "content region" on their own.
        if let Some(found) = root.find(&|e: &Element| {
            e.tag != "html" && e.tag != "body" && hint.matches(e)
        }) {
            tracing::debug!(?hint, tag = %found.tag, "main content region found");
            return found;
        }
    }

    root.find_tag("body").unwrap_or(root)
}

/// Page-level metadata read from the unsanitized document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub title: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub description: Option<String>,
}

/// Read `<title>`, `<html lang>` and the common `<meta>` tags.
pub fn page_info(root: &Element) -> PageInfo {
    let title = root
        .find_tag("title")
        .map(|t| collapse(&t.text()))
        .filter(|t| !t.is_empty());

    let language = root
        .attr("lang")
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    PageInfo {
        title,
        language,
        author: meta_content(root, &["author", "article:author"]),
        published: meta_content(
            root,
            &["article:published_time", "date", "dc.date", "datepublished"],
        ),
        description: meta_content(root, &["description", "og:description"]),
    }
}

fn meta_content(root: &Element, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        root.find(&|e: &Element| {
            e.tag == "meta"
                && (e.attr("name").is_some_and(|n| n.eq_ignore_ascii_case(name))
                    || e.attr("property").is_some_and(|p| p.eq_ignore_ascii_case(name)))
        })
        .and_then(|m| m.attr("content"))
        .map(collapse)
        .filter(|c| !c.is_empty())
    })
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    #[test]
    fn prefers_article_over_main() {
        let root = parse_document(
            "<html><body><main><p>Main</p><article><p>Article</p></article></main></body></html>",
        );
        assert_eq!(main_content(&root).tag, "article");
    }

    #[test]
    fn role_main_before_class_hints() {
        let root = parse_document(
            r#"<html><body><div class="content">C</div><div role="main">R</div></body></html>"#,
        );
        assert_eq!(main_content(&root).text(), "R");
    }

    #[test]
    fn class_hints_in_order() {
        let root = parse_document(
            r#"<html><body><div class="entry-body">E</div><div id="post-42">P</div></body></html>"#,
        );
        // "content" misses, "post" wins before "entry"
        assert_eq!(main_content(&root).text(), "P");
    }

    #[test]
    fn body_class_does_not_count_as_region() {
        let root = parse_document(
            r#"<html><body class="post-template"><div class="main-content">Body</div></body></html>"#,
        );
        assert_eq!(main_content(&root).attr("class"), Some("main-content"));
    }

    #[test]
    fn falls_back_to_body() {
        let root = parse_document("<html><body><div><p>Plain</p></div></body></html>");
        assert_eq!(main_content(&root).tag, "body");
    }

    #[test]
    fn reads_page_info() {
        let root = parse_document(
            r#"<html lang="fr"><head>
                <title>  Le   Titre </title>
                <meta name="author" content="Ada">
                <meta property="article:published_time" content="2024-05-01">
            </head><body></body></html>"#,
        );
        let info = page_info(&root);
        assert_eq!(info.title.as_deref(), Some("Le Titre"));
        assert_eq!(info.language.as_deref(), Some("fr"));
        assert_eq!(info.author.as_deref(), Some("Ada"));
        assert_eq!(info.published.as_deref(), Some("2024-05-01"));
    }
}
