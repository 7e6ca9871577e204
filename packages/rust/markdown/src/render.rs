//! Markdown rendering over the sanitized node tree.
//!
//! The renderer is a set of pure recursive functions: block elements produce
//! standalone blocks joined by a blank line, inline elements produce text
//! runs that are flushed as paragraphs between blocks.

use std::sync::LazyLock;

use regex::Regex;

use crate::dom::{Element, Node};

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "details", "div", "dl",
    "dt", "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "html", "li",
    "main", "ol", "p", "pre", "section", "summary", "table", "ul",
];

/// Images need alt text longer than this to be rendered.
const MIN_IMAGE_ALT_CHARS: usize = 3;

/// Indentation added per list nesting level.
const LIST_INDENT: &str = "  ";

fn is_block(el: &Element) -> bool {
    BLOCK_TAGS.contains(&el.tag.as_str())
}

/// Render an element (usually the main content region) to Markdown.
/// Whitespace is not normalized here.
pub fn render(el: &Element) -> String {
    render_block(el)
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

fn render_block(el: &Element) -> String {
    match el.tag.as_str() {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => render_heading(el),
        "ul" | "ol" => render_list(el, 0),
        "table" => render_table(el),
        "blockquote" => render_blockquote(el),
        "pre" => render_pre(el),
        "hr" => "---".to_string(),
        _ => render_container(&el.children),
    }
}

/// Render a mix of block and inline children: inline runs become paragraphs.
fn render_container(children: &[Node]) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut inline = String::new();

    for child in children {
        match child {
            Node::Text(t) => inline.push_str(&collapse_whitespace(t)),
            Node::Element(e) if is_block(e) => {
                flush_inline(&mut inline, &mut blocks);
                let block = render_block(e);
                if !block.trim().is_empty() {
                    blocks.push(block);
                }
            }
            Node::Element(e) => inline.push_str(&render_inline(e)),
        }
    }
    flush_inline(&mut inline, &mut blocks);

    blocks.join("\n\n")
}

fn flush_inline(inline: &mut String, blocks: &mut Vec<String>) {
    let paragraph = inline
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let paragraph = paragraph.trim();
    if !paragraph.is_empty() {
        blocks.push(paragraph.to_string());
    }
    inline.clear();
}

fn render_heading(el: &Element) -> String {
    let level: usize = el.tag[1..].parse().unwrap_or(1);
    let text = single_line(&inline_text(&el.children));
    if text.is_empty() {
        return String::new();
    }
    format!("{} {text}", "#".repeat(level.clamp(1, 6)))
}

fn render_blockquote(el: &Element) -> String {
    let inner = render_container(&el.children);
    inner
        .trim()
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_pre(el: &Element) -> String {
    let code = el.text();
    let code = code.trim_matches('\n').trim_end();
    if code.trim().is_empty() {
        return String::new();
    }

    let language = el
        .find_tag("code")
        .and_then(code_language)
        .or_else(|| code_language(el))
        .unwrap_or_default();

    format!("```{language}\n{code}\n```")
}

/// Language from a `language-xx` / `lang-xx` class.
fn code_language(el: &Element) -> Option<String> {
    el.attr("class")?.split_whitespace().find_map(|class| {
        class
            .strip_prefix("language-")
            .or_else(|| class.strip_prefix("lang-"))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    })
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

fn render_list(list: &Element, depth: usize) -> String {
    let ordered = list.tag == "ol";
    let mut number: u64 = list
        .attr("start")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1);
    let indent = LIST_INDENT.repeat(depth);
    let mut lines: Vec<String> = Vec::new();

    for item in list.child_elements() {
        match item.tag.as_str() {
            "li" => {
                let marker = if ordered {
                    let m = format!("{number}.");
                    number += 1;
                    m
                } else {
                    "-".to_string()
                };

                let mut text = String::new();
                let mut nested: Vec<String> = Vec::new();
                for child in &item.children {
                    match child {
                        Node::Element(e) if e.tag == "ul" || e.tag == "ol" => {
                            let sub = render_list(e, depth + 1);
                            if !sub.is_empty() {
                                nested.push(sub);
                            }
                        }
                        Node::Element(e) if is_block(e) => {
                            text.push(' ');
                            text.push_str(&inline_text(&e.children));
                            text.push(' ');
                        }
                        Node::Element(e) => text.push_str(&render_inline(e)),
                        Node::Text(t) => text.push_str(&collapse_whitespace(t)),
                    }
                }

                let text = single_line(&text);
                if !text.is_empty() {
                    lines.push(format!("{indent}{marker} {text}"));
                }
                lines.extend(nested);
            }
            // Lists nested directly inside lists (invalid but common)
            "ul" | "ol" => {
                let sub = render_list(item, depth + 1);
                if !sub.is_empty() {
                    lines.push(sub);
                }
            }
            _ => {}
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

struct TableRow {
    header_like: bool,
    cells: Vec<String>,
}

fn render_table(table: &Element) -> String {
    let mut rows = Vec::new();
    collect_rows(table, false, &mut rows);
    rows.retain(|r| !r.cells.is_empty());

    let columns = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let header_index = rows.iter().position(|r| r.header_like).unwrap_or(0);
    let header = rows.remove(header_index);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(table_line(&header.cells, columns));
    lines.push(table_line(&vec!["---".to_string(); columns], columns));
    for row in &rows {
        lines.push(table_line(&row.cells, columns));
    }
    lines.join("\n")
}

fn collect_rows(el: &Element, in_head: bool, rows: &mut Vec<TableRow>) {
    for child in el.child_elements() {
        match child.tag.as_str() {
            "thead" => collect_rows(child, true, rows),
            "tbody" | "tfoot" => collect_rows(child, in_head, rows),
            "tr" => {
                let mut has_th = false;
                let cells = child
                    .child_elements()
                    .filter(|c| c.tag == "td" || c.tag == "th")
                    .map(|c| {
                        has_th |= c.tag == "th";
                        single_line(&inline_text(&c.children)).replace('|', "\\|")
                    })
                    .collect();
                rows.push(TableRow {
                    header_like: in_head || has_th,
                    cells,
                });
            }
            _ => {}
        }
    }
}

/// Pipe-delimited row, padded with empty cells up to `columns`.
fn table_line(cells: &[String], columns: usize) -> String {
    let mut padded: Vec<&str> = cells.iter().map(String::as_str).collect();
    padded.resize(columns, "");
    format!("| {} |", padded.join(" | "))
}

// ---------------------------------------------------------------------------
// Inline
// ---------------------------------------------------------------------------

fn render_inline(el: &Element) -> String {
    match el.tag.as_str() {
        "strong" | "b" => wrap_marker("**", &inline_text(&el.children)),
        "em" | "i" => wrap_marker("*", &inline_text(&el.children)),
        "del" | "s" | "strike" => wrap_marker("~~", &inline_text(&el.children)),
        "code" | "kbd" | "samp" => render_inline_code(el),
        "a" => render_link(el),
        "img" => render_image(el),
        "br" => "\n".to_string(),
        _ => inline_text(&el.children),
    }
}

/// Render children as a single inline run; block children are flattened.
fn inline_text(children: &[Node]) -> String {
    let mut out = String::new();
    for child in children {
        match child {
            Node::Text(t) => out.push_str(&collapse_whitespace(t)),
            Node::Element(e) if is_block(e) => {
                out.push(' ');
                out.push_str(&inline_text(&e.children));
                out.push(' ');
            }
            Node::Element(e) => out.push_str(&render_inline(e)),
        }
    }
    out
}

/// Wrap the trimmed text in `marker`, keeping surrounding whitespace outside.
fn wrap_marker(marker: &str, inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let lead = if inner.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if inner.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{marker}{trimmed}{marker}{trail}")
}

fn render_inline_code(el: &Element) -> String {
    let code = single_line(&el.text());
    if code.is_empty() {
        return String::new();
    }
    if code.contains('`') {
        format!("`` {code} ``")
    } else {
        format!("`{code}`")
    }
}

fn render_link(el: &Element) -> String {
    let text = single_line(&inline_text(&el.children));
    if text.is_empty() {
        return String::new();
    }

    match el.attr("href").map(str::trim) {
        Some(href) if is_followable(href) => format!("[{text}]({href})"),
        _ => text,
    }
}

fn is_followable(href: &str) -> bool {
    !href.is_empty() && href != "#" && !href.to_ascii_lowercase().starts_with("javascript:")
}

fn render_image(el: &Element) -> String {
    let alt = single_line(el.attr("alt").unwrap_or_default());
    let src = el.attr("src").map(str::trim).unwrap_or_default();
    if alt.chars().count() > MIN_IMAGE_ALT_CHARS && !src.is_empty() {
        format!("![{alt}]({src})")
    } else {
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Collapse whitespace runs inside a text node to a single space.
fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    WS_RE.replace_all(text, " ").into_owned()
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
