//! Immutable node tree built from `scraper`'s HTML parse.
//!
//! Comments, doctypes and processing instructions are dropped while the tree
//! is built, so every later pass only ever sees elements and text.

use scraper::{ElementRef, Html};

/// A node of the simplified document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its (lowercased) tag name, attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str, attrs: Vec<(String, String)>, children: Vec<Node>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs,
            children,
        }
    }

    /// Value of the first attribute named `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Whether any descendant text node contains non-whitespace.
    pub fn has_text(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Text(t) => !t.trim().is_empty(),
            Node::Element(e) => e.has_text(),
        })
    }

    /// Child elements, skipping text nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Depth-first search (including `self`) for the first element matching `pred`.
    pub fn find<F>(&self, pred: &F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find(pred))
    }

    /// First element (depth-first, including `self`) with the given tag.
    pub fn find_tag(&self, tag: &str) -> Option<&Element> {
        self.find(&|e: &Element| e.tag == tag)
    }

    /// Serialize back to HTML. Attribute values and text are escaped.
    #[cfg(test)]
    pub(crate) fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

#[cfg(test)]
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[cfg(test)]
fn write_html(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (k, v) in &el.attrs {
        out.push_str(&format!(" {k}=\"{}\"", escape(v).replace('"', "&quot;")));
    }
    out.push('>');
    if VOID_TAGS.contains(&el.tag.as_str()) {
        return;
    }
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(&escape(t)),
            Node::Element(e) => write_html(e, out),
        }
    }
    out.push_str(&format!("</{}>", el.tag));
}

#[cfg(test)]
fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Parse a full HTML document into a tree rooted at `<html>`.
pub fn parse_document(html: &str) -> Element {
    let doc = Html::parse_document(html);
    from_element(doc.root_element())
}

fn from_element(el: ElementRef<'_>) -> Element {
    let value = el.value();
    let attrs = value
        .attrs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();

    let mut children = Vec::new();
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => children.push(Node::Text((**text).to_owned())),
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    children.push(Node::Element(from_element(child_el)));
                }
            }
            // Comments, doctypes, processing instructions
            _ => {}
        }
    }

    Element::new(value.name(), attrs, children)
}
