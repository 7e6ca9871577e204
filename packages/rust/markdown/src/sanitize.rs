//! Sanitization passes over the node tree.
//!
//! Each pass is a pure function `&Element -> Element`: non-content elements
//! are dropped, blocklisted attributes stripped, and empty elements pruned
//! until the tree stops changing.

use tracing::trace;

use crate::dom::{Element, Node};

/// Elements that never carry page content.
const REMOVED_TAGS: &[&str] = &[
    // scripting and styling
    "script", "style", "noscript", "template", "link", "meta", "head",
    // page chrome
    "nav", "header", "footer", "aside",
    // forms and interactive controls
    "form", "button", "input", "select", "option", "textarea", "label", "fieldset", "dialog",
    "menu",
    // media embeds
    "iframe", "frame", "frameset", "embed", "object", "applet", "video", "audio", "canvas",
    "svg", "map", "source", "track", "picture",
];

/// Styling and behavioral attributes removed from every element.
const BLOCKED_ATTRS: &[&str] = &[
    "style", "align", "valign", "bgcolor", "background", "border", "color", "face", "size",
    "width", "height", "cellpadding", "cellspacing", "tabindex", "hidden", "draggable",
    "contenteditable", "spellcheck", "translate", "dir", "accesskey", "autofocus", "loading",
    "decoding", "srcset", "sizes", "target", "rel",
];

/// Attribute prefixes removed from every element (event handlers, ARIA, data).
const BLOCKED_ATTR_PREFIXES: &[&str] = &["aria-", "data-"];

/// Elements kept even without text.
const IMPORTANT_TAGS: &[&str] = &["img", "table"];

/// Upper bound on empty-element pruning rounds.
pub const MAX_PRUNE_ITERATIONS: usize = 10;

/// Run every sanitization pass in order.
pub fn sanitize(root: &Element) -> Element {
    let stripped = strip_non_content(root);
    let stripped = strip_attributes(&stripped);
    prune_empty(&stripped)
}

/// Drop every element whose tag is in the removal list, with its subtree.
pub fn strip_non_content(el: &Element) -> Element {
    let children = el
        .children
        .iter()
        .filter_map(|child| match child {
            Node::Element(e) if REMOVED_TAGS.contains(&e.tag.as_str()) => None,
            Node::Element(e) => Some(Node::Element(strip_non_content(e))),
            Node::Text(t) => Some(Node::Text(t.clone())),
        })
        .collect();

    Element {
        tag: el.tag.clone(),
        attrs: el.attrs.clone(),
        children,
    }
}

/// Remove blocklisted attributes from `el` and all descendants.
pub fn strip_attributes(el: &Element) -> Element {
    let attrs = el
        .attrs
        .iter()
        .filter(|(name, _)| !is_blocked_attr(name))
        .cloned()
        .collect();

    let children = el
        .children
        .iter()
        .map(|child| match child {
            Node::Element(e) => Node::Element(strip_attributes(e)),
            Node::Text(t) => Node::Text(t.clone()),
        })
        .collect();

    Element {
        tag: el.tag.clone(),
        attrs,
        children,
    }
}

fn is_blocked_attr(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if BLOCKED_ATTRS.contains(&name.as_str()) {
        return true;
    }
    if BLOCKED_ATTR_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return true;
    }
    // onclick, onload, ...
    name.len() > 2 && name.starts_with("on")
}

/// Remove elements with no text and no important descendant, repeating
/// until nothing changes or [`MAX_PRUNE_ITERATIONS`] is reached.
pub fn prune_empty(root: &Element) -> Element {
    let mut current = root.clone();
    for iteration in 0..MAX_PRUNE_ITERATIONS {
        let (next, removed) = prune_once(&current);
        current = next;
        trace!(iteration, removed, "prune pass");
        if removed == 0 {
            break;
        }
    }
    current
}

fn prune_once(el: &Element) -> (Element, usize) {
    let mut removed = 0;
    let mut children = Vec::with_capacity(el.children.len());

    for child in &el.children {
        match child {
            Node::Element(e) if !is_worth_keeping(e) => removed += 1,
            Node::Element(e) => {
                let (pruned, n) = prune_once(e);
                removed += n;
                children.push(Node::Element(pruned));
            }
            Node::Text(t) => children.push(Node::Text(t.clone())),
        }
    }

    (
        Element {
            tag: el.tag.clone(),
            attrs: el.attrs.clone(),
            children,
        },
        removed,
    )
}

fn is_worth_keeping(el: &Element) -> bool {
    IMPORTANT_TAGS.contains(&el.tag.as_str())
        || el.has_text()
        || el
            .find(&|e: &Element| IMPORTANT_TAGS.contains(&e.tag.as_str()))
            .is_some()
}
