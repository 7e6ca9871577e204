//! Parsing of model responses into plan sections.
//!
//! Responses are expected to be a single JSON object, but models often wrap
//! it in a code fence or a sentence of prose. Parsing is strict about the
//! required keys and lenient about value shapes.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use contentplan_markdown::count_words;
use contentplan_shared::{FALLBACK_COMPONENT_TYPE, PlanSection};

use crate::catalog::ComponentCatalog;

/// Words per minute used for the read-time estimate.
const WORDS_PER_MINUTE: usize = 200;

/// Why a response could not be turned into a plan. Always retryable.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response JSON is not an object")]
    NotAnObject,

    #[error("response is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' has an unexpected type")]
    WrongType(&'static str),
}

/// Plan fields read from a response. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPlan {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub target_audience: Option<String>,
    pub estimated_read_time: Option<u32>,
    pub sections: Option<Vec<PlanSection>>,
    pub refinement_summary: Option<String>,
    pub affected_sections: Option<BTreeSet<String>>,
}

/// A generation response: title, summary and sections must be present.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlan {
    pub title: String,
    pub summary: String,
    pub target_audience: Option<String>,
    pub estimated_read_time: Option<u32>,
    pub sections: Vec<PlanSection>,
}

/// Parse a fresh-plan response.
pub fn parse_generation(
    text: &str,
    catalog: Option<&dyn ComponentCatalog>,
) -> Result<GeneratedPlan, PlanParseError> {
    let parsed = parse_response(text, catalog)?;
    Ok(GeneratedPlan {
        title: parsed.title.ok_or(PlanParseError::MissingField("title"))?,
        summary: parsed.summary.ok_or(PlanParseError::MissingField("summary"))?,
        target_audience: parsed.target_audience,
        estimated_read_time: parsed.estimated_read_time,
        sections: parsed.sections.ok_or(PlanParseError::MissingField("sections"))?,
    })
}

/// Parse any plan-shaped response, leaving absent fields as `None`.
pub fn parse_response(
    text: &str,
    catalog: Option<&dyn ComponentCatalog>,
) -> Result<ParsedPlan, PlanParseError> {
    let json = extract_json_object(text).ok_or(PlanParseError::NoJson)?;
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(obj) = value else {
        return Err(PlanParseError::NotAnObject);
    };

    let catalog = catalog.filter(|c| !c.is_empty());
    let sections = match obj.get("sections") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(parse_sections(items, "", catalog)),
        Some(_) => return Err(PlanParseError::WrongType("sections")),
    };

    let affected_sections = match obj.get("affected_sections") {
        Some(Value::Array(ids)) => Some(
            ids.iter()
                .filter_map(|v| scalar_to_string(v))
                .filter(|id| !id.is_empty())
                .collect(),
        ),
        _ => None,
    };

    Ok(ParsedPlan {
        title: text_field(&obj, "title", " "),
        summary: text_field(&obj, "summary", "\n"),
        target_audience: text_field(&obj, "target_audience", ", "),
        estimated_read_time: obj.get("estimated_read_time").and_then(read_time_value),
        sections,
        refinement_summary: text_field(&obj, "refinement_summary", "\n"),
        affected_sections,
    })
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*\n(.*?)\n?\s*```").expect("valid regex"));

/// The JSON object inside `text`: a fenced block if present, else the span
/// from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = FENCE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str().trim());

    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    (end > start).then(|| &inner[start..=end])
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn parse_sections(
    items: &[Value],
    parent_path: &str,
    catalog: Option<&dyn ComponentCatalog>,
) -> Vec<PlanSection> {
    let mut sections: Vec<PlanSection> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let Value::Object(obj) = item else {
                warn!(index, "skipping non-object section");
                return None;
            };
            let path = if parent_path.is_empty() {
                (index + 1).to_string()
            } else {
                format!("{parent_path}-{}", index + 1)
            };
            Some(parse_section(obj, index, &path, catalog))
        })
        .collect();

    normalize_orders(&mut sections);
    sections
}

fn parse_section(
    obj: &Map<String, Value>,
    index: usize,
    path: &str,
    catalog: Option<&dyn ComponentCatalog>,
) -> PlanSection {
    let id = obj
        .get("id")
        .and_then(scalar_to_string)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("section-{path}"));

    let order = obj
        .get("order")
        .and_then(Value::as_u64)
        .and_then(|o| u32::try_from(o).ok())
        .unwrap_or(index as u32);

    let children = match obj.get("children") {
        Some(Value::Array(items)) => parse_sections(items, path, catalog),
        _ => Vec::new(),
    };

    PlanSection {
        component_type: component_type(obj.get("component_type"), &id, catalog),
        title: text_field(obj, "title", " ").unwrap_or_default(),
        content: text_field(obj, "content", "\n").unwrap_or_default(),
        order,
        component_config: match obj.get("component_config") {
            Some(Value::Object(config)) => config.clone(),
            _ => Map::new(),
        },
        children,
        id,
    }
}

fn component_type(
    value: Option<&Value>,
    section_id: &str,
    catalog: Option<&dyn ComponentCatalog>,
) -> String {
    let raw = value
        .and_then(scalar_to_string)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_COMPONENT_TYPE.to_string());

    match catalog {
        None => raw,
        Some(catalog) => match catalog.resolve(&raw) {
            Some(entry) => entry.component_id.clone(),
            None => {
                warn!(
                    section = section_id,
                    component_type = %raw,
                    "unknown component type, using '{FALLBACK_COMPONENT_TYPE}'"
                );
                FALLBACK_COMPONENT_TYPE.to_string()
            }
        },
    }
}

/// Sort siblings by order and renumber them when orders collide.
fn normalize_orders(sections: &mut [PlanSection]) {
    sections.sort_by_key(|s| s.order);
    let mut seen = HashSet::new();
    if !sections.iter().all(|s| seen.insert(s.order)) {
        for (i, section) in sections.iter_mut().enumerate() {
            section.order = i as u32;
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A text field; arrays are joined with `separator`.
fn text_field(obj: &Map<String, Value>, key: &str, separator: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_to_string)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(separator),
        ),
        other => scalar_to_string(other),
    }
}

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)").expect("valid regex"));

fn read_time_value(value: &Value) -> Option<u32> {
    let minutes = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => LEADING_NUMBER_RE
            .captures(s)
            .and_then(|c| c[1].parse::<f64>().ok())?,
        _ => return None,
    };
    (minutes.is_finite() && minutes > 0.0).then(|| (minutes.round() as u32).max(1))
}

/// Reading time in minutes for all section prose, at least one. Code blocks
/// and bare Markdown markers are not counted.
pub fn estimate_read_time(sections: &[PlanSection]) -> u32 {
    let words: usize = sections
        .iter()
        .flat_map(|s| s.walk())
        .map(|s| count_words(&s.title) + count_words(&s.content))
        .sum();
    ((words / WORDS_PER_MINUTE) as u32).max(1)
}
