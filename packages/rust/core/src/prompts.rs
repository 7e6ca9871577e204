//! Prompt construction for plan generation and refinement.

use std::fmt::Write as _;

use contentplan_shared::{GENERIC_COMPONENT_TYPES, TemplateAnalysis};

use crate::assembler::AssembledContent;
use crate::catalog::ComponentCatalog;

const SECTION_SCHEMA: &str = r#"{
  "title": "string",
  "summary": "string",
  "target_audience": "string",
  "estimated_read_time": 5,
  "sections": [
    {
      "id": "section-1",
      "title": "string",
      "content": "string (Markdown)",
      "component_type": "one of the allowed component types",
      "order": 0,
      "component_config": {},
      "children": []
    }
  ]
}"#;

const REFINEMENT_FIELDS: &str = r#"Add two extra top-level fields:
  "refinement_summary": "one or two sentences describing what changed",
  "affected_sections": ["ids of sections that were added, changed or removed"]"#;

fn component_type_block(catalog: Option<&dyn ComponentCatalog>) -> String {
    let mut out = String::from(
        "Allowed component_type values. Use these identifiers exactly; never invent new ones:\n",
    );
    match catalog {
        Some(catalog) if !catalog.is_empty() => {
            for entry in catalog.entries() {
                let _ = write!(out, "- {} ({})", entry.component_id, entry.name);
                if !entry.description.trim().is_empty() {
                    let _ = write!(out, ": {}", entry.description.trim());
                }
                if !entry.prop_names.is_empty() {
                    let _ = write!(out, " [props: {}]", entry.prop_names.join(", "));
                }
                out.push('\n');
            }
        }
        _ => {
            for t in GENERIC_COMPONENT_TYPES {
                let _ = writeln!(out, "- {t}");
            }
        }
    }
    out
}

fn template_block(template: &TemplateAnalysis) -> String {
    let count = template.fillable_component_count;
    let mut out = format!(
        "The plan fills an existing page template. Produce EXACTLY {count} top-level sections, \
         one per fillable slot below, in this order. Children are allowed inside a section but \
         do not count towards the {count}.\n\
         Section titles must be human-readable prose describing the content, never component \
         or field names.\n\nFillable slots:\n"
    );
    for (i, slot) in template.fillable_slots().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} (component {}; text fields: {})",
            i + 1,
            slot.name,
            slot.component_id,
            slot.text_fields.join(", ")
        );
    }
    out
}

/// System prompt for a fresh plan.
pub fn generation_system_prompt(
    catalog: Option<&dyn ComponentCatalog>,
    template: Option<&TemplateAnalysis>,
) -> String {
    let mut prompt = String::from(
        "You are a content strategist. Turn the source material you are given into a structured \
         content plan for a single web page.\n\n",
    );
    prompt.push_str(&component_type_block(catalog));
    prompt.push('\n');
    if let Some(template) = template {
        prompt.push_str(&template_block(template));
        prompt.push('\n');
    }
    let _ = write!(
        prompt,
        "Respond with a single JSON object and nothing else, matching this shape:\n{SECTION_SCHEMA}\n\n\
         Rules:\n\
         - Every section needs a unique id, a title, Markdown content and an allowed component_type.\n\
         - order starts at 0 and is unique among siblings.\n\
         - For list sections put one item per line.\n\
         - estimated_read_time is in whole minutes.\n"
    );
    prompt
}

/// User prompt for a fresh plan.
pub fn generation_user_prompt(
    description: &str,
    target_audience: Option<&str>,
    content: &AssembledContent,
) -> String {
    let mut prompt = format!("# Page description\n\n{}\n\n", description.trim());
    if let Some(audience) = target_audience.filter(|a| !a.trim().is_empty()) {
        let _ = write!(prompt, "# Target audience\n\n{}\n\n", audience.trim());
    }
    prompt.push_str("# Source material\n\n");
    prompt.push_str(&content.to_prompt_sections());
    prompt
}

/// System prompt for refining an existing plan.
pub fn refinement_system_prompt(catalog: Option<&dyn ComponentCatalog>) -> String {
    let mut prompt = String::from(
        "You are a content strategist revising an existing content plan according to the \
         user's instructions.\n\n",
    );
    prompt.push_str(&component_type_block(catalog));
    let _ = write!(
        prompt,
        "\nKeep the id of every section you do not change. Give new ids only to new sections. \
         Section content in the current plan is abbreviated; when you keep a section unchanged \
         you may return its content as an empty string.\n\n\
         Respond with a single JSON object and nothing else, matching this shape:\n{SECTION_SCHEMA}\n\
         {REFINEMENT_FIELDS}\n"
    );
    prompt
}

/// User prompt carrying the minimized plan and the instructions.
pub fn refinement_user_prompt(plan_json: &str, instructions: &str) -> String {
    format!(
        "# Current plan\n\n```json\n{plan_json}\n```\n\n# Instructions\n\n{}\n",
        instructions.trim()
    )
}
