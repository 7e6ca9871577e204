//! Component catalogs and page-template structure.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use contentplan_shared::{
    ComponentCatalogEntry, ContentPlanError, Result, TemplateAnalysis, TemplateSlot,
};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The set of presentation components a plan may use.
pub trait ComponentCatalog: Send + Sync {
    fn entries(&self) -> &[ComponentCatalogEntry];

    /// Resolve a section's component type to a catalog entry: exact id, then
    /// the id segment after the last `:`, then the name (case-insensitive).
    fn resolve(&self, component_type: &str) -> Option<&ComponentCatalogEntry> {
        let wanted = component_type.trim();
        if wanted.is_empty() {
            return None;
        }
        let entries = self.entries();
        entries
            .iter()
            .find(|e| e.component_id == wanted)
            .or_else(|| {
                entries.iter().find(|e| {
                    e.component_id
                        .rsplit(':')
                        .next()
                        .is_some_and(|suffix| suffix.eq_ignore_ascii_case(wanted))
                })
            })
            .or_else(|| entries.iter().find(|e| e.name.eq_ignore_ascii_case(wanted)))
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// An in-memory catalog, usually loaded from a JSON array of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<ComponentCatalogEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<ComponentCatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<ComponentCatalogEntry> = serde_json::from_str(json)
            .map_err(|e| ContentPlanError::validation(format!("invalid component catalog: {e}")))?;
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| ContentPlanError::io(path, e))?;
        let catalog = Self::from_json_str(&json)?;
        debug!(path = %path.display(), components = catalog.entries.len(), "catalog loaded");
        Ok(catalog)
    }
}

impl ComponentCatalog for StaticCatalog {
    fn entries(&self) -> &[ComponentCatalogEntry] {
        &self.entries
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// One component instance of a stored page template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateComponent {
    pub component_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slot: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    /// Input values; string-valued inputs are the fillable text fields.
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    Wrapped { components: Vec<TemplateComponent> },
    Bare(Vec<TemplateComponent>),
}

/// Work out which components of a template can receive generated text.
pub fn analyze_template(template_id: &str, components: &[TemplateComponent]) -> TemplateAnalysis {
    let structure: Vec<TemplateSlot> = components
        .iter()
        .enumerate()
        .map(|(position, c)| {
            let text_fields: Vec<String> = c
                .inputs
                .iter()
                .filter(|(_, v)| v.is_string())
                .map(|(k, _)| k.clone())
                .collect();
            TemplateSlot {
                position,
                component_id: c.component_id.clone(),
                name: c.name.clone().unwrap_or_else(|| c.component_id.clone()),
                slot: c.slot.clone(),
                parent: c.parent.clone(),
                has_text_inputs: !text_fields.is_empty(),
                text_fields,
            }
        })
        .collect();

    TemplateAnalysis {
        template_id: template_id.to_string(),
        total_components: structure.len(),
        fillable_component_count: structure.iter().filter(|s| s.has_text_inputs).count(),
        structure,
    }
}

/// Looks up a template's slot structure by id.
pub trait TemplateSource: Send + Sync {
    fn template_structure(&self, template_id: &str) -> Result<TemplateAnalysis>;
}

/// Templates stored as `<dir>/<template_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonTemplateSource {
    dir: PathBuf,
}

impl JsonTemplateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateSource for JsonTemplateSource {
    fn template_structure(&self, template_id: &str) -> Result<TemplateAnalysis> {
        let valid = !template_id.is_empty()
            && template_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !template_id.starts_with('.');
        if !valid {
            return Err(ContentPlanError::validation(format!(
                "invalid template id '{template_id}'"
            )));
        }

        let path = self.dir.join(format!("{template_id}.json"));
        let json = std::fs::read_to_string(&path).map_err(|e| ContentPlanError::io(&path, e))?;
        let components = match serde_json::from_str::<TemplateFile>(&json) {
            Ok(TemplateFile::Wrapped { components }) | Ok(TemplateFile::Bare(components)) => {
                components
            }
            Err(e) => {
                return Err(ContentPlanError::validation(format!(
                    "invalid template '{template_id}': {e}"
                )));
            }
        };

        let analysis = analyze_template(template_id, &components);
        debug!(
            template_id,
            total = analysis.total_components,
            fillable = analysis.fillable_component_count,
            "template analyzed"
        );
        Ok(analysis)
    }
}
