//! Application configuration for contentplan.
//!
//! User config lives at `~/.contentplan/contentplan.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContentPlanError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contentplan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contentplan";

// ---------------------------------------------------------------------------
// Config structs (matching contentplan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Webpage fetching.
    #[serde(default)]
    pub web: WebSection,

    /// Prompt size and refinement bounds.
    #[serde(default)]
    pub limits: LimitsSection,

    /// File converters.
    #[serde(default)]
    pub converters: ConvertersSection,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Default model used for plan generation and refinement.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (without the `/chat/completions` suffix).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a single chat request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_request_timeout() -> u64 {
    120
}

/// `[web]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Refuse loopback, private and link-local hosts.
    #[serde(default = "default_true")]
    pub block_private_hosts: bool,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_fetch_timeout(),
            block_private_hosts: true,
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Character cap for a single document.
    #[serde(default = "default_document_chars")]
    pub document_chars: usize,

    /// Character cap for a single webpage.
    #[serde(default = "default_webpage_chars")]
    pub webpage_chars: usize,

    /// Combined cap across all documents.
    #[serde(default = "default_documents_total")]
    pub documents_total_chars: usize,

    /// Combined cap across all webpages.
    #[serde(default = "default_webpages_total")]
    pub webpages_total_chars: usize,

    /// Section content preview length sent during refinement.
    #[serde(default = "default_preview_chars")]
    pub section_preview_chars: usize,

    /// Maximum number of refinements per plan.
    #[serde(default = "default_max_refinements")]
    pub max_refinements: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            document_chars: default_document_chars(),
            webpage_chars: default_webpage_chars(),
            documents_total_chars: default_documents_total(),
            webpages_total_chars: default_webpages_total(),
            section_preview_chars: default_preview_chars(),
            max_refinements: default_max_refinements(),
        }
    }
}

fn default_document_chars() -> usize {
    15_000
}
fn default_webpage_chars() -> usize {
    8_000
}
fn default_documents_total() -> usize {
    50_000
}
fn default_webpages_total() -> usize {
    25_000
}
fn default_preview_chars() -> usize {
    200
}
fn default_max_refinements() -> usize {
    5
}

/// `[converters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertersSection {
    /// Wall-clock cap for each external converter process.
    #[serde(default = "default_process_timeout")]
    pub timeout_secs: u64,

    /// Register the built-in external converters (pdftotext, pandoc, markitdown).
    #[serde(default = "default_true")]
    pub builtin_external: bool,

    /// Additional external converters.
    #[serde(default)]
    pub external: Vec<ExternalConverterConfig>,
}

impl Default for ConvertersSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_process_timeout(),
            builtin_external: true,
            external: Vec::new(),
        }
    }
}

fn default_process_timeout() -> u64 {
    60
}

/// `[[converters.external]]` entry.
///
/// `args` may contain `{input}`, replaced with the path of the temporary
/// copy of the file being converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalConverterConfig {
    pub id: String,
    pub binary: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub weight: i32,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime webpage-fetch configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub block_private_hosts: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for WebConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            connect_timeout_secs: config.web.connect_timeout_secs,
            timeout_secs: config.web.timeout_secs,
            block_private_hosts: config.web.block_private_hosts,
        }
    }
}

/// Character bounds applied by the content assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyLimits {
    pub document_chars: usize,
    pub webpage_chars: usize,
    pub documents_total_chars: usize,
    pub webpages_total_chars: usize,
}

impl Default for AssemblyLimits {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AssemblyLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            document_chars: config.limits.document_chars,
            webpage_chars: config.limits.webpage_chars,
            documents_total_chars: config.limits.documents_total_chars,
            webpages_total_chars: config.limits.webpages_total_chars,
        }
    }
}

/// Runtime configuration for plan synthesis and refinement.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Model hint passed with every chat request.
    pub model: Option<String>,
    pub limits: AssemblyLimits,
    pub section_preview_chars: usize,
    pub max_refinements: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PlannerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: Some(config.openrouter.default_model.clone()),
            limits: AssemblyLimits::from(config),
            section_preview_chars: config.limits.section_preview_chars,
            max_refinements: config.limits.max_refinements,
        }
    }
}

/// Runtime configuration for the converter registry.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub timeout_secs: u64,
    pub builtin_external: bool,
    pub external: Vec<ExternalConverterConfig>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ConverterConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.converters.timeout_secs,
            builtin_external: config.converters.builtin_external,
            external: config.converters.external.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contentplan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContentPlanError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contentplan/contentplan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContentPlanError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContentPlanError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContentPlanError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContentPlanError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContentPlanError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenRouter API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ContentPlanError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_refinements"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.limits.document_chars, 15_000);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[limits]
max_refinements = 2

[[converters.external]]
id = "libreoffice"
binary = "soffice"
args = ["--headless", "--cat", "{input}"]
extensions = ["doc"]
weight = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.limits.max_refinements, 2);
        assert_eq!(config.limits.webpage_chars, 8_000);
        assert_eq!(config.converters.external.len(), 1);
        assert_eq!(config.converters.external[0].binary, "soffice");
        assert!(config.web.block_private_hosts);
    }

    #[test]
    fn planner_config_from_app_config() {
        let mut app = AppConfig::default();
        app.openrouter.default_model = "test/model".into();
        let planner = PlannerConfig::from(&app);
        assert_eq!(planner.model.as_deref(), Some("test/model"));
        assert_eq!(planner.max_refinements, 5);
        assert_eq!(planner.limits.webpage_chars, 8_000);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("contentplan.toml");
        std::fs::write(&path, "[web]\ntimeout_secs = 5\n").expect("write");
        let config = load_config_from(&path).expect("load");
        assert_eq!(config.web.timeout_secs, 5);
        assert_eq!(config.web.connect_timeout_secs, 10);
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "CP_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
