//! Shared types, error model, and configuration for contentplan.
//!
//! This crate is the foundation depended on by all other contentplan crates.
//! It provides:
//! - [`ContentPlanError`] — the unified error type
//! - Domain types ([`ProcessedContent`], [`ContentPlan`], [`PlanSection`], ...)
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssemblyLimits, ConverterConfig, ExternalConverterConfig, OpenRouterConfig,
    PlannerConfig, WebConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_api_key,
};
pub use error::{ContentPlanError, Result};
pub use types::{
    ComponentCatalogEntry, ComponentDescriptor, ContentPlan, DocumentMetadata,
    FALLBACK_COMPONENT_TYPE, GENERIC_COMPONENT_TYPES, Heading, PlanSection, PlanStatus,
    ProcessedContent, RefinementEntry, SourceKind, TemplateAnalysis, TemplateSlot,
};
