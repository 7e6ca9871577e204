//! Plan synthesis, refinement and component mapping for contentplan.
//!
//! This crate ties normalized sources from the fetcher and converter crates
//! to an AI chat provider: sources are assembled into bounded prompts, the
//! reply is parsed into a [`contentplan_shared::ContentPlan`], refined on
//! request, and finally flattened into page-builder components.

pub mod assembler;
pub mod catalog;
pub mod chat;
pub mod mapper;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod refiner;
pub mod synthesizer;

pub use assembler::{AssembledContent, assemble};
pub use catalog::{ComponentCatalog, JsonTemplateSource, StaticCatalog, TemplateSource};
pub use chat::{ChatCompletion, OpenRouterChat};
pub use mapper::ComponentMapper;
pub use pipeline::{PlanBuild, PlanInputs, PlanPipeline, ProgressReporter, SilentProgress, build_plan};
pub use refiner::PlanRefiner;
pub use synthesizer::{MAX_GENERATION_ATTEMPTS, PlanRequest, PlanSynthesizer};
