//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use contentplan_converters::{ConverterRegistry, SourceFile, TokioProcessRunner};
use contentplan_core::pipeline::{PlanBuild, PlanInputs, ProgressReporter};
use contentplan_core::{
    ComponentCatalog, ComponentMapper, OpenRouterChat, PlanRefiner, PlanRequest, StaticCatalog,
};
use contentplan_fetcher::WebNormalizer;
use contentplan_shared::{
    AppConfig, ContentPlan, ContentPlanError, ConverterConfig, PlannerConfig, WebConfig,
    init_config, load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// contentplan — turn source material into structured content plans.
#[derive(Parser)]
#[command(
    name = "contentplan",
    version,
    about = "Turn documents and webpages into AI-generated, reviewable content plans.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch webpages and print their normalized Markdown.
    Fetch {
        /// URLs to fetch, processed one after another.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print the full processed content as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a local document to Markdown.
    Convert {
        /// File to convert.
        file: PathBuf,

        /// Only extract metadata.
        #[arg(long)]
        metadata: bool,

        /// Print the full processed content as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate a content plan from documents and webpages.
    Plan {
        /// Document to include (repeatable).
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,

        /// Webpage to include (repeatable).
        #[arg(long = "url")]
        urls: Vec<String>,

        /// What the page should be about.
        #[arg(short, long)]
        description: String,

        /// Intended readers.
        #[arg(short, long)]
        audience: Option<String>,

        /// JSON component catalog restricting section types.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Directory containing `<template>.json` page templates.
        #[arg(long, requires = "template")]
        template_dir: Option<PathBuf>,

        /// Template id whose fillable slots the plan must match.
        #[arg(long, requires = "template_dir")]
        template: Option<String>,

        /// Write the plan JSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Refine an existing plan with free-text instructions.
    Refine {
        /// Plan JSON file.
        #[arg(long)]
        plan: PathBuf,

        /// What to change.
        #[arg(short, long)]
        instructions: String,

        /// JSON component catalog restricting section types.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Write the refined plan here (defaults to overwriting --plan).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Flatten a plan into positioned page-builder components.
    Map {
        /// Plan JSON file.
        #[arg(long)]
        plan: PathBuf,

        /// JSON component catalog used to resolve component ids.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so that JSON
/// output on stdout stays clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contentplan=info",
        1 => "contentplan=debug",
        _ => "contentplan=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch { urls, json } => cmd_fetch(&urls, json).await,
        Command::Convert {
            file,
            metadata,
            json,
        } => cmd_convert(&file, metadata, json).await,
        Command::Plan {
            docs,
            urls,
            description,
            audience,
            catalog,
            template_dir,
            template,
            out,
        } => {
            let inputs = PlanInputs {
                documents: docs,
                urls,
                request: PlanRequest {
                    description,
                    target_audience: audience,
                    template_id: template,
                },
                catalog,
                template_dir,
            };
            cmd_plan(&inputs, out.as_deref()).await
        }
        Command::Refine {
            plan,
            instructions,
            catalog,
            out,
        } => cmd_refine(&plan, &instructions, catalog.as_deref(), out.as_deref()).await,
        Command::Map { plan, catalog } => cmd_map(&plan, catalog.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_fetch(urls: &[String], json: bool) -> Result<()> {
    let config = load_config()?;
    let normalizer = WebNormalizer::from_config(&WebConfig::from(&config))?;

    let spinner = spinner(&format!("Fetching {} webpage(s)", urls.len()));
    let batch = normalizer.normalize_all(urls).await;
    spinner.finish_and_clear();

    for (url, reason) in &batch.errors {
        eprintln!("  skipped {url}: {reason}");
    }
    if batch.contents.is_empty() {
        return Err(eyre!("no webpage could be normalized"));
    }

    if json {
        print_json(&batch.contents)?;
    } else {
        for content in &batch.contents {
            println!("<!-- {} -->\n", content.source_identifier);
            println!("{}\n", content.markdown_content);
        }
    }
    Ok(())
}

async fn cmd_convert(file: &Path, metadata_only: bool, json: bool) -> Result<()> {
    let config = load_config()?;
    let registry = ConverterRegistry::with_defaults(
        &ConverterConfig::from(&config),
        Arc::new(TokioProcessRunner),
    );
    let source = SourceFile::read(file).await?;

    if metadata_only {
        let metadata = registry
            .extract_metadata(&source)
            .await
            .map_err(|e| with_supported_hint(&registry, e))?;
        return print_json(&metadata);
    }

    let content = registry
        .process(&source)
        .await
        .map_err(|e| with_supported_hint(&registry, e))?;
    info!(
        file = %file.display(),
        processor = %content.processor_id,
        "document converted"
    );
    if json {
        print_json(&content)
    } else {
        println!("{}", content.markdown_content);
        Ok(())
    }
}

/// Name the accepted extensions when no converter takes a file.
fn with_supported_hint(registry: &ConverterRegistry, err: ContentPlanError) -> color_eyre::Report {
    match err {
        ContentPlanError::NoProcessorAvailable { .. } => {
            let supported = registry.supported_extensions().join(", ");
            color_eyre::Report::new(err).wrap_err(format!("supported extensions: {supported}"))
        }
        other => other.into(),
    }
}

async fn cmd_plan(inputs: &PlanInputs, out: Option<&Path>) -> Result<()> {
    if inputs.documents.is_empty() && inputs.urls.is_empty() {
        return Err(eyre!("provide at least one --doc or --url"));
    }
    let config = load_config()?;

    let reporter = CliProgress::new();
    let build = contentplan_core::build_plan(&config, inputs, &reporter).await;
    reporter.spinner.finish_and_clear();
    let build = build?;

    for (url, reason) in &build.skipped {
        eprintln!("  skipped {url}: {reason}");
    }
    write_plan(&build.plan, out)?;

    eprintln!();
    eprintln!("  Plan generated!");
    eprintln!("  ID:       {}", build.plan.id);
    eprintln!("  Title:    {}", build.plan.title);
    eprintln!("  Sections: {}", build.plan.sections.len());
    eprintln!("  Sources:  {}", build.sources.len());
    eprintln!("  Time:     {:.1}s", build.elapsed.as_secs_f64());
    eprintln!();
    Ok(())
}

async fn cmd_refine(
    plan_path: &Path,
    instructions: &str,
    catalog: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let plan = read_plan(plan_path)?;

    let mut refiner = PlanRefiner::new(PlannerConfig::from(&config));
    match OpenRouterChat::from_app_config(&config) {
        Ok(chat) => refiner = refiner.with_chat(Arc::new(chat)),
        Err(e) => warn!(error = %e, "no chat provider available"),
    }
    if let Some(path) = catalog {
        refiner = refiner.with_catalog(Arc::new(StaticCatalog::load(path)?));
    }

    let spinner = spinner("Refining plan");
    let refined = refiner.refine(&plan, instructions).await;
    spinner.finish_and_clear();
    let refined = refined?;

    write_plan(&refined, Some(out.unwrap_or(plan_path)))?;
    if let Some(entry) = refined.refinement_history.last() {
        eprintln!("  {}", entry.response_summary);
        eprintln!(
            "  Refinements used: {}/{}",
            refined.refinement_history.len(),
            config.limits.max_refinements
        );
    }
    Ok(())
}

fn cmd_map(plan_path: &Path, catalog: Option<&Path>) -> Result<()> {
    let plan = read_plan(plan_path)?;
    let mapper = match catalog {
        Some(path) => {
            let catalog: Arc<dyn ComponentCatalog> = Arc::new(StaticCatalog::load(path)?);
            ComponentMapper::with_catalog(catalog)
        }
        None => ComponentMapper::new(),
    };
    print_json(&mapper.map_plan(&plan))
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan files
// ---------------------------------------------------------------------------

fn read_plan(path: &Path) -> Result<ContentPlan> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read plan '{}'", path.display()))?;
    serde_json::from_str(&json).wrap_err_with(|| format!("'{}' is not a plan file", path.display()))
}

fn write_plan(plan: &ContentPlan, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            let json = serde_json::to_string_pretty(plan)?;
            std::fs::write(path, json)
                .wrap_err_with(|| format!("cannot write plan to '{}'", path.display()))?;
            info!(path = %path.display(), "plan written");
            Ok(())
        }
        None => print_json(plan),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting"),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_processed(&self, source: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processed [{current}/{total}] {source}"));
    }

    fn source_skipped(&self, source: &str, reason: &str) {
        self.spinner.println(format!("  skipping {source}: {reason}"));
    }

    fn done(&self, _build: &PlanBuild) {
        self.spinner.finish_and_clear();
    }
}
