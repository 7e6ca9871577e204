//! contentplan CLI: turn documents and webpages into structured content plans.
//!
//! Normalizes sources to Markdown, asks an AI provider for a section plan,
//! refines it on request, and maps it onto page-builder components.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
