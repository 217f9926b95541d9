//! ctaflow CLI: resolve headless content fragments into render records.
//!
//! Fetches a content fragment (or a tag-driven list of them) for the
//! configured author or publish environment and prints the normalized
//! records as JSON.

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
