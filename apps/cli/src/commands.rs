//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use ctaflow_core::ResolutionPipeline;
use ctaflow_shared::{
    AppConfig, EnvironmentProvider, RenderRecord, init_config, load_config, load_config_from,
    validate_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ctaflow: resolve content fragments and CTA links for author or publish.
#[derive(Parser)]
#[command(
    name = "ctaflow",
    version,
    about = "Resolve headless content fragments and their CTA links into render records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.ctaflow/ctaflow.toml.
    #[arg(long, global = true, env = "CTAFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Deployment mode override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Mode {
    Author,
    Publish,
}

/// Environment overrides shared by the resolving commands.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct EnvArgs {
    /// Force author or publish mode.
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Authoring host base URL.
    #[arg(long)]
    pub author_url: Option<String>,

    /// Publish host base URL.
    #[arg(long)]
    pub publish_url: Option<String>,

    /// Wrapper service URL for publish-side queries.
    #[arg(long)]
    pub wrapper_url: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Resolve the fragment at a content path (expanding dynamic lists).
    Resolve {
        /// Repository path of the content fragment.
        content_path: String,

        /// Fragment variation.
        #[arg(long, default_value = "master")]
        variation: String,

        #[command(flatten)]
        env: EnvArgs,
    },

    /// Resolve every fragment carrying the given tags.
    Tags {
        /// Tags, separately or comma-separated.
        #[arg(required = true)]
        tags: Vec<String>,

        #[command(flatten)]
        env: EnvArgs,
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

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries records.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ctaflow=info",
        1 => "ctaflow=debug",
        _ => "ctaflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
    let config_path = cli.config;
    match cli.command {
        Command::Resolve {
            content_path,
            variation,
            env,
        } => cmd_resolve(config_path, &content_path, &variation, &env).await,
        Command::Tags { tags, env } => cmd_tags(config_path, &tags, &env).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Load the config file and apply CLI overrides on top.
fn resolved_config(config_path: Option<PathBuf>, overrides: &EnvArgs) -> Result<AppConfig> {
    let mut config = match config_path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };

    if let Some(mode) = overrides.mode {
        config.environment.is_author = mode == Mode::Author;
    }
    if let Some(url) = &overrides.author_url {
        config.environment.author_url = url.clone();
    }
    if let Some(url) = &overrides.publish_url {
        config.environment.publish_url = Some(url.clone());
    }
    if let Some(url) = &overrides.wrapper_url {
        config.endpoints.wrapper_service_url = url.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

async fn cmd_resolve(
    config_path: Option<PathBuf>,
    content_path: &str,
    variation: &str,
    overrides: &EnvArgs,
) -> Result<()> {
    let config = resolved_config(config_path, overrides)?;
    let pipeline = ResolutionPipeline::from_config(&config)?;
    let env = config.environment.environment();

    info!(content_path, variation, mode = env.mode(), "resolving content fragment");

    let spinner = spinner(format!("Resolving {content_path}"));
    let records = pipeline.resolve(content_path, variation, &env).await;
    spinner.finish_and_clear();

    print_records(&records)
}

async fn cmd_tags(config_path: Option<PathBuf>, tags: &[String], overrides: &EnvArgs) -> Result<()> {
    let config = resolved_config(config_path, overrides)?;
    let pipeline = ResolutionPipeline::from_config(&config)?;
    let env = config.environment.environment();

    info!(tags = ?tags, mode = env.mode(), "resolving tags");

    let spinner = spinner(format!("Resolving {} tag(s)", tags.len()));
    let records = pipeline.resolve_by_tags(tags, &env).await;
    spinner.finish_and_clear();

    print_records(&records)
}

fn print_records(records: &[RenderRecord]) -> Result<()> {
    if records.is_empty() {
        info!("no records resolved");
    }
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

/// Stderr spinner shown while a resolution is in flight.
fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config: AppConfig = match config_path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    if let Err(e) = validate_config(&config) {
        eprintln!("warning: {e}");
    }
    Ok(())
}
