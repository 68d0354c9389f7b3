//! Nodus command-line interface.

pub mod commands;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use nodus_core::config::{Config, LoggingConfig};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Nodus - chat bot backed by the Tickrate task service
#[derive(Parser)]
#[command(name = "nodus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "NODUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment file to load before reading the config
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the task service and the gateway and run the bot
    Run(commands::run::RunArgs),

    /// Submit one task script and print its result
    Task(commands::task::TaskArgs),

    /// List the task scripts that would be loaded
    Scripts,

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Version = cli.command {
        println!("nodus {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let loaded = nodus_core::env::load_dotenv(&cli.env_file);
    let config = Config::resolve(cli.config.as_deref());

    // Logging is configured from the file, so it starts after the load
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_logging(&logging, cli.verbose);

    match loaded {
        Ok(count) => debug!(path = %cli.env_file.display(), count, "Loaded environment file"),
        Err(e) => debug!(path = %cli.env_file.display(), error = %e, "No environment file"),
    }
    let config = config.with_context(|| config_source(cli.config.as_deref()))?;

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config).await,
        Commands::Task(args) => commands::task::run(args, config).await,
        Commands::Scripts => commands::scripts::run(config),
        Commands::Config(args) => commands::config::run(args, config, cli.config.as_deref()),
        Commands::Version => Ok(()),
    }
}

fn config_source(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config".to_string(),
    }
}

/// Filter directive for the given verbosity.
pub fn filter_directive(logging: &LoggingConfig, verbose: u8) -> String {
    match verbose {
        0 => logging.level.clone(),
        1 => "nodus=debug".to_string(),
        _ => "nodus=trace".to_string(),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config.
pub fn init_logging(logging: &LoggingConfig, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter_directive(logging, verbose).into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}
