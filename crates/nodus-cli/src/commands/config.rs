//! Configuration management commands.

use clap::Args;
use nodus_core::config::Config;
use nodus_core::paths;
use std::path::Path;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (token masked)
    Show,

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

/// Effective configuration as JSON with the token replaced by its hint.
pub fn redacted(config: &Config) -> anyhow::Result<serde_json::Value> {
    let mut json = serde_json::to_value(config)?;
    if !config.discord.token.is_empty() {
        json["discord"]["token"] = serde_json::Value::String(config.discord.token.hint());
    }
    Ok(json)
}

/// Run the config command.
pub fn run(args: ConfigArgs, config: Config, path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
        }

        ConfigCommand::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", paths::config_file()?.display()),
        },

        ConfigCommand::Validate => match config.validate() {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => anyhow::bail!("Configuration error: {}", e),
        },
    }

    Ok(())
}
