//! Run the bot.

use super::{connect_tickrate, load_catalog};
use anyhow::Context as _;
use clap::Args;
use nodus_core::Config;
use nodus_discord::{Bot, EventKind, GatewayEvent};
use std::time::Duration;
use tracing::info;

/// Run command arguments.
#[derive(Args)]
pub struct RunArgs {
    /// Seconds to wait for the first Tickrate connection
    #[arg(long, default_value = "30")]
    pub connect_timeout: u64,
}

/// Run the bot until Ctrl-C.
pub async fn run(args: RunArgs, config: Config) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;
    let catalog = load_catalog(&config)?;
    let client = connect_tickrate(&config, Duration::from_secs(args.connect_timeout)).await?;

    let bot = Bot::from_tickrate(config.discord.clone(), client.clone(), catalog);
    bot.on(EventKind::MessageCreate, |event| {
        if let GatewayEvent::MessageCreate(message) = event {
            info!(
                channel = %message.channel_id,
                author = %message.author.display_name(),
                "{}",
                message.content
            );
        }
    });

    let user = bot.login().await.context("Login failed")?;
    bot.connect_gateway().await.context("Failed to open gateway session")?;
    info!(user = %user.display_name(), "Bot is running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    bot.shutdown();
    client.shutdown();
    Ok(())
}
