//! CLI command implementations.

pub mod config;
pub mod run;
pub mod scripts;
pub mod task;

use anyhow::Context as _;
use nodus_core::Config;
use nodus_tickrate::{ScriptCatalog, TickrateClient};
use std::time::Duration;
use tracing::info;

/// Load the task scripts. Having none is fatal.
pub(crate) fn load_catalog(config: &Config) -> anyhow::Result<ScriptCatalog> {
    let dir = config.scripts_dir()?;
    let catalog = ScriptCatalog::load(&dir)
        .with_context(|| format!("Cannot start without task scripts in {}", dir.display()))?;
    info!(dir = %dir.display(), count = catalog.names().len(), "Loaded task scripts");
    Ok(catalog)
}

/// Start the task service client and wait for the first connection.
pub(crate) async fn connect_tickrate(config: &Config, timeout: Duration) -> anyhow::Result<TickrateClient> {
    let client = TickrateClient::from_config(&config.tickrate);
    let addr = format!("{}:{}", config.tickrate.host, config.tickrate.port);

    match tokio::time::timeout(timeout, client.wait_connected()).await {
        Ok(Ok(())) => Ok(client),
        Ok(Err(e)) => {
            client.shutdown();
            Err(e).with_context(|| format!("Tickrate client stopped before connecting to {}", addr))
        }
        Err(_) => {
            client.shutdown();
            anyhow::bail!("Timed out connecting to Tickrate server at {}", addr)
        }
    }
}
