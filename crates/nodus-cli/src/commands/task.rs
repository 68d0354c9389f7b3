//! One-shot task submission.

use super::{connect_tickrate, load_catalog};
use anyhow::Context as _;
use clap::Args;
use nodus_core::Config;
use serde_json::Value;
use std::time::Duration;

/// Task command arguments.
#[derive(Args)]
pub struct TaskArgs {
    /// Script file name, e.g. `ping.lua`
    pub script: String,

    /// Arguments as a JSON object
    #[arg(short, long)]
    pub args: Option<String>,

    /// Seconds to wait for the connection and for the result
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

/// Parse `--args`; absent means an empty object.
pub fn parse_args(raw: Option<&str>) -> anyhow::Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => serde_json::from_str(raw).context("--args must be valid JSON"),
    }
}

/// Submit the task and print its result.
pub async fn run(args: TaskArgs, config: Config) -> anyhow::Result<()> {
    let task_args = parse_args(args.args.as_deref())?;
    let catalog = load_catalog(&config)?;
    if !catalog.contains(&args.script) {
        anyhow::bail!(
            "Unknown script '{}'. Available: {}",
            args.script,
            catalog.names().join(", ")
        );
    }

    let timeout = Duration::from_secs(args.timeout);
    let client = connect_tickrate(&config, timeout).await?;
    let result = tokio::time::timeout(timeout, client.run_script(&catalog, &args.script, task_args)).await;
    client.shutdown();

    let value = result
        .map_err(|_| anyhow::anyhow!("Timed out waiting for {}", args.script))?
        .with_context(|| format!("Task {} failed", args.script))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(None).unwrap(), json!({}));
        assert_eq!(parse_args(Some(r#"{"a":[1,2]}"#)).unwrap(), json!({"a": [1, 2]}));
        assert!(parse_args(Some("{oops")).is_err());
    }
}
