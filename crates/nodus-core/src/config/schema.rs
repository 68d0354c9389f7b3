//! Configuration schema definitions.

use crate::retry::ReconnectPolicy;
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main Nodus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote task service connection.
    #[serde(default)]
    pub tickrate: TickrateConfig,

    /// Chat platform gateway and REST settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Task script discovery.
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Task service client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickrateConfig {
    /// Service host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Service port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix for correlation ids (`<prefix>-<n>`).
    #[serde(default = "default_client_prefix")]
    pub client_prefix: String,

    /// Idle-read timeout in milliseconds.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_client_prefix() -> String {
    "client".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    12_000
}

impl Default for TickrateConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_prefix: default_client_prefix(),
            idle_timeout_ms: default_idle_timeout_ms(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Chat platform configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token.
    #[serde(default)]
    pub token: SecretString,

    /// REST base URL. Requests are tunneled through the task service,
    /// so this is passed along to the API script rather than dialed.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Gateway intents bitmask sent in Identify.
    #[serde(default = "default_intents")]
    pub intents: u64,

    /// Gateway protocol version.
    #[serde(default = "default_gateway_version")]
    pub gateway_version: u8,

    /// Task script that performs REST calls.
    #[serde(default = "default_api_script")]
    pub api_script: String,

    /// How long inbound messages stay cached, in milliseconds.
    #[serde(default = "default_message_expiry_ms")]
    pub message_expiry_ms: u64,

    /// Force a reconnect after this many unacknowledged heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_missed_heartbeat_acks: Option<u32>,

    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_intents() -> u64 {
    53_608_447
}

fn default_gateway_version() -> u8 {
    10
}

fn default_api_script() -> String {
    "api_request.lua".to_string()
}

fn default_message_expiry_ms() -> u64 {
    400_000
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: SecretString::default(),
            api_base: default_api_base(),
            intents: default_intents(),
            gateway_version: default_gateway_version(),
            api_script: default_api_script(),
            message_expiry_ms: default_message_expiry_ms(),
            max_missed_heartbeat_acks: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Task script configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Directory holding `*.lua` task scripts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "nodus=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
