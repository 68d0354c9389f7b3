//! Configuration loading and persistence.

use super::Config;
use crate::env::{get_u16, get_var, vars};
use crate::error::ConfigError;
use crate::paths;
use crate::secret::SecretString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load from `path` when given, else from the default path, falling back
    /// to defaults when no file exists. Environment overrides are applied last.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::load_default() {
                Ok(config) => config,
                Err(ConfigError::NotFound(path)) => {
                    debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
                Err(e) => return Err(e),
            },
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Apply `DISCORD_TOKEN`, `TICKRATE_HOST`, `TICKRATE_PORT`, `SCRIPTS_DIR`.
    pub fn apply_env(&mut self) {
        if let Some(token) = get_var(vars::DISCORD_TOKEN) {
            self.discord.token = SecretString::new(token);
        }
        if let Some(host) = get_var(vars::TICKRATE_HOST) {
            self.tickrate.host = host;
        }
        if let Some(port) = get_u16(vars::TICKRATE_PORT) {
            self.tickrate.port = port;
        }
        if let Some(dir) = get_var(vars::SCRIPTS_DIR) {
            self.scripts.dir = Some(paths::expand_tilde(&dir));
        }
    }

    /// Directory the task scripts are loaded from.
    pub fn scripts_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.scripts.dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::scripts_dir(),
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.tickrate.host.trim().is_empty() {
            errors.push("Tickrate host cannot be empty".to_string());
        }
        if self.tickrate.port == 0 {
            errors.push("Tickrate port cannot be 0".to_string());
        }
        if self.tickrate.idle_timeout_ms == 0 {
            errors.push("Tickrate idle_timeout_ms cannot be 0".to_string());
        }
        if self.tickrate.reconnect.delay_ms == 0 {
            errors.push("Tickrate reconnect delay cannot be 0".to_string());
        }

        if self.discord.token.is_empty() {
            errors.push("Discord token is not set (config or DISCORD_TOKEN)".to_string());
        }
        if self.discord.api_script.trim().is_empty() {
            errors.push("Discord api_script cannot be empty".to_string());
        }
        if self.discord.message_expiry_ms == 0 {
            errors.push("Discord message_expiry_ms cannot be 0".to_string());
        }
        if self.discord.reconnect.delay_ms == 0 {
            errors.push("Discord reconnect delay cannot be 0".to_string());
        }
        if self.discord.max_missed_heartbeat_acks == Some(0) {
            errors.push("max_missed_heartbeat_acks must be at least 1".to_string());
        }

        match self.scripts_dir() {
            Ok(dir) if !dir.is_dir() => {
                errors.push(format!("Scripts directory not found: {}", dir.display()));
            }
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}
