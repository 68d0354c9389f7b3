//! Path resolution utilities.

use crate::env::{get_var, vars};
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Nodus base directory (`$NODUS_HOME` or `~/.nodus`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = get_var(vars::NODUS_HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".nodus"))
}

/// Get the main config file path (`~/.nodus/nodus.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("nodus.json5"))
}

/// Get the default scripts directory (`~/.nodus/scripts`).
pub fn scripts_dir() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("scripts"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/scripts");
        assert!(!expanded.to_string_lossy().contains('~'));
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_config_file_name() {
        let path = config_file().unwrap();
        assert!(path.ends_with("nodus.json5"));
    }
}
