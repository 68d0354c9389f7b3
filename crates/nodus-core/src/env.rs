//! Environment variable handling.

use std::env;
use std::path::Path;

/// Variables read by the bot at startup.
pub mod vars {
    /// Gateway bot token.
    pub const DISCORD_TOKEN: &str = "DISCORD_TOKEN";

    /// Task service host.
    pub const TICKRATE_HOST: &str = "TICKRATE_HOST";

    /// Task service port.
    pub const TICKRATE_PORT: &str = "TICKRATE_PORT";

    /// Directory holding the task scripts.
    pub const SCRIPTS_DIR: &str = "SCRIPTS_DIR";

    /// Config file override.
    pub const NODUS_CONFIG: &str = "NODUS_CONFIG";

    /// Home directory override.
    pub const NODUS_HOME: &str = "NODUS_HOME";
}

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Load `KEY=value` pairs from a dotenv file.
///
/// Variables already present in the process environment win.
pub fn load_dotenv(path: &Path) -> Result<usize, std::io::Error> {
    if !path.exists() {
        return Ok(0);
    }

    let content = std::fs::read_to_string(path)?;
    let mut loaded = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var(&key).is_err() {
            env::set_var(&key, value);
            loaded += 1;
        }
    }
    Ok(loaded)
}

/// Parse dotenv content into key/value pairs.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            if !key.is_empty() {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv() {
        let pairs = parse_dotenv(
            "# comment\nDISCORD_TOKEN=\"abc\"\n\nexport TICKRATE_PORT=9000\nSCRIPTS_DIR='./scripts'\nbogus\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("DISCORD_TOKEN".to_string(), "abc".to_string()),
                ("TICKRATE_PORT".to_string(), "9000".to_string()),
                ("SCRIPTS_DIR".to_string(), "./scripts".to_string()),
            ]
        );
    }

    #[test]
    fn test_get_u16() {
        env::set_var("NODUS_TEST_PORT_OK", "8080");
        env::set_var("NODUS_TEST_PORT_BAD", "eighty");
        assert_eq!(get_u16("NODUS_TEST_PORT_OK"), Some(8080));
        assert_eq!(get_u16("NODUS_TEST_PORT_BAD"), None);
        assert_eq!(get_u16("NODUS_TEST_PORT_MISSING"), None);
    }

    #[test]
    fn test_load_dotenv_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NODUS_TEST_DOTENV_NEW=1\nNODUS_TEST_DOTENV_SET=file\n").unwrap();
        env::set_var("NODUS_TEST_DOTENV_SET", "process");

        let loaded = load_dotenv(&path).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(get_var("NODUS_TEST_DOTENV_NEW").as_deref(), Some("1"));
        assert_eq!(get_var("NODUS_TEST_DOTENV_SET").as_deref(), Some("process"));
    }

    #[test]
    fn test_load_dotenv_missing_file() {
        assert_eq!(load_dotenv(Path::new("/nonexistent/.env")).unwrap(), 0);
    }
}
