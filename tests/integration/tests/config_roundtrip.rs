//! Config save/load roundtrip integration tests.

use nodus_core::config::Config;
use nodus_core::{Backoff, ReconnectPolicy, SecretString};
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodus.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.tickrate.port, config.tickrate.port);
    assert_eq!(loaded.tickrate.idle_timeout_ms, 12_000);
    assert_eq!(loaded.discord.message_expiry_ms, 400_000);
    assert_eq!(loaded.discord.reconnect, ReconnectPolicy::default());
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodus.json5");

    let mut config = Config::default();
    config.tickrate.port = 9090;
    config.discord.token = SecretString::new("abc");
    config.discord.max_missed_heartbeat_acks = Some(3);
    config.discord.reconnect = ReconnectPolicy::default()
        .with_max_attempts(5)
        .with_backoff(Backoff::Exponential {
            factor: 2.0,
            max_delay_ms: 60_000,
        });
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.tickrate.port, 9090);
    assert_eq!(loaded.discord.token.expose_secret(), "abc");
    assert_eq!(loaded.discord.max_missed_heartbeat_acks, Some(3));
    assert_eq!(loaded.discord.reconnect, config.discord.reconnect);
}

#[test]
fn test_config_json5_comments() {
    let config = Config::parse(
        r#"{
            // local service
            tickrate: { host: "10.0.0.5", port: 7000 },
            discord: { intents: 513, },
        }"#,
    )
    .unwrap();
    assert_eq!(config.tickrate.host, "10.0.0.5");
    assert_eq!(config.tickrate.port, 7000);
    assert_eq!(config.discord.intents, 513);
    assert_eq!(config.discord.gateway_version, 10);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/nodus.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    assert!(Config::parse("not valid json").is_err());
}
