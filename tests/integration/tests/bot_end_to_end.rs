//! The bot wired to both fakes: REST tunneled through the task service,
//! events from the gateway, collectors on top.

use nodus_core::config::DiscordConfig;
use nodus_core::{ReconnectPolicy, SecretString};
use nodus_discord::{Bot, CollectorEvent, CollectorOptions, EndReason, GatewayConfig};
use nodus_integration_tests::{within, write_script, FakeGateway, FakeTickrate};
use nodus_tickrate::{ClientConfig, ScriptCatalog, TickrateClient};
use serde_json::{json, Value};
use std::time::Duration;

/// Plays the API script: answers with platform JSON encoded as a string.
fn api(args: &Value) -> Value {
    let custom = &args["custom_args"];
    let body = match (custom["method"].as_str(), custom["endpoint"].as_str()) {
        (Some("GET"), Some("/users/@me")) => json!({"id": "99", "username": "nodus", "bot": true}),
        (Some("POST"), Some("/channels/c1/messages")) => {
            json!({"id": "sent", "channel_id": "c1", "content": custom["body"]["content"]})
        }
        (Some("GET"), Some("/channels/missing")) => json!({"message": "Unknown Channel", "code": 10003}),
        _ => Value::Null,
    };
    Value::String(body.to_string())
}

async fn setup() -> (Bot, TickrateClient, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "api_request.lua", "-- http bridge");
    let catalog = ScriptCatalog::load(dir.path()).unwrap();

    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(
        ClientConfig::new("127.0.0.1", server.port())
            .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(50))),
    );
    let conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();
    tokio::spawn(conn.serve(api));

    let config = DiscordConfig {
        token: SecretString::new("bot-token"),
        ..Default::default()
    };
    (Bot::from_tickrate(config, client.clone(), catalog), client, dir)
}

#[tokio::test]
async fn test_login_and_send_through_task_service() {
    let (bot, client, _dir) = setup().await;

    let user = within(bot.login()).await.unwrap();
    assert_eq!(user.id, "99");

    let channel = nodus_discord::Channel {
        id: "c1".into(),
        ..Default::default()
    };
    let sent = within(channel.send(bot.rest(), "hi")).await.unwrap();
    assert_eq!(sent.id, "sent");
    assert_eq!(sent.content, "hi");

    let err = within(bot.fetch_channel("missing")).await.unwrap_err();
    assert_eq!(err.to_string(), "API error 10003: Unknown Channel");

    bot.shutdown();
    client.shutdown();
}

#[tokio::test]
async fn test_gateway_messages_feed_cache_and_collector() {
    let (bot, client, _dir) = setup().await;
    let gateway = FakeGateway::bind().await;

    let config = GatewayConfig::new(SecretString::new("bot-token"), gateway.url());
    let session = bot.start_gateway(config).unwrap();
    let mut conn = gateway.accept().await;
    conn.hello(60_000).await;
    assert_eq!(conn.recv().await["d"]["token"], "bot-token");
    within(session.wait_identified()).await.unwrap();

    let mut collector = bot.create_message_collector(
        "c1",
        CollectorOptions::new().max(2).time(Duration::from_secs(10)),
    );

    for (id, channel) in [("1", "c1"), ("2", "other"), ("3", "c1")] {
        conn.send(json!({
            "op": 0,
            "t": "MESSAGE_CREATE",
            "d": {"id": id, "channel_id": channel, "content": format!("msg {}", id)}
        }))
        .await;
    }

    let mut collected = Vec::new();
    loop {
        match within(collector.next()).await {
            Some(CollectorEvent::Collect(message)) => collected.push(message.id),
            Some(CollectorEvent::End(end)) => {
                assert_eq!(end.reason, EndReason::Limit);
                break;
            }
            None => panic!("collector closed without end"),
        }
    }
    assert_eq!(collected, vec!["1", "3"]);
    assert!(bot.cache().message("2").is_some());

    bot.shutdown();
    client.shutdown();
}
