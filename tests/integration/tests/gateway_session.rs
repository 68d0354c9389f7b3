//! Gateway session against a loopback fake gateway.

use nodus_core::{ReconnectPolicy, SecretString};
use nodus_discord::{EventBus, GatewayConfig, GatewayEvent, GatewaySession, SessionState};
use nodus_integration_tests::{within, FakeGateway};
use serde_json::json;
use std::time::Duration;

fn config(url: String) -> GatewayConfig {
    GatewayConfig::new(SecretString::new("secret-token"), url)
        .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(50)))
}

#[tokio::test]
async fn test_identify_once_then_heartbeats() {
    let gateway = FakeGateway::bind().await;
    let session = GatewaySession::connect(config(gateway.url()), EventBus::new()).unwrap();
    let mut conn = gateway.accept().await;

    conn.hello(50).await;
    let identify = conn.recv().await;
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "secret-token");
    assert_eq!(identify["d"]["intents"], 53608447);
    assert_eq!(identify["d"]["properties"]["$browser"], "nodus");
    within(session.wait_identified()).await.unwrap();

    for _ in 0..3 {
        assert_eq!(conn.recv().await, json!({"op": 1, "d": null}));
    }
    assert_eq!(session.heartbeat_interval(), Some(Duration::from_millis(50)));
    session.shutdown();
}

#[tokio::test]
async fn test_server_heartbeat_request_is_answered() {
    let gateway = FakeGateway::bind().await;
    let session = GatewaySession::connect(config(gateway.url()), EventBus::new()).unwrap();
    let mut conn = gateway.accept().await;

    conn.hello(60_000).await;
    assert_eq!(conn.recv().await["op"], 2);
    conn.send(json!({"op": 1, "d": null})).await;
    assert_eq!(conn.recv().await, json!({"op": 1, "d": null}));
    session.shutdown();
}

#[tokio::test]
async fn test_dispatch_reaches_bus() {
    let gateway = FakeGateway::bind().await;
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let session = GatewaySession::connect(config(gateway.url()), bus).unwrap();
    let mut conn = gateway.accept().await;

    conn.hello(60_000).await;
    conn.recv().await;
    conn.send(json!({
        "op": 0,
        "s": 1,
        "t": "MESSAGE_CREATE",
        "d": {"id": "m1", "channel_id": "c1", "content": "hello", "author": {"id": "u1", "username": "alice"}}
    }))
    .await;

    match within(events.recv()).await.unwrap() {
        GatewayEvent::Raw(raw) => assert_eq!(raw.name, "MESSAGE_CREATE"),
        other => panic!("unexpected {:?}", other),
    }
    match within(events.recv()).await.unwrap() {
        GatewayEvent::MessageCreate(message) => {
            assert_eq!(message.content, "hello");
            assert_eq!(message.author.username, "alice");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(session.last_sequence(), Some(1));
    session.shutdown();
}

#[tokio::test]
async fn test_reconnects_after_close() {
    let gateway = FakeGateway::bind().await;
    let session = GatewaySession::connect(config(gateway.url()), EventBus::new()).unwrap();

    let mut conn = gateway.accept().await;
    conn.hello(60_000).await;
    assert_eq!(conn.recv().await["op"], 2);
    conn.close().await;

    // Same token on the fresh connection, identified again
    let mut conn = gateway.accept().await;
    conn.hello(60_000).await;
    let identify = conn.recv().await;
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "secret-token");
    session.shutdown();
}

#[tokio::test]
async fn test_reconnect_opcode() {
    let gateway = FakeGateway::bind().await;
    let session = GatewaySession::connect(config(gateway.url()), EventBus::new()).unwrap();

    let mut conn = gateway.accept().await;
    conn.hello(60_000).await;
    conn.recv().await;
    conn.send(json!({"op": 7, "d": null})).await;
    conn.closed().await;

    let mut conn = gateway.accept().await;
    conn.hello(60_000).await;
    assert_eq!(conn.recv().await["op"], 2);
    session.shutdown();
}

#[tokio::test]
async fn test_missed_acks_recycle_connection() {
    let gateway = FakeGateway::bind().await;
    let session =
        GatewaySession::connect(config(gateway.url()).with_max_missed_acks(2), EventBus::new()).unwrap();

    let mut conn = gateway.accept().await;
    conn.hello(30).await;
    assert_eq!(conn.recv().await["op"], 2);
    // Never ack: two pulses, then the client gives up on this socket
    assert_eq!(conn.recv().await["op"], 1);
    assert_eq!(conn.recv().await["op"], 1);
    conn.closed().await;

    let mut conn = gateway.accept().await;
    conn.hello(30).await;
    assert_eq!(conn.recv().await["op"], 2);
    // Acked pulses keep the socket alive
    for _ in 0..4 {
        assert_eq!(conn.recv().await["op"], 1);
        conn.send(json!({"op": 11})).await;
    }
    assert_eq!(session.state(), SessionState::Identified);
    session.shutdown();
}

#[tokio::test]
async fn test_shutdown_stops_session() {
    let gateway = FakeGateway::bind().await;
    let session = GatewaySession::connect(config(gateway.url()), EventBus::new()).unwrap();
    let mut conn = gateway.accept().await;
    conn.hello(60_000).await;
    conn.recv().await;

    let mut state = session.subscribe_state();
    session.shutdown();
    conn.closed().await;
    within(state.wait_for(|s| *s == SessionState::Stopped)).await.unwrap();
}

#[test]
fn test_rejects_non_websocket_url() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    assert!(GatewaySession::connect(config("https://example.com".into()), EventBus::new()).is_err());
}
