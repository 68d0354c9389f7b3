//! Task service client against a loopback fake server.

use nodus_core::ReconnectPolicy;
use nodus_integration_tests::{dead_addr, within, write_script, FakeTickrate};
use nodus_tickrate::{ClientConfig, ConnectionState, RpcError, ScriptCatalog, TickrateClient, FRAME_DELIMITER};
use serde_json::json;
use std::time::Duration;

fn fast(port: u16) -> ClientConfig {
    ClientConfig::new("127.0.0.1", port).with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(50)))
}

#[tokio::test]
async fn test_responses_are_correlated_out_of_order() {
    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(fast(server.port()));
    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();

    let first = client.submit_task("ping", "return 1", json!({"n": 1})).unwrap();
    let second = client.submit_task("ping", "return 2", json!({"n": 2})).unwrap();
    assert_eq!(first.id(), "client-0");
    assert_eq!(second.id(), "client-1");

    let a = conn.recv().await;
    let b = conn.recv().await;
    assert_eq!(
        a,
        json!({
            "id": "client-0",
            "type": "command",
            "data": {
                "type": "command",
                "data": {
                    "name": "add_task",
                    "args": {"task_name": "ping", "task_body": "return 1", "custom_args": {"n": 1}}
                }
            }
        })
    );
    assert_eq!(b["id"], "client-1");

    conn.send(json!({"id": "client-1", "type": "task_result", "data": {"pong": 2}})).await;
    conn.send(json!({"id": "unknown", "type": "task_result", "data": {}})).await;
    conn.send(json!({"id": "client-0", "type": "task_result", "data": {"pong": true}})).await;

    assert_eq!(within(first).await.unwrap(), json!({"pong": true}));
    assert_eq!(within(second).await.unwrap(), json!({"pong": 2}));
    assert_eq!(client.pending_count(), 0);
    client.shutdown();
}

#[tokio::test]
async fn test_remote_error_and_unknown_type() {
    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(fast(server.port()));
    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();

    let failing = client.submit_task("boom", "", json!({})).unwrap();
    let odd = client.submit_task("odd", "", json!({})).unwrap();
    conn.recv().await;
    conn.recv().await;
    conn.send(json!({"id": "client-0", "type": "error", "data": {"message": "script exploded"}}))
        .await;
    conn.send(json!({"id": "client-1", "type": "progress", "data": 50})).await;

    match within(failing).await {
        Err(RpcError::Remote(message)) => assert_eq!(message, "script exploded"),
        other => panic!("unexpected {:?}", other),
    }
    match within(odd).await {
        Err(RpcError::UnknownResponse { raw }) => assert_eq!(raw["type"], "progress"),
        other => panic!("unexpected {:?}", other),
    }
    client.shutdown();
}

#[tokio::test]
async fn test_heartbeat_is_echoed() {
    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(fast(server.port()));
    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();

    conn.send(json!({"id": "h1", "type": "heartbeat"})).await;
    assert_eq!(conn.recv().await, json!({"id": "h1", "type": "heartbeat_response"}));
    assert_eq!(client.pending_count(), 0);
    client.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_fails_oldest_request() {
    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(fast(server.port()));
    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();

    let oldest = client.submit_task("a", "", json!({})).unwrap();
    let newer = client.submit_task("b", "", json!({})).unwrap();
    conn.recv().await;
    conn.recv().await;

    conn.send_raw(b"{not json\x1e").await;
    match within(oldest).await {
        Err(RpcError::MalformedFrame { raw }) => assert_eq!(raw, "{not json"),
        other => panic!("unexpected {:?}", other),
    }

    conn.send(json!({"id": "client-1", "type": "task_result", "data": "ok"})).await;
    assert_eq!(within(newer).await.unwrap(), json!("ok"));
    client.shutdown();
}

#[tokio::test]
async fn test_disconnect_discards_pending_and_reconnects() {
    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(fast(server.port()));
    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();

    let lost = client.submit_task("slow", "", json!({})).unwrap();
    conn.recv().await;
    drop(conn);

    assert!(matches!(within(lost).await, Err(RpcError::Discarded { .. })));
    assert_eq!(client.pending_count(), 0);

    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();
    let retry = client.submit_task("slow", "", json!({})).unwrap();
    let request = conn.recv().await;
    assert_eq!(request["id"], retry.id());
    conn.send(json!({"id": retry.id(), "type": "task_result", "data": 1})).await;
    assert_eq!(within(retry).await.unwrap(), json!(1));
    client.shutdown();
}

#[tokio::test]
async fn test_idle_timeout_recycles_connection() {
    let server = FakeTickrate::bind().await;
    let config = fast(server.port()).with_idle_timeout(Duration::from_millis(200));
    let client = TickrateClient::connect(config);

    let mut first = server.accept().await;
    first.closed().await;
    let _second = server.accept().await;
    within(client.wait_connected()).await.unwrap();
    client.shutdown();
}

#[tokio::test]
async fn test_slow_frame_keeps_connection_alive() {
    let server = FakeTickrate::bind().await;
    let config = fast(server.port()).with_idle_timeout(Duration::from_millis(300));
    let client = TickrateClient::connect(config);
    let mut conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();

    let response = client.submit_task("slow", "", json!({})).unwrap();
    conn.recv().await;

    // Roughly a second on the wire, far past the idle timeout
    let reply = json!({"id": response.id(), "type": "task_result", "data": "done"}).to_string();
    for chunk in reply.as_bytes().chunks(5) {
        conn.send_raw(chunk).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    conn.send_raw(&[FRAME_DELIMITER]).await;

    assert_eq!(within(response).await.unwrap(), json!("done"));
    assert_eq!(client.state(), ConnectionState::Connected);
    client.shutdown();
}

#[tokio::test]
async fn test_not_connected_fails_fast() {
    let addr = dead_addr().await;
    let policy = ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2);
    let client = TickrateClient::connect(ClientConfig::new("127.0.0.1", addr.port()).with_reconnect(policy));

    assert!(matches!(
        client.submit_task("ping", "", json!({})),
        Err(RpcError::NotConnected)
    ));
    assert_eq!(client.pending_count(), 0);

    // Bounded policy: the supervisor gives up
    assert!(matches!(within(client.wait_connected()).await, Err(RpcError::NotConnected)));
    assert_eq!(client.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_run_script_from_catalog() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "echo.lua", "\u{feff}return args");
    let catalog = ScriptCatalog::load(dir.path()).unwrap();

    let server = FakeTickrate::bind().await;
    let client = TickrateClient::connect(fast(server.port()));
    let conn = server.accept().await;
    within(client.wait_connected()).await.unwrap();
    tokio::spawn(conn.serve(|args| {
        json!({"body": args["task_body"], "echo": args["custom_args"]})
    }));

    let result = within(client.run_script(&catalog, "echo.lua", json!({"x": 1}))).await.unwrap();
    assert_eq!(result, json!({"body": "return args", "echo": {"x": 1}}));

    assert!(within(client.run_script(&catalog, "missing.lua", json!({}))).await.is_err());
    client.shutdown();
}
