//! Loopback fakes of the Tickrate service and the platform gateway.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use nodus_tickrate::FrameCodec;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::codec::Framed;

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Run `future` under [`WAIT`], panicking on timeout.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out")
}

/// Address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Write `name` into `dir` as a task script.
pub fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

/// Fake Tickrate server.
pub struct FakeTickrate {
    listener: TcpListener,
}

impl FakeTickrate {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    pub async fn accept(&self) -> TickrateConn {
        let (stream, _) = within(self.listener.accept()).await.unwrap();
        TickrateConn {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }
}

/// One accepted client connection.
pub struct TickrateConn {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TickrateConn {
    pub async fn recv(&mut self) -> Value {
        let frame = within(self.framed.next()).await.unwrap().unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    pub async fn send(&mut self, value: Value) {
        let bytes = Bytes::from(serde_json::to_vec(&value).unwrap());
        self.framed.send(bytes).await.unwrap();
    }

    /// Write bytes as-is, bypassing the codec.
    pub async fn send_raw(&mut self, raw: &[u8]) {
        self.framed.get_mut().write_all(raw).await.unwrap();
    }

    /// Wait until the client closes its side.
    pub async fn closed(&mut self) {
        loop {
            match within(self.framed.next()).await {
                None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Answer every command with the result of `respond` until the
    /// connection closes.
    pub async fn serve<F>(mut self, respond: F)
    where
        F: Fn(&Value) -> Value,
    {
        while let Some(Ok(frame)) = self.framed.next().await {
            let request: Value = serde_json::from_slice(&frame).unwrap();
            if request["type"] != "command" {
                continue;
            }
            let reply = serde_json::json!({
                "id": request["id"],
                "type": "task_result",
                "data": respond(&request["data"]["data"]["args"]),
            });
            self.send(reply).await;
        }
    }
}

/// Fake gateway server.
pub struct FakeGateway {
    listener: TcpListener,
}

impl FakeGateway {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.listener.local_addr().unwrap())
    }

    pub async fn accept(&self) -> GatewayConn {
        let (stream, _) = within(self.listener.accept()).await.unwrap();
        let ws = within(tokio_tungstenite::accept_async(stream)).await.unwrap();
        GatewayConn { ws }
    }
}

/// One accepted gateway client.
pub struct GatewayConn {
    ws: WebSocketStream<TcpStream>,
}

impl GatewayConn {
    pub async fn send(&mut self, value: Value) {
        self.ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    pub async fn hello(&mut self, interval_ms: u64) {
        self.send(serde_json::json!({"op": 10, "d": {"heartbeat_interval": interval_ms}}))
            .await;
    }

    /// Next text payload from the client.
    pub async fn recv(&mut self) -> Value {
        loop {
            match within(self.ws.next()).await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("gateway client went away: {:?}", other),
            }
        }
    }

    /// Wait for the client to close the socket.
    pub async fn closed(&mut self) {
        loop {
            match within(self.ws.next()).await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
