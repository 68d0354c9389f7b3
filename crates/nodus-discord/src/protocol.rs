//! Gateway wire protocol.

use crate::error::DiscordError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Gateway opcodes.
pub mod opcode {
    /// An event was dispatched.
    pub const DISPATCH: u8 = 0;
    /// Liveness pulse (either direction).
    pub const HEARTBEAT: u8 = 1;
    /// Session handshake.
    pub const IDENTIFY: u8 = 2;
    /// Server asks the client to reconnect.
    pub const RECONNECT: u8 = 7;
    /// The session was invalidated.
    pub const INVALID_SESSION: u8 = 9;
    /// First frame after connecting; carries the heartbeat interval.
    pub const HELLO: u8 = 10;
    /// Server acknowledged a heartbeat.
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Recognized dispatch event names.
pub mod dispatch {
    pub const READY: &str = "READY";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const INTERACTION_CREATE: &str = "INTERACTION_CREATE";
}

/// Default intents bitmask.
pub const DEFAULT_INTENTS: u64 = 53_608_447;

/// Client identification strings sent with Identify.
pub const CLIENT_OS: &str = "linux";
pub const CLIENT_NAME: &str = "nodus";

/// One gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode.
    pub op: u8,

    /// Event data; serialized as `null` when absent.
    #[serde(default)]
    pub d: Value,

    /// Sequence number (dispatch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Data of a Hello frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Hello {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

#[derive(Debug, Serialize)]
struct IdentifyData<'a> {
    token: &'a str,
    intents: u64,
    properties: IdentifyProperties,
}

#[derive(Debug, Serialize)]
struct IdentifyProperties {
    #[serde(rename = "$os")]
    os: &'static str,
    #[serde(rename = "$browser")]
    browser: &'static str,
    #[serde(rename = "$device")]
    device: &'static str,
}

impl GatewayPayload {
    /// Heartbeat pulse: `{"op":1,"d":null}`.
    pub fn heartbeat() -> Self {
        Self {
            op: opcode::HEARTBEAT,
            d: Value::Null,
            s: None,
            t: None,
        }
    }

    /// Identify handshake.
    pub fn identify(token: &str, intents: u64) -> Result<Self, serde_json::Error> {
        let data = IdentifyData {
            token,
            intents,
            properties: IdentifyProperties {
                os: CLIENT_OS,
                browser: CLIENT_NAME,
                device: CLIENT_NAME,
            },
        };
        Ok(Self {
            op: opcode::IDENTIFY,
            d: serde_json::to_value(data)?,
            s: None,
            t: None,
        })
    }

    /// Parse the Hello data.
    pub fn hello(&self) -> Option<Hello> {
        if self.op != opcode::HELLO {
            return None;
        }
        serde_json::from_value(self.d.clone()).ok()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Append the protocol version and encoding to a gateway URL.
pub fn gateway_url(base: &str, version: u8) -> Result<String, DiscordError> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(DiscordError::InvalidResponse(format!(
                "gateway URL must be ws:// or wss://, got {}://",
                other
            )))
        }
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("v", &version.to_string())
        .append_pair("encoding", "json");
    Ok(url.into())
}
