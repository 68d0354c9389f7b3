//! WebSocket session to the platform event gateway.
//!
//! The session dials the gateway, waits for Hello, then identifies once
//! and pulses heartbeats at the interval the server asked for. Dispatches
//! are republished on the [`EventBus`]. When the socket closes the session
//! reconnects under its [`ReconnectPolicy`], reusing the same token and URL.

use crate::error::DiscordError;
use crate::events::{DispatchEvent, EventBus, GatewayEvent};
use crate::protocol::{gateway_url, opcode, GatewayPayload, DEFAULT_INTENTS};
use crate::Result;
use futures::{SinkExt, StreamExt};
use nodus_core::config::DiscordConfig;
use nodus_core::{ReconnectPolicy, SecretString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Gateway session parameters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: SecretString,
    /// Base gateway URL as returned by `GET /gateway`.
    pub url: String,
    pub version: u8,
    pub intents: u64,
    pub reconnect: ReconnectPolicy,
    /// Recycle the socket after this many unacknowledged heartbeats.
    pub max_missed_acks: Option<u32>,
}

impl GatewayConfig {
    pub fn new(token: SecretString, url: impl Into<String>) -> Self {
        Self {
            token,
            url: url.into(),
            version: 10,
            intents: DEFAULT_INTENTS,
            reconnect: ReconnectPolicy::default(),
            max_missed_acks: None,
        }
    }

    /// Take everything but the URL from the bot configuration.
    pub fn from_discord(config: &DiscordConfig, url: impl Into<String>) -> Self {
        Self {
            token: config.token.clone(),
            url: url.into(),
            version: config.gateway_version,
            intents: config.intents,
            reconnect: config.reconnect.clone(),
            max_missed_acks: config.max_missed_heartbeat_acks,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_max_missed_acks(mut self, max: u32) -> Self {
        self.max_missed_acks = Some(max);
        self
    }

    pub fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Socket open, waiting for Hello.
    Connected,
    /// Identify was sent.
    Identified,
    /// The supervisor exited.
    Stopped,
}

/// Why a connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    Closed(Option<String>),
    Errored(String),
    ReconnectRequested,
    MissedAcks(u32),
    Shutdown,
}

/// What the read loop should do after a payload.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Reconnect,
}

/// Per-socket state. Replaced wholesale on reconnect.
#[derive(Debug, Default)]
struct Connection {
    heartbeat: Option<Interval>,
    identified: bool,
    unacked: u32,
    outbox: Vec<GatewayPayload>,
}

impl Connection {
    async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
        match heartbeat {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Handle to a running gateway session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: GatewayConfig,
    bus: EventBus,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    heartbeat_interval_ms: AtomicU64,
    sequence: AtomicU64,
}

impl GatewaySession {
    /// Start the session in the background.
    pub fn connect(config: GatewayConfig, bus: EventBus) -> Result<Self> {
        // Fail fast on a bad URL instead of retrying it forever
        let url = gateway_url(&config.url, config.version)?;
        let inner = Arc::new(Inner::new(config, bus));
        tokio::spawn(Inner::supervise(inner.clone(), url));
        Ok(Self { inner })
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Wait until Identify was sent on the current connection.
    pub async fn wait_identified(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, SessionState::Identified | SessionState::Stopped))
            .await
            .map_err(|_| DiscordError::NotConnected)?;
        match *state {
            SessionState::Identified => Ok(()),
            _ => Err(DiscordError::NotConnected),
        }
    }

    /// Interval from the most recent Hello.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.inner.heartbeat_interval_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Sequence number of the last dispatch seen.
    pub fn last_sequence(&self) -> Option<u64> {
        match self.inner.sequence.load(Ordering::Relaxed) {
            0 => None,
            s => Some(s),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn new(config: GatewayConfig, bus: EventBus) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            bus,
            state,
            cancel: CancellationToken::new(),
            heartbeat_interval_ms: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    async fn supervise(inner: Arc<Inner>, url: String) {
        let policy = inner.config.reconnect.clone();
        let mut attempt: u32 = 0;

        loop {
            inner.state.send_replace(SessionState::Connecting);
            debug!(url = %url, "Connecting to gateway");

            let connect = tokio::select! {
                _ = inner.cancel.cancelled() => break,
                result = tokio_tungstenite::connect_async(url.as_str()) => result,
            };

            let end = match connect {
                Ok((socket, _)) => {
                    attempt = 0;
                    info!("Connected to gateway");
                    inner.run_connection(socket).await
                }
                Err(e) => ConnectionEnd::Errored(e.to_string()),
            };

            inner.state.send_replace(SessionState::Disconnected);

            match &end {
                ConnectionEnd::Shutdown => break,
                ConnectionEnd::Closed(reason) => {
                    info!(reason = reason.as_deref().unwrap_or(""), "Gateway connection closed")
                }
                ConnectionEnd::Errored(e) => error!(error = %e, "Gateway connection error"),
                ConnectionEnd::ReconnectRequested => info!("Gateway requested a reconnect"),
                ConnectionEnd::MissedAcks(missed) => {
                    warn!(missed, "Heartbeats not acknowledged, recycling gateway connection")
                }
            }

            attempt = attempt.saturating_add(1);
            if !policy.allows(attempt) {
                warn!(attempts = attempt - 1, "Gateway reconnect limit reached, giving up");
                break;
            }

            let delay = policy.delay_for(attempt);
            info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting to gateway");
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        inner.state.send_replace(SessionState::Stopped);
        debug!("Gateway supervisor stopped");
    }

    async fn run_connection<S>(&self, socket: tokio_tungstenite::WebSocketStream<S>) -> ConnectionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = socket.split();
        let mut conn = Connection::default();
        self.state.send_replace(SessionState::Connected);

        loop {
            let flow = tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }
                _ = Connection::next_heartbeat(&mut conn.heartbeat) => self.on_heartbeat_tick(&mut conn),
                message = stream.next() => match message {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<GatewayPayload>(&text) {
                        Ok(payload) => self.handle_payload(&mut conn, payload),
                        Err(e) => {
                            warn!(error = %e, "Failed to parse gateway payload");
                            Flow::Continue
                        }
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        return ConnectionEnd::Closed(frame.map(|f| format!("{} {}", f.code, f.reason)));
                    }
                    Some(Ok(_)) => Flow::Continue,
                    Some(Err(e)) => return ConnectionEnd::Errored(e.to_string()),
                    None => return ConnectionEnd::Closed(None),
                },
            };

            for payload in conn.outbox.drain(..) {
                let text = match payload.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "Failed to encode gateway payload");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    return ConnectionEnd::Errored(e.to_string());
                }
                if payload.op == opcode::IDENTIFY {
                    self.state.send_replace(SessionState::Identified);
                }
            }

            if flow == Flow::Reconnect {
                let _ = sink.send(WsMessage::Close(None)).await;
                return match self.config.max_missed_acks {
                    Some(max) if conn.unacked >= max => ConnectionEnd::MissedAcks(conn.unacked),
                    _ => ConnectionEnd::ReconnectRequested,
                };
            }
        }
    }

    fn on_heartbeat_tick(&self, conn: &mut Connection) -> Flow {
        if let Some(max) = self.config.max_missed_acks {
            if conn.unacked >= max {
                return Flow::Reconnect;
            }
        }
        conn.unacked += 1;
        conn.outbox.push(GatewayPayload::heartbeat());
        Flow::Continue
    }

    /// Process one inbound payload, queueing any replies on `conn`.
    fn handle_payload(&self, conn: &mut Connection, payload: GatewayPayload) -> Flow {
        match payload.op {
            opcode::HELLO => {
                let Some(hello) = payload.hello() else {
                    warn!("Hello without a heartbeat interval");
                    return Flow::Continue;
                };
                if hello.heartbeat_interval == 0 {
                    warn!("Hello with a zero heartbeat interval");
                    return Flow::Continue;
                }
                let period = Duration::from_millis(hello.heartbeat_interval);
                self.heartbeat_interval_ms
                    .store(hello.heartbeat_interval, Ordering::Relaxed);
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                conn.heartbeat = Some(interval);
                debug!(interval_ms = hello.heartbeat_interval, "Received Hello");

                if !conn.identified {
                    match GatewayPayload::identify(self.config.token.expose_secret(), self.config.intents) {
                        Ok(identify) => {
                            conn.outbox.push(identify);
                            conn.identified = true;
                        }
                        Err(e) => error!(error = %e, "Failed to build Identify"),
                    }
                }
            }
            opcode::HEARTBEAT_ACK => conn.unacked = 0,
            opcode::HEARTBEAT => conn.outbox.push(GatewayPayload::heartbeat()),
            opcode::RECONNECT => return Flow::Reconnect,
            opcode::INVALID_SESSION => warn!(resumable = %payload.d, "Gateway session invalidated"),
            opcode::DISPATCH => self.dispatch(payload),
            other => debug!(op = other, "Ignoring gateway opcode"),
        }
        Flow::Continue
    }

    fn dispatch(&self, payload: GatewayPayload) {
        if let Some(s) = payload.s {
            self.sequence.store(s, Ordering::Relaxed);
        }
        let Some(name) = payload.t else {
            debug!("Dispatch without an event name");
            return;
        };

        let typed = GatewayEvent::from_dispatch(&name, &payload.d);
        self.bus.emit(&GatewayEvent::Raw(DispatchEvent {
            name,
            sequence: payload.s,
            data: payload.d,
        }));
        if let Some(event) = typed {
            self.bus.emit(&event);
        }
    }
}
