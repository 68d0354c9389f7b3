//! Correlated request/response client for the task service.
//!
//! One supervisor task per client owns the TCP connection. It reconnects
//! under the configured [`ReconnectPolicy`], answers server heartbeats, and
//! routes every `task_result`/`error` frame to the caller whose correlation
//! id it carries.
//!
//! Connection state machine:
//!
//! ```text
//! disconnected -> connecting -> connected -> (closed | errored) -> disconnected
//! ```
//!
//! Losing the connection drops every in-flight request. Their
//! [`TaskResponse`] futures resolve to [`RpcError::Discarded`]; nothing is
//! retried on the caller's behalf.

use crate::activity::{LastRead, ReadActivity};
use crate::codec::FrameCodec;
use crate::error::RpcError;
use crate::pending::{PendingTable, Reply};
use crate::scripts::ScriptCatalog;
use crate::wire::{MessageType, TaskArgs, TaskDescriptor, WireMessage};
use crate::Result;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use nodus_core::config::TickrateConfig;
use nodus_core::ReconnectPolicy;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service host.
    pub host: String,

    /// Service port.
    pub port: u16,

    /// Correlation id prefix.
    pub client_prefix: String,

    /// Destroy the connection after this long without receiving any bytes.
    pub idle_timeout: Duration,

    /// Reconnect schedule.
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Create a config for `host:port` with default timings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_client_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_prefix = prefix.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&TickrateConfig::default())
    }
}

impl From<&TickrateConfig> for ClientConfig {
    fn from(config: &TickrateConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            client_prefix: config.client_prefix.clone(),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            reconnect: config.reconnect.clone(),
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; a reconnect may be scheduled.
    Disconnected,
    /// Dialing the service.
    Connecting,
    /// Socket is live; requests are accepted.
    Connected,
    /// The supervisor exited (shutdown or retry limit reached).
    Stopped,
}

/// Why a connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    Closed,
    IdleTimeout,
    Errored(std::io::Error),
    Shutdown,
}

/// Handle to the task service. Cheap to clone.
#[derive(Clone)]
pub struct TickrateClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TickrateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickrateClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .finish()
    }
}

struct Inner {
    config: ClientConfig,

    /// In-flight requests. Always locked after `outbound` when both are held.
    pending: Mutex<PendingTable>,

    /// Writer queue of the live connection; `None` while disconnected.
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,

    /// Correlation id counter. Never reset, so ids are not reused across
    /// reconnects.
    counter: AtomicU64,

    state: watch::Sender<ConnectionState>,

    cancel: CancellationToken,
}

impl TickrateClient {
    /// Create the client and start connecting in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: ClientConfig) -> Self {
        let inner = Arc::new(Inner::new(config));
        tokio::spawn(Inner::supervise(inner.clone()));
        Self { inner }
    }

    /// Create from the `tickrate` config section.
    pub fn from_config(config: &TickrateConfig) -> Self {
        Self::connect(ClientConfig::from(config))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.outbound.lock().is_some()
    }

    /// Wait until the connection is up.
    ///
    /// Fails with [`RpcError::NotConnected`] if the supervisor stops first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Stopped))
            .await
            .map(|s| *s)
            .map_err(|_| RpcError::NotConnected)?;
        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(RpcError::NotConnected),
        }
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Stop the supervisor and drop the connection.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Submit a task for remote execution.
    ///
    /// Fails immediately with [`RpcError::NotConnected`] when there is no
    /// live connection; nothing is registered in that case. Otherwise the
    /// request is registered before it is queued for writing, so a response
    /// can never arrive for an id the client does not know yet.
    ///
    /// If the connection drops before a response arrives, the returned
    /// future resolves to [`RpcError::Discarded`]. The request is not resent.
    pub fn submit_task(&self, task_name: &str, task_body: &str, args: Value) -> Result<TaskResponse> {
        let outbound = self.inner.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(RpcError::NotConnected);
        };

        let id = self.inner.next_id();
        let descriptor = TaskDescriptor::add_task(TaskArgs {
            task_name: task_name.to_string(),
            task_body: task_body.to_string(),
            custom_args: args,
        })?;
        let payload = WireMessage::command(id.clone(), &descriptor)?.to_bytes()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.pending.lock().insert(id.clone(), reply_tx);

        if tx.send(payload).is_err() {
            // Writer already gone; the connection is tearing down
            self.inner.pending.lock().remove(&id);
            return Err(RpcError::NotConnected);
        }

        debug!(id = %id, task = task_name, "Submitted task");
        Ok(TaskResponse { id, rx: reply_rx })
    }

    /// Submit a task and wait for its result.
    pub async fn run_task(&self, task_name: &str, task_body: &str, args: Value) -> Result<Value> {
        self.submit_task(task_name, task_body, args)?.await
    }

    /// Submit a script from `catalog` by file name.
    pub fn submit_script(&self, catalog: &ScriptCatalog, name: &str, args: Value) -> Result<TaskResponse> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        let body = catalog.task_body(name)?;
        self.submit_task(name, &body, args)
    }

    /// Submit a script from `catalog` and wait for its result.
    pub async fn run_script(&self, catalog: &ScriptCatalog, name: &str, args: Value) -> Result<Value> {
        self.submit_script(catalog, name, args)?.await
    }
}

impl Inner {
    fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            pending: Mutex::new(PendingTable::new()),
            outbound: Mutex::new(None),
            counter: AtomicU64::new(0),
            state,
            cancel: CancellationToken::new(),
        }
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.config.client_prefix, n)
    }

    /// Forget the connection and drop every waiter. Returns how many
    /// requests were dropped.
    fn teardown(&self) -> usize {
        self.outbound.lock().take();
        self.pending.lock().clear()
    }

    async fn supervise(inner: Arc<Inner>) {
        let policy = inner.config.reconnect.clone();
        let addr = format!("{}:{}", inner.config.host, inner.config.port);
        let mut attempt: u32 = 0;

        loop {
            inner.state.send_replace(ConnectionState::Connecting);
            debug!(addr = %addr, "Connecting to Tickrate server");

            let connect = tokio::select! {
                _ = inner.cancel.cancelled() => break,
                result = TcpStream::connect((inner.config.host.as_str(), inner.config.port)) => result,
            };

            let end = match connect {
                Ok(stream) => {
                    attempt = 0;
                    info!(addr = %addr, "Connected to Tickrate server");
                    inner.run_connection(stream).await
                }
                Err(e) => ConnectionEnd::Errored(e),
            };

            let dropped = inner.teardown();
            inner.state.send_replace(ConnectionState::Disconnected);

            match &end {
                ConnectionEnd::Shutdown => break,
                ConnectionEnd::Closed => {
                    info!(addr = %addr, dropped, "Disconnected from Tickrate server")
                }
                ConnectionEnd::IdleTimeout => {
                    info!(addr = %addr, dropped, "Connection timeout reached")
                }
                ConnectionEnd::Errored(e) => {
                    error!(addr = %addr, dropped, error = %e, "Tickrate connection error")
                }
            }

            attempt = attempt.saturating_add(1);
            if !policy.allows(attempt) {
                warn!(addr = %addr, attempts = attempt - 1, "Reconnect limit reached, giving up");
                break;
            }

            let delay = policy.delay_for(attempt);
            info!(delay_ms = delay.as_millis() as u64, attempt, "Retrying Tickrate connection");
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        inner.teardown();
        inner.state.send_replace(ConnectionState::Stopped);
        debug!(addr = %addr, "Tickrate supervisor stopped");
    }

    async fn run_connection(&self, stream: TcpStream) -> ConnectionEnd {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let last_read = LastRead::now();
        let stream = ReadActivity::new(stream, last_read.clone());
        let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new()).split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        *self.outbound.lock() = Some(tx);
        self.state.send_replace(ConnectionState::Connected);

        let idle_timeout = self.config.idle_timeout;
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return ConnectionEnd::Shutdown,
                _ = &mut idle => {
                    let deadline = last_read.get() + idle_timeout;
                    if deadline <= Instant::now() {
                        return ConnectionEnd::IdleTimeout;
                    }
                    idle.as_mut().reset(deadline);
                }
                Some(payload) = rx.recv() => {
                    if let Err(e) = sink.send(payload).await {
                        return ConnectionEnd::Errored(e);
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(frame)) => {
                        let Some(reply) = self.handle_frame(&frame) else {
                            continue;
                        };
                        let payload = match reply.to_bytes() {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!(error = %e, "Failed to encode reply");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(payload).await {
                            return ConnectionEnd::Errored(e);
                        }
                    }
                    Some(Err(e)) => return ConnectionEnd::Errored(e),
                    None => return ConnectionEnd::Closed,
                },
            }
        }
    }

    /// Process one inbound frame. Returns a message to write back, if any.
    fn handle_frame(&self, frame: &[u8]) -> Option<WireMessage> {
        let value: Value = match serde_json::from_slice(frame) {
            Ok(value) => value,
            Err(e) => {
                let raw = String::from_utf8_lossy(frame).into_owned();
                error!(raw = %raw, error = %e, "Failed to parse message");
                // No way to know which request this belonged to
                if let Some((id, tx)) = self.pending.lock().remove_oldest() {
                    warn!(id = %id, "Failing oldest pending request with malformed frame");
                    let _ = tx.send(Err(RpcError::MalformedFrame { raw }));
                }
                return None;
            }
        };

        let Some(message) = WireMessage::from_value(&value) else {
            debug!("Ignoring frame that is not a message object");
            return None;
        };

        if message.kind == MessageType::Heartbeat {
            return Some(WireMessage::heartbeat_response(message.id));
        }

        let Some(id) = message.id_str() else {
            debug!(kind = ?message.kind, "Ignoring message without a string id");
            return None;
        };

        let mut pending = self.pending.lock();
        if !pending.contains(id) {
            debug!(id = %id, kind = ?message.kind, "No pending request for response");
            return None;
        }

        let reply: Reply = match message.kind {
            MessageType::TaskResult => Ok(message.data.clone()),
            MessageType::Error => Err(RpcError::Remote(message.error_message())),
            _ => Err(RpcError::UnknownResponse { raw: value }),
        };
        pending.resolve(id, reply);
        None
    }
}

/// Eventual result of a submitted task.
#[derive(Debug)]
pub struct TaskResponse {
    id: String,
    rx: oneshot::Receiver<Reply>,
}

impl TaskResponse {
    /// Correlation id assigned to the request.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for TaskResponse {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(reply)) => Poll::Ready(reply),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Discarded {
                id: self.id.clone(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}
