//! In-process event bus that republishes gateway dispatches.
//!
//! Handlers run synchronously on the emitting task, in registration order.
//! Feature code that prefers a stream can use [`EventBus::subscribe`].

use crate::models::{Interaction, Message, User};
use crate::protocol::dispatch;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Kinds of events a listener can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    MessageCreate,
    InteractionCreate,
    /// Every dispatch, typed or not.
    Raw,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::MessageCreate => "messageCreate",
            Self::InteractionCreate => "interactionCreate",
            Self::Raw => "raw",
        }
    }
}

/// An untyped dispatch frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchEvent {
    pub name: String,
    pub sequence: Option<u64>,
    pub data: Value,
}

/// An event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready(User),
    MessageCreate(Message),
    InteractionCreate(Interaction),
    Raw(DispatchEvent),
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready(_) => EventKind::Ready,
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::InteractionCreate(_) => EventKind::InteractionCreate,
            Self::Raw(_) => EventKind::Raw,
        }
    }

    /// Build the typed event for a recognized dispatch name.
    ///
    /// Returns `None` for unrecognized names and for payloads that do not
    /// parse; the latter is logged.
    pub fn from_dispatch(name: &str, data: &Value) -> Option<Self> {
        let parsed = match name {
            dispatch::READY => data
                .get("user")
                .cloned()
                .map(serde_json::from_value::<User>)
                .map(|r| r.map(Self::Ready)),
            dispatch::MESSAGE_CREATE => {
                Some(serde_json::from_value(data.clone()).map(Self::MessageCreate))
            }
            dispatch::INTERACTION_CREATE => {
                Some(serde_json::from_value(data.clone()).map(Self::InteractionCreate))
            }
            _ => None,
        }?;

        match parsed {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(event = name, error = %e, "Failed to parse dispatch payload");
                None
            }
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
}

struct BusInner {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
    stream: broadcast::Sender<GatewayEvent>,
}

/// Shared event bus. Clones publish to the same listeners.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.inner.listeners.read().len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(1000);
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                stream,
            }),
        }
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push(Listener {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Unregister a handler. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Deliver an event to every handler of its kind and to stream
    /// subscribers. Returns the number of handlers invoked.
    pub fn emit(&self, event: &GatewayEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers may call `on`/`off` without deadlocking
        let handlers: Vec<Handler> = self
            .inner
            .listeners
            .read()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.handler.clone())
            .collect();

        for handler in &handlers {
            handler(event);
        }

        let _ = self.inner.stream.send(event.clone());
        handlers.len()
    }

    /// Receive every event as a stream.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.stream.subscribe()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .read()
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }
}
