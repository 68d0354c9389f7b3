//! Time-boxed, filtered subscriptions to the event bus.
//!
//! A [`Collector`] listens for one event kind, keeps the events that pass
//! its filter, and ends exactly once: on timeout, on reaching its limit, or
//! when stopped. Ending always unregisters the bus listener.

use crate::events::{EventBus, EventKind, GatewayEvent, ListenerId};
use crate::models::{Interaction, Message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

/// Something a collector can gather from the bus.
pub trait Collectable: Clone + Send + Sync + 'static {
    /// Bus event kind that carries this item.
    const KIND: EventKind;

    /// Extract the item from an event, if the event carries one.
    fn from_event(event: &GatewayEvent) -> Option<Self>;

    /// Key used to de-duplicate collected items.
    fn identity(&self) -> String;
}

impl Collectable for Message {
    const KIND: EventKind = EventKind::MessageCreate;

    fn from_event(event: &GatewayEvent) -> Option<Self> {
        match event {
            GatewayEvent::MessageCreate(message) => Some(message.clone()),
            _ => None,
        }
    }

    fn identity(&self) -> String {
        self.id.clone()
    }
}

impl Collectable for Interaction {
    const KIND: EventKind = EventKind::InteractionCreate;

    fn from_event(event: &GatewayEvent) -> Option<Self> {
        match event {
            GatewayEvent::InteractionCreate(interaction) => Some(interaction.clone()),
            _ => None,
        }
    }

    fn identity(&self) -> String {
        self.id.clone()
    }
}

type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Termination and filtering options.
pub struct CollectorOptions<T> {
    filter: Option<Filter<T>>,
    time: Option<Duration>,
    max: usize,
}

impl<T> Default for CollectorOptions<T> {
    fn default() -> Self {
        Self {
            filter: None,
            time: None,
            max: 0,
        }
    }
}

impl<T> Clone for CollectorOptions<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            time: self.time,
            max: self.max,
        }
    }
}

impl<T> fmt::Debug for CollectorOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorOptions")
            .field("filter", &self.filter.is_some())
            .field("time", &self.time)
            .field("max", &self.max)
            .finish()
    }
}

impl<T: 'static> CollectorOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only items for which `filter` returns true.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Add a predicate on top of any existing filter.
    pub fn and_filter<F>(mut self, extra: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let combined: Filter<T> = match self.filter.take() {
            Some(existing) => Arc::new(move |item: &T| existing(item) && extra(item)),
            None => Arc::new(extra),
        };
        self.filter = Some(combined);
        self
    }

    /// End after this long.
    pub fn time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    /// End once this many items were collected. Zero means no limit.
    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    fn accepts(&self, item: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f(item))
    }
}

/// Why a collector ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Time,
    Limit,
    Explicit,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Limit => "limit",
            Self::Explicit => "explicit",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collected items in first-seen order, keyed by identity.
#[derive(Debug, Clone)]
pub struct Collected<T> {
    keys: HashMap<String, usize>,
    items: Vec<T>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            keys: HashMap::new(),
            items: Vec::new(),
        }
    }
}

impl<T: Collectable> Collected<T> {
    /// Insert or replace in place.
    fn insert(&mut self, item: T) {
        match self.keys.get(&item.identity()) {
            Some(&index) => self.items[index] = item,
            None => {
                self.keys.insert(item.identity(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn get(&self, identity: &str) -> Option<&T> {
        self.keys.get(identity).map(|&i| &self.items[i])
    }
}

impl<T> Collected<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

/// Terminal notification.
#[derive(Debug, Clone)]
pub struct CollectorEnd<T> {
    pub collected: Collected<T>,
    pub reason: EndReason,
}

/// Notifications delivered by a collector.
#[derive(Debug, Clone)]
pub enum CollectorEvent<T> {
    Collect(T),
    End(CollectorEnd<T>),
}

struct State<T> {
    collected: Collected<T>,
    ended: Option<EndReason>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    options: CollectorOptions<T>,
    bus: EventBus,
    listener: Mutex<Option<ListenerId>>,
    timer: Mutex<Option<AbortHandle>>,
    tx: mpsc::UnboundedSender<CollectorEvent<T>>,
}

impl<T: Collectable> Shared<T> {
    fn on_event(&self, event: &GatewayEvent) {
        let Some(item) = T::from_event(event) else {
            return;
        };
        if !self.options.accepts(&item) {
            return;
        }

        let end = {
            let mut state = self.state.lock();
            if state.ended.is_some() {
                return;
            }
            state.collected.insert(item.clone());
            let _ = self.tx.send(CollectorEvent::Collect(item));

            if self.options.max > 0 && state.collected.len() >= self.options.max {
                Self::close(&mut state, EndReason::Limit)
            } else {
                None
            }
        };

        if let Some(end) = end {
            self.notify_end(end);
        }
    }

    fn finish(&self, reason: EndReason) {
        let end = Self::close(&mut self.state.lock(), reason);
        if let Some(end) = end {
            self.notify_end(end);
        }
    }

    /// Mark ended under the state lock. Only the first caller gets `Some`.
    fn close(state: &mut State<T>, reason: EndReason) -> Option<CollectorEnd<T>> {
        if state.ended.is_some() {
            return None;
        }
        state.ended = Some(reason);
        Some(CollectorEnd {
            collected: state.collected.clone(),
            reason,
        })
    }

    /// Record the bus listener. If the collector already ended before the
    /// id was stored, the listener is removed here instead.
    fn attach_listener(&self, id: ListenerId) {
        *self.listener.lock() = Some(id);
        if self.state.lock().ended.is_some() {
            if let Some(id) = self.listener.lock().take() {
                self.bus.off(id);
            }
        }
    }

    fn attach_timer(&self, timer: AbortHandle) {
        *self.timer.lock() = Some(timer);
        if self.state.lock().ended.is_some() {
            if let Some(timer) = self.timer.lock().take() {
                timer.abort();
            }
        }
    }

    fn notify_end(&self, end: CollectorEnd<T>) {
        if let Some(id) = self.listener.lock().take() {
            self.bus.off(id);
        }
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        debug!(reason = %end.reason, collected = end.collected.len(), "Collector ended");
        let _ = self.tx.send(CollectorEvent::End(end));
    }
}

/// A running collector.
///
/// Dropping it stops collection with reason `explicit`.
pub struct Collector<T: Collectable> {
    shared: Arc<Shared<T>>,
    rx: mpsc::UnboundedReceiver<CollectorEvent<T>>,
    done: bool,
}

impl<T: Collectable> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("ended", &self.is_ended())
            .field("options", &self.shared.options)
            .finish()
    }
}

impl<T: Collectable> Collector<T> {
    /// Start collecting `T::KIND` events from `bus`.
    ///
    /// Must be called inside a Tokio runtime when a time limit is set.
    pub fn subscribe(bus: &EventBus, options: CollectorOptions<T>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let time = options.time;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                collected: Collected::default(),
                ended: None,
            }),
            options,
            bus: bus.clone(),
            listener: Mutex::new(None),
            timer: Mutex::new(None),
            tx,
        });

        let weak: Weak<Shared<T>> = Arc::downgrade(&shared);
        let id = bus.on(T::KIND, move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_event(event);
            }
        });
        shared.attach_listener(id);

        if let Some(time) = time {
            let weak = Arc::downgrade(&shared);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(time).await;
                if let Some(shared) = weak.upgrade() {
                    shared.finish(EndReason::Time);
                }
            });
            shared.attach_timer(handle.abort_handle());
        }

        Self {
            shared,
            rx,
            done: false,
        }
    }

    /// Next notification; `None` after the end was delivered.
    pub async fn next(&mut self) -> Option<CollectorEvent<T>> {
        if self.done {
            return None;
        }
        let event = self.rx.recv().await?;
        if matches!(event, CollectorEvent::End(_)) {
            self.done = true;
        }
        Some(event)
    }

    /// Wait for the end, skipping per-item notifications.
    pub async fn wait(mut self) -> CollectorEnd<T> {
        while let Some(event) = self.next().await {
            if let CollectorEvent::End(end) = event {
                return end;
            }
        }
        let state = self.shared.state.lock();
        CollectorEnd {
            collected: state.collected.clone(),
            reason: state.ended.unwrap_or(EndReason::Explicit),
        }
    }

    /// Stop collecting.
    pub fn stop(&self) {
        self.shared.finish(EndReason::Explicit);
    }

    pub fn is_ended(&self) -> bool {
        self.shared.state.lock().ended.is_some()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.shared.state.lock().ended
    }

    /// Snapshot of what was collected so far.
    pub fn collected(&self) -> Collected<T> {
        self.shared.state.lock().collected.clone()
    }
}

impl<T: Collectable> Drop for Collector<T> {
    fn drop(&mut self) {
        self.shared.finish(EndReason::Explicit);
    }
}
