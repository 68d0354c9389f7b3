//! In-flight request table.

use crate::error::RpcError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::oneshot;

/// Terminal outcome delivered to a caller.
pub type Reply = Result<Value, RpcError>;

struct Entry {
    seq: u64,
    tx: oneshot::Sender<Reply>,
}

/// Correlation id to waiting caller, remembering registration order.
///
/// The order only matters for attributing an unparseable frame, which
/// goes to the oldest entry.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. Returns `false`, leaving the table untouched,
    /// if the id is already in flight.
    pub fn insert(&mut self, id: impl Into<String>, tx: oneshot::Sender<Reply>) -> bool {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id.clone());
        self.entries.insert(id, Entry { seq, tx });
        true
    }

    /// Remove a waiter without answering it.
    pub fn remove(&mut self, id: &str) -> Option<oneshot::Sender<Reply>> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&entry.seq);
        Some(entry.tx)
    }

    /// Remove the waiter registered longest ago.
    pub fn remove_oldest(&mut self) -> Option<(String, oneshot::Sender<Reply>)> {
        let (_, id) = self.order.pop_first()?;
        let entry = self.entries.remove(&id)?;
        Some((id, entry.tx))
    }

    /// Deliver `reply` to the waiter for `id` and remove it.
    ///
    /// Returns `false` if no such request is in flight.
    pub fn resolve(&mut self, id: &str, reply: Reply) -> bool {
        match self.remove(id) {
            Some(tx) => {
                // The caller may have stopped waiting
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    /// Drop every waiter. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.order.clear();
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// In-flight ids, oldest first.
    pub fn ids(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut table = PendingTable::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        assert!(table.insert("client-0", tx1));
        assert!(!table.insert("client-0", tx2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolve_delivers_and_removes() {
        let mut table = PendingTable::new();
        let (tx, mut rx) = oneshot::channel();
        table.insert("client-0", tx);

        assert!(table.resolve("client-0", Ok(json!({"pong": true}))));
        assert!(table.is_empty());
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!({"pong": true}));
        assert!(!table.resolve("client-0", Ok(Value::Null)));
    }

    #[test]
    fn test_oldest_follows_registration_order() {
        let mut table = PendingTable::new();
        for id in ["client-2", "client-0", "client-1"] {
            let (tx, _rx) = oneshot::channel();
            table.insert(id, tx);
        }
        table.remove("client-2");
        assert_eq!(table.ids(), vec!["client-0", "client-1"]);

        let (id, _) = table.remove_oldest().unwrap();
        assert_eq!(id, "client-0");
        let (id, _) = table.remove_oldest().unwrap();
        assert_eq!(id, "client-1");
        assert!(table.remove_oldest().is_none());
    }

    #[test]
    fn test_clear_drops_senders() {
        let mut table = PendingTable::new();
        let (tx, mut rx) = oneshot::channel();
        table.insert("client-0", tx);

        assert_eq!(table.clear(), 1);
        assert!(table.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
