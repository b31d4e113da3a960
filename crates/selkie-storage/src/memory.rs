//! In-memory state store
//!
//! For testing, simulations and ephemeral deployments. Optionally bounded;
//! a bounded store evicts the least recently written entry and reports the
//! eviction to a configured listener so application-level tiered-storage
//! policies can react. The runtime core never consumes the notification.

use crate::persister::Persister;
use async_trait::async_trait;
use bytes::Bytes;
use selkie_core::{ActorAddr, Result};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tracing::debug;

/// Provider name reported in eviction notifications
const PROVIDER_NAME: &str = "memory";

/// Notification emitted when a bounded store drops an entry
#[derive(Debug, Clone)]
pub struct Evicted {
    /// Name of the emitting provider
    pub provider: &'static str,
    /// The evicted address
    pub addr: ActorAddr,
    /// The state that was dropped
    pub state: Bytes,
}

#[derive(Debug)]
struct Entry {
    state: Bytes,
    /// Monotonic write sequence, for least-recently-written eviction
    written_at: u64,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<ActorAddr, Entry>,
    sequence: u64,
}

impl Store {
    fn oldest(&self) -> Option<ActorAddr> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.written_at)
            .map(|(addr, _)| addr.clone())
    }
}

/// In-memory persister
pub struct MemoryPersister {
    store: RwLock<Store>,
    /// Maximum number of entries; `None` is unbounded
    capacity: Option<usize>,
    /// Listener for eviction notifications
    listener: Option<mpsc::UnboundedSender<Evicted>>,
}

impl MemoryPersister {
    /// Create an unbounded in-memory persister
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            capacity: None,
            listener: None,
        }
    }

    /// Create a bounded in-memory persister
    pub fn bounded(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "capacity must be positive");
        Self {
            store: RwLock::new(Store::default()),
            capacity: Some(capacity),
            listener: None,
        }
    }

    /// Attach an eviction listener
    pub fn with_listener(mut self, listener: mpsc::UnboundedSender<Evicted>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }
}

impl Default for MemoryPersister {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    async fn get(&self, addr: &ActorAddr) -> Result<Option<Bytes>> {
        let store = self.store.read().await;
        Ok(store.entries.get(addr).map(|e| e.state.clone()))
    }

    async fn put(&self, addr: &ActorAddr, state: Bytes) -> Result<()> {
        let mut store = self.store.write().await;
        store.sequence = store.sequence.wrapping_add(1);
        let written_at = store.sequence;
        let replaced = store
            .entries
            .insert(addr.clone(), Entry { state, written_at })
            .is_some();

        // Capacity check only when the put grew the map.
        if !replaced {
            if let Some(capacity) = self.capacity {
                while store.entries.len() > capacity {
                    let Some(oldest) = store.oldest() else { break };
                    let Some(entry) = store.entries.remove(&oldest) else {
                        break;
                    };
                    debug!(addr = %oldest, "evicting entry from bounded memory store");
                    if let Some(ref listener) = self.listener {
                        let _ = listener.send(Evicted {
                            provider: PROVIDER_NAME,
                            addr: oldest,
                            state: entry.state,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    async fn delete(&self, addr: &ActorAddr) -> Result<()> {
        let mut store = self.store.write().await;
        store.entries.remove(addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: &str) -> ActorAddr {
        ActorAddr::new("counter", id).unwrap()
    }

    #[tokio::test]
    async fn test_memory_basic() {
        let persister = MemoryPersister::new();

        assert!(persister.is_empty().await);
        assert_eq!(persister.get(&addr("a")).await.unwrap(), None);

        persister.put(&addr("a"), Bytes::from("1")).await.unwrap();
        assert_eq!(persister.len().await, 1);
        assert_eq!(
            persister.get(&addr("a")).await.unwrap(),
            Some(Bytes::from("1"))
        );

        persister.delete(&addr("a")).await.unwrap();
        assert_eq!(persister.get(&addr("a")).await.unwrap(), None);
        assert!(persister.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_delete_is_idempotent() {
        let persister = MemoryPersister::new();
        persister.delete(&addr("missing")).await.unwrap();
        persister.delete(&addr("missing")).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_isolates_addresses() {
        let persister = MemoryPersister::new();
        persister.put(&addr("a"), Bytes::from("1")).await.unwrap();
        persister.put(&addr("b"), Bytes::from("2")).await.unwrap();

        assert_eq!(
            persister.get(&addr("a")).await.unwrap(),
            Some(Bytes::from("1"))
        );
        assert_eq!(
            persister.get(&addr("b")).await.unwrap(),
            Some(Bytes::from("2"))
        );
    }

    #[tokio::test]
    async fn test_bounded_evicts_least_recently_written() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let persister = MemoryPersister::bounded(2).with_listener(tx);

        persister.put(&addr("a"), Bytes::from("1")).await.unwrap();
        persister.put(&addr("b"), Bytes::from("2")).await.unwrap();
        persister.put(&addr("c"), Bytes::from("3")).await.unwrap();

        assert_eq!(persister.len().await, 2);
        assert_eq!(persister.get(&addr("a")).await.unwrap(), None);

        let evicted = rx.recv().await.unwrap();
        assert_eq!(evicted.provider, "memory");
        assert_eq!(evicted.addr, addr("a"));
        assert_eq!(evicted.state, Bytes::from("1"));
    }

    #[tokio::test]
    async fn test_bounded_rewrite_refreshes_age() {
        let persister = MemoryPersister::bounded(2);

        persister.put(&addr("a"), Bytes::from("1")).await.unwrap();
        persister.put(&addr("b"), Bytes::from("2")).await.unwrap();
        // Rewriting "a" makes "b" the oldest.
        persister.put(&addr("a"), Bytes::from("1'")).await.unwrap();
        persister.put(&addr("c"), Bytes::from("3")).await.unwrap();

        assert_eq!(persister.get(&addr("b")).await.unwrap(), None);
        assert_eq!(
            persister.get(&addr("a")).await.unwrap(),
            Some(Bytes::from("1'"))
        );
    }
}
