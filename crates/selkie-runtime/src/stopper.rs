//! Stopper: LRU bookkeeping and memory-pressure eviction
//!
//! TigerStyle: The LRU list is a single-owner structure driven exclusively
//! from the stopper task's mailbox; touch decomposes into remove-then-insert
//! atomically within that task and no intermediate state is ever visible.

use crate::instance::StopSignal;
use crate::probe::MemoryProbe;
use selkie_core::constants::MEMORY_FREE_RATIO_MIN;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

// =============================================================================
// Commands
// =============================================================================

enum StopperCmd {
    Touch { instance_id: u64, stop: StopSignal },
    MarkDone { instance_id: u64 },
    Clean,
}

/// Handle for reporting instance liveness to the stopper
///
/// All operations are fire-and-forget from the caller's perspective.
#[derive(Clone)]
pub struct StopperHandle {
    cmd_tx: mpsc::UnboundedSender<StopperCmd>,
}

impl StopperHandle {
    /// Record activity for an instance, moving it to the newest end
    pub fn touch(&self, instance_id: u64, stop: StopSignal) {
        let _ = self.cmd_tx.send(StopperCmd::Touch { instance_id, stop });
    }

    /// Remove a terminating instance from the list
    pub fn mark_done(&self, instance_id: u64) {
        let _ = self.cmd_tx.send(StopperCmd::MarkDone { instance_id });
    }

    /// Request an explicit pressure check
    pub fn clean(&self) {
        let _ = self.cmd_tx.send(StopperCmd::Clean);
    }
}

// =============================================================================
// LRU list
// =============================================================================

struct LruEntry {
    prev: Option<u64>,
    next: Option<u64>,
    stop: StopSignal,
}

/// Doubly-linked order over live instance ids
///
/// `oldest` is the eviction end; `newest` receives every touch.
#[derive(Default)]
struct LruList {
    entries: HashMap<u64, LruEntry>,
    oldest: Option<u64>,
    newest: Option<u64>,
}

impl LruList {
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Move an instance to the newest end, inserting it if absent
    fn touch(&mut self, instance_id: u64, stop: StopSignal) {
        let stop = match self.unlink(instance_id) {
            Some(existing) => existing,
            None => stop,
        };
        self.push_newest(instance_id, stop);

        debug_assert!(self.newest == Some(instance_id));
        debug_assert!(self.entries.contains_key(&instance_id));
    }

    /// Remove an instance; no-op when absent
    fn remove(&mut self, instance_id: u64) {
        let _ = self.unlink(instance_id);
    }

    fn unlink(&mut self, instance_id: u64) -> Option<StopSignal> {
        let entry = self.entries.remove(&instance_id)?;

        match entry.prev {
            Some(prev) => {
                self.entries
                    .get_mut(&prev)
                    .expect("lru prev link dangling")
                    .next = entry.next;
            }
            None => self.oldest = entry.next,
        }

        match entry.next {
            Some(next) => {
                self.entries
                    .get_mut(&next)
                    .expect("lru next link dangling")
                    .prev = entry.prev;
            }
            None => self.newest = entry.prev,
        }

        Some(entry.stop)
    }

    fn push_newest(&mut self, instance_id: u64, stop: StopSignal) {
        debug_assert!(!self.entries.contains_key(&instance_id));

        let entry = LruEntry {
            prev: self.newest,
            next: None,
            stop,
        };

        if let Some(previous_newest) = self.newest {
            self.entries
                .get_mut(&previous_newest)
                .expect("lru newest link dangling")
                .next = Some(instance_id);
        } else {
            self.oldest = Some(instance_id);
        }

        self.newest = Some(instance_id);
        self.entries.insert(instance_id, entry);
    }

    fn oldest_stop(&self) -> Option<&StopSignal> {
        self.oldest.map(|id| {
            &self
                .entries
                .get(&id)
                .expect("lru oldest link dangling")
                .stop
        })
    }

    /// Walk from oldest to newest
    fn walk_forward(&self) -> Vec<u64> {
        let mut order = Vec::with_capacity(self.entries.len());
        let mut cursor = self.oldest;
        while let Some(id) = cursor {
            order.push(id);
            cursor = self.entries.get(&id).and_then(|e| e.next);
        }
        order
    }

    /// Walk from newest to oldest
    fn walk_backward(&self) -> Vec<u64> {
        let mut order = Vec::with_capacity(self.entries.len());
        let mut cursor = self.newest;
        while let Some(id) = cursor {
            order.push(id);
            cursor = self.entries.get(&id).and_then(|e| e.prev);
        }
        order
    }
}

// =============================================================================
// Stopper
// =============================================================================

/// Per-node singleton that evicts the least recently active instance when
/// system memory runs low
pub struct Stopper {
    list: LruList,
    probe: Arc<dyn MemoryProbe>,
    cmd_rx: mpsc::UnboundedReceiver<StopperCmd>,
}

impl Stopper {
    /// Spawn the stopper task
    pub fn spawn(probe: Arc<dyn MemoryProbe>) -> (StopperHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let stopper = Self {
            list: LruList::default(),
            probe,
            cmd_rx,
        };
        let task = tokio::spawn(stopper.run());
        (StopperHandle { cmd_tx }, task)
    }

    async fn run(mut self) {
        debug!("stopper starting");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                StopperCmd::Touch { instance_id, stop } => {
                    self.list.touch(instance_id, stop);
                    self.clean();
                }
                StopperCmd::MarkDone { instance_id } => {
                    self.list.remove(instance_id);
                    // A stop triggered by pressure ends here; re-check so a
                    // persistent shortage keeps draining the list.
                    self.clean();
                }
                StopperCmd::Clean => self.clean(),
            }
        }

        debug!("stopper stopped");
    }

    /// Evict at most one instance if free memory is below the threshold
    fn clean(&mut self) {
        let sample = self.probe.sample();
        if sample.free_ratio() >= MEMORY_FREE_RATIO_MIN {
            return;
        }

        if let Some(stop) = self.list.oldest_stop() {
            info!(
                free_ratio = sample.free_ratio(),
                resident = self.list.len(),
                "memory pressure, stopping oldest instance"
            );
            stop.stop();
        }
    }
}
