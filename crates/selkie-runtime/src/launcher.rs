//! Launcher: per-node gatekeeper for local instances
//!
//! TigerStyle: The registry is readable concurrently but mutated only by the
//! launcher's task; the fast delivery path never serialises behind the
//! launcher for live actors.

use crate::instance::{self, InstanceContext, InstanceHandle};
use crate::stopper::StopperHandle;
use selkie_core::{home_node, ActorAddr, KindRegistry, Message, NodeId};
use selkie_storage::Persister;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// =============================================================================
// Registry
// =============================================================================

/// Forward and reverse maps over resident instances
///
/// Invariant: the maps are mutually inverse at every moment; an entry exists
/// iff the instance is alive or its reap is still in flight.
#[derive(Default)]
pub struct LocalRegistry {
    forward: HashMap<ActorAddr, InstanceHandle>,
    reverse: HashMap<u64, ActorAddr>,
}

impl LocalRegistry {
    /// Look up the handle for an address
    pub fn get(&self, addr: &ActorAddr) -> Option<&InstanceHandle> {
        self.forward.get(addr)
    }

    /// Number of registered instances
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Snapshot of all registered addresses
    pub fn addrs(&self) -> Vec<ActorAddr> {
        self.forward.keys().cloned().collect()
    }

    /// Check forward/reverse mutual consistency (instrumentation)
    pub fn is_consistent(&self) -> bool {
        if self.forward.len() != self.reverse.len() {
            return false;
        }
        self.forward.iter().all(|(addr, handle)| {
            self.reverse.get(&handle.instance_id()) == Some(addr)
        })
    }

    fn iter(&self) -> impl Iterator<Item = (&ActorAddr, &InstanceHandle)> {
        self.forward.iter()
    }

    fn insert(&mut self, handle: InstanceHandle) {
        let addr = handle.addr().clone();
        let instance_id = handle.instance_id();

        // A dead predecessor may still occupy the slot; its reap will find
        // itself replaced and leave the new entry alone.
        if let Some(old) = self.forward.insert(addr.clone(), handle) {
            self.reverse.remove(&old.instance_id());
        }
        self.reverse.insert(instance_id, addr);

        debug_assert!(self.is_consistent());
    }

    fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    fn reap(&mut self, instance_id: u64) {
        // Absent entries are tolerated: the handle may already have been
        // replaced by a relaunch.
        let Some(addr) = self.reverse.remove(&instance_id) else {
            return;
        };
        if self
            .forward
            .get(&addr)
            .is_some_and(|h| h.instance_id() == instance_id)
        {
            self.forward.remove(&addr);
        }

        debug_assert!(self.is_consistent());
    }
}

// =============================================================================
// Commands
// =============================================================================

enum LauncherCmd {
    Launch { addr: ActorAddr, first: Message },
    Reap { instance_id: u64 },
    EvictForPeer { peer: NodeId },
    Shutdown,
}

/// Handle to the launcher: delivery fast path plus control commands
#[derive(Clone)]
pub struct LauncherHandle {
    cmd_tx: mpsc::UnboundedSender<LauncherCmd>,
    registry: Arc<RwLock<LocalRegistry>>,
}

impl LauncherHandle {
    /// Deliver a message to a local instance, launching it if needed
    ///
    /// Fast path: a live handle in the registry takes the message directly.
    /// A handle observed alive that terminates before the enqueue loses the
    /// message (no relaunch from here - relaunching would duplicate the slow
    /// path's idempotent launch and widen the double-start window). Absent
    /// or dead handles defer to the launcher task.
    pub async fn deliver(&self, addr: ActorAddr, message: Message) {
        {
            let registry = self.registry.read().await;
            if let Some(handle) = registry.get(&addr) {
                if handle.is_alive() {
                    if let Err(e) = handle.deliver(message) {
                        debug!(%addr, error = %e, "dropping message for stale handle");
                    }
                    return;
                }
            }
        }

        let _ = self.cmd_tx.send(LauncherCmd::Launch {
            addr,
            first: message,
        });
    }

    /// Ask every instance whose pairwise placement prefers `peer` to stop
    pub fn evict_for_peer(&self, peer: NodeId) {
        let _ = self.cmd_tx.send(LauncherCmd::EvictForPeer { peer });
    }

    /// Stop all instances and shut the launcher down
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(LauncherCmd::Shutdown);
    }

    /// Number of resident instances (instrumentation)
    pub async fn resident_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Addresses of resident instances (instrumentation)
    pub async fn resident_addrs(&self) -> Vec<ActorAddr> {
        self.registry.read().await.addrs()
    }

    /// Check registry invariants (instrumentation)
    pub async fn registry_is_consistent(&self) -> bool {
        self.registry.read().await.is_consistent()
    }
}

// =============================================================================
// Launcher
// =============================================================================

/// Per-node singleton owning the local instance registry
pub struct Launcher {
    node: NodeId,
    kinds: Arc<KindRegistry>,
    persister: Arc<dyn Persister>,
    stopper: StopperHandle,
    default_ttl: Duration,
    registry: Arc<RwLock<LocalRegistry>>,
    cmd_tx: mpsc::UnboundedSender<LauncherCmd>,
    cmd_rx: mpsc::UnboundedReceiver<LauncherCmd>,
    next_instance_id: u64,
}

impl Launcher {
    /// Create a launcher for this node
    pub fn new(
        node: NodeId,
        kinds: Arc<KindRegistry>,
        persister: Arc<dyn Persister>,
        stopper: StopperHandle,
        default_ttl: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            node,
            kinds,
            persister,
            stopper,
            default_ttl,
            registry: Arc::new(RwLock::new(LocalRegistry::default())),
            cmd_tx,
            cmd_rx,
            next_instance_id: 0,
        }
    }

    /// Get a handle before spawning
    pub fn handle(&self) -> LauncherHandle {
        LauncherHandle {
            cmd_tx: self.cmd_tx.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Spawn the launcher task
    pub fn spawn(self) -> (LauncherHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!(node = %self.node, "launcher starting");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                LauncherCmd::Launch { addr, first } => self.handle_launch(addr, first).await,
                LauncherCmd::Reap { instance_id } => {
                    self.registry.write().await.reap(instance_id);
                }
                LauncherCmd::EvictForPeer { peer } => self.handle_evict(peer).await,
                LauncherCmd::Shutdown => {
                    self.handle_shutdown().await;
                    break;
                }
            }
        }

        info!(node = %self.node, "launcher stopped");
    }

    /// Launch an instance if none is alive; idempotent
    ///
    /// A second message can race the first through the slow path, so
    /// presence is re-checked here on the launcher task.
    async fn handle_launch(&mut self, addr: ActorAddr, first: Message) {
        {
            let registry = self.registry.read().await;
            if let Some(handle) = registry.get(&addr) {
                if handle.is_alive() {
                    if let Err(e) = handle.deliver(first) {
                        debug!(%addr, error = %e, "dropping message for stale handle");
                    }
                    return;
                }
            }
        }

        let Some(kind) = self.kinds.get(addr.kind()) else {
            warn!(%addr, "dropping message for unregistered kind");
            return;
        };

        self.next_instance_id += 1;
        let instance_id = self.next_instance_id;

        let ctx = InstanceContext {
            addr: addr.clone(),
            instance_id,
            kind,
            persister: self.persister.clone(),
            stopper: self.stopper.clone(),
            default_ttl: self.default_ttl,
        };
        let (handle, task) = instance::spawn(ctx, first);

        self.registry.write().await.insert(handle);
        debug!(%addr, instance_id, "instance launched");

        // Link the child: its termination, however it happens, reaps the
        // registry entries.
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let _ = task.await;
            let _ = cmd_tx.send(LauncherCmd::Reap { instance_id });
        });
    }

    /// Stop every instance whose pairwise placement prefers the new peer
    ///
    /// The fold runs over the two-node set {peer, self} deliberately: iff
    /// the newcomer outranks us for a key we must vacate, regardless of the
    /// rest of the view.
    async fn handle_evict(&mut self, peer: NodeId) {
        let pair = [peer.clone(), self.node.clone()];
        let registry = self.registry.read().await;

        let mut evicted = 0usize;
        for (addr, handle) in registry.iter() {
            if home_node(pair.iter(), addr) == Some(&peer) {
                handle.stop();
                evicted += 1;
            }
        }

        info!(
            %peer,
            evicted,
            resident = registry.len(),
            "rebalance sweep complete"
        );
    }

    async fn handle_shutdown(&mut self) {
        let mut registry = self.registry.write().await;
        info!(
            node = %self.node,
            resident = registry.len(),
            "stopping all instances"
        );
        for (_, handle) in registry.iter() {
            handle.stop();
        }
        // The command loop exits after this, so the in-flight reaps would
        // never be processed; drop the entries now.
        registry.clear();
    }
}
