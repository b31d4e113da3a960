//! Router: placement-aware send plus membership maintenance
//!
//! TigerStyle: The view is a single value replaced atomically; senders read
//! a snapshot and never block behind membership work.

use crate::transport::{ClusterTransport, PeerEvent};
use crate::view::ClusterView;
use selkie_core::{ActorAddr, Error, Message, NodeId, Result};
use selkie_runtime::LauncherHandle;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Per-node singleton owning the cluster view and the outbound send path
pub struct Router {
    local: NodeId,
    /// Server nodes host actors and appear in their own view; client-only
    /// nodes route but deliberately exclude themselves.
    server: bool,
    transport: Arc<dyn ClusterTransport>,
    launcher: Option<LauncherHandle>,
    view: RwLock<ClusterView>,
}

impl Router {
    /// Create a router; call `refresh_view` before first use
    pub fn new(
        local: NodeId,
        transport: Arc<dyn ClusterTransport>,
        launcher: Option<LauncherHandle>,
    ) -> Arc<Self> {
        let server = launcher.is_some();
        Arc::new(Self {
            local,
            server,
            transport,
            launcher,
            view: RwLock::new(ClusterView::empty()),
        })
    }

    /// This node's identity
    pub fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// Snapshot of the current view
    pub async fn view(&self) -> ClusterView {
        self.view.read().await.clone()
    }

    /// Submit a message to the addressed actor
    ///
    /// Fire-and-forget: acceptance of the local submission is all that is
    /// acknowledged. The home node is computed once against the current
    /// view snapshot; a local home short-circuits the transport.
    pub async fn send(&self, kind: &str, id: &str, message: Message) -> Result<()> {
        let addr = ActorAddr::new(kind, id)?;

        let home = {
            let view = self.view.read().await;
            view.home_for(&addr).cloned()
        }
        .ok_or(Error::NoHomeNode)?;

        if home == self.local {
            if let Some(ref launcher) = self.launcher {
                launcher.deliver(addr, message).await;
                return Ok(());
            }
            // A client-only node never appears in its own view.
            debug_assert!(false, "client-only node selected as home");
        }

        self.transport.deliver(&home, addr, message).await
    }

    /// Rebuild the view by interrogating every reachable peer
    ///
    /// The view is the set of peers hosting a live launcher, plus this node
    /// when it is a server.
    #[instrument(skip(self), fields(node = %self.local), level = "debug")]
    pub async fn refresh_view(&self) {
        let mut nodes = std::collections::BTreeSet::new();
        if self.server {
            nodes.insert(self.local.clone());
        }

        for peer in self.transport.peers().await {
            if peer == self.local {
                continue;
            }
            match self.transport.is_runtime_present(&peer).await {
                Ok(true) => {
                    nodes.insert(peer);
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(%peer, error = %e, "peer not reachable during view rebuild");
                }
            }
        }

        let view = ClusterView::new(nodes);
        info!(size = view.len(), "cluster view rebuilt");
        *self.view.write().await = view;
    }

    /// Consume membership events until the stream closes
    pub fn spawn_event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
            debug!(node = %self.local, "membership event stream closed");
        })
    }

    async fn handle_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::Up(peer) => {
                info!(%peer, "peer up");
                self.refresh_view().await;

                if self.server && peer != self.local {
                    // Prompt the newcomer to rebuild its view including us.
                    if let Err(e) = self.transport.announce(&peer).await {
                        warn!(%peer, error = %e, "announce failed");
                    }
                    // Background sweep: vacate every instance the newcomer
                    // now outranks us for. The existing node pushes; the
                    // newcomer pulls nothing.
                    if let Some(ref launcher) = self.launcher {
                        launcher.evict_for_peer(peer);
                    }
                }
            }
            PeerEvent::Down(peer) => {
                info!(%peer, "peer down");
                self.refresh_view().await;
            }
            PeerEvent::Refresh(peer) => {
                debug!(%peer, "refresh requested");
                self.refresh_view().await;
            }
        }
    }
}
