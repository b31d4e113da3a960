//! Cluster transport abstraction
//!
//! TigerStyle: The router needs four primitives from the network - peer
//! enumeration, a runtime-presence query, an announce nudge, and
//! fire-and-forget delivery to a remote launcher. Any transport providing
//! reliable pairwise invocation to a named peer suffices; serialisation of
//! payloads at a real network boundary is the transport's concern.
//!
//! The bundled `LocalNetwork` connects nodes within one process. Messages
//! cross it as the same boxed values the caller submitted, which is exactly
//! what in-process clusters and tests need.

use async_trait::async_trait;
use selkie_core::{ActorAddr, Error, Message, NodeId, Result};
use selkie_runtime::LauncherHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Low-level membership event observed by a node's router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer became reachable
    Up(NodeId),
    /// A peer became unreachable
    Down(NodeId),
    /// A peer asked us to rebuild our view (announce)
    Refresh(NodeId),
}

/// Pairwise cluster transport as seen by one node
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// This node's identity
    fn local_node(&self) -> &NodeId;

    /// Currently reachable peers, excluding this node
    async fn peers(&self) -> Vec<NodeId>;

    /// Ask a peer whether it hosts a live launcher
    async fn is_runtime_present(&self, peer: &NodeId) -> Result<bool>;

    /// Prompt a peer to rebuild its view including us
    async fn announce(&self, peer: &NodeId) -> Result<()>;

    /// Deliver a message to the launcher on a peer
    ///
    /// Exactly one invocation per submission; no processing guarantee.
    async fn deliver(&self, peer: &NodeId, addr: ActorAddr, message: Message) -> Result<()>;
}

// =============================================================================
// LocalNetwork
// =============================================================================

struct Endpoint {
    launcher: Option<LauncherHandle>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

/// In-process cluster fabric
///
/// Every node that joins gets a transport view of the shared fabric and a
/// membership event stream. Joins and leaves notify all other members.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    endpoints: Arc<Mutex<HashMap<NodeId, Endpoint>>>,
}

impl LocalNetwork {
    /// Create an empty fabric
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the fabric
    ///
    /// `launcher` is `None` for client-only nodes. Existing members observe
    /// `PeerEvent::Up` for the newcomer; the newcomer starts with an empty
    /// event stream and is expected to interrogate `peers()` once.
    pub fn join(
        &self,
        node: NodeId,
        launcher: Option<LauncherHandle>,
    ) -> (LocalTransport, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut endpoints = self.endpoints.lock().expect("local network poisoned");
        for (peer, endpoint) in endpoints.iter() {
            debug_assert!(peer != &node, "node joined twice");
            let _ = endpoint.events.send(PeerEvent::Up(node.clone()));
        }
        endpoints.insert(
            node.clone(),
            Endpoint {
                launcher,
                events: events_tx,
            },
        );
        debug!(%node, members = endpoints.len(), "node joined local network");

        let transport = LocalTransport {
            node,
            network: self.clone(),
        };
        (transport, events_rx)
    }

    /// Leave the fabric
    ///
    /// Remaining members observe `PeerEvent::Down`.
    pub fn leave(&self, node: &NodeId) {
        let mut endpoints = self.endpoints.lock().expect("local network poisoned");
        if endpoints.remove(node).is_none() {
            return;
        }
        for endpoint in endpoints.values() {
            let _ = endpoint.events.send(PeerEvent::Down(node.clone()));
        }
        debug!(%node, members = endpoints.len(), "node left local network");
    }
}

/// One node's handle onto a `LocalNetwork`
pub struct LocalTransport {
    node: NodeId,
    network: LocalNetwork,
}

#[async_trait]
impl ClusterTransport for LocalTransport {
    fn local_node(&self) -> &NodeId {
        &self.node
    }

    async fn peers(&self) -> Vec<NodeId> {
        let endpoints = self
            .network
            .endpoints
            .lock()
            .expect("local network poisoned");
        endpoints
            .keys()
            .filter(|peer| **peer != self.node)
            .cloned()
            .collect()
    }

    async fn is_runtime_present(&self, peer: &NodeId) -> Result<bool> {
        let endpoints = self
            .network
            .endpoints
            .lock()
            .expect("local network poisoned");
        match endpoints.get(peer) {
            Some(endpoint) => Ok(endpoint.launcher.is_some()),
            None => Err(Error::node_unreachable(peer.as_str())),
        }
    }

    async fn announce(&self, peer: &NodeId) -> Result<()> {
        let endpoints = self
            .network
            .endpoints
            .lock()
            .expect("local network poisoned");
        let endpoint = endpoints
            .get(peer)
            .ok_or_else(|| Error::node_unreachable(peer.as_str()))?;
        let _ = endpoint.events.send(PeerEvent::Refresh(self.node.clone()));
        Ok(())
    }

    async fn deliver(&self, peer: &NodeId, addr: ActorAddr, message: Message) -> Result<()> {
        let launcher = {
            let endpoints = self
                .network
                .endpoints
                .lock()
                .expect("local network poisoned");
            let endpoint = endpoints
                .get(peer)
                .ok_or_else(|| Error::node_unreachable(peer.as_str()))?;
            endpoint
                .launcher
                .clone()
                .ok_or_else(|| Error::node_unreachable(peer.as_str()))?
        };

        launcher.deliver(addr, message).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u32) -> NodeId {
        NodeId::new(format!("node-{}", n)).unwrap()
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members() {
        let network = LocalNetwork::new();
        let (_t1, mut events1) = network.join(node(1), None);
        let (_t2, _events2) = network.join(node(2), None);

        assert_eq!(events1.recv().await, Some(PeerEvent::Up(node(2))));
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        let network = LocalNetwork::new();
        let (_t1, mut events1) = network.join(node(1), None);
        let (_t2, _events2) = network.join(node(2), None);
        let _ = events1.recv().await;

        network.leave(&node(2));
        assert_eq!(events1.recv().await, Some(PeerEvent::Down(node(2))));
    }

    #[tokio::test]
    async fn test_peers_excludes_self() {
        let network = LocalNetwork::new();
        let (t1, _e1) = network.join(node(1), None);
        let (_t2, _e2) = network.join(node(2), None);

        let peers = t1.peers().await;
        assert_eq!(peers, vec![node(2)]);
    }

    #[tokio::test]
    async fn test_runtime_presence() {
        let network = LocalNetwork::new();
        let (t1, _e1) = network.join(node(1), None);

        // Client-only member answers no.
        let (_t2, _e2) = network.join(node(2), None);
        assert!(!t1.is_runtime_present(&node(2)).await.unwrap());

        // Unknown member is unreachable.
        assert!(t1.is_runtime_present(&node(9)).await.is_err());
    }

    #[tokio::test]
    async fn test_announce_lands_as_refresh() {
        let network = LocalNetwork::new();
        let (t1, _e1) = network.join(node(1), None);
        let (_t2, mut events2) = network.join(node(2), None);

        t1.announce(&node(2)).await.unwrap();
        assert_eq!(events2.recv().await, Some(PeerEvent::Refresh(node(1))));
    }
}
