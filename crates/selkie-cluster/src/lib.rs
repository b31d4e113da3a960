//! Selkie Cluster
//!
//! Membership view, placement-aware routing and node assembly for the
//! Selkie virtual actor runtime.
//!
//! # Overview
//!
//! Every node owns a [`view::ClusterView`] of the peers running the runtime
//! in server mode and routes each `send` to the home node the placement
//! function picks from that view. Membership is deliberately naive: peers
//! are interrogated on every join/leave event and views converge
//! eventually. During a partition two sub-clusters may each claim the same
//! address; the runtime neither detects nor repairs the divergence.

pub mod node;
pub mod router;
pub mod transport;
pub mod view;

pub use node::{Node, NodeBuilder};
pub use router::Router;
pub use transport::{ClusterTransport, LocalNetwork, LocalTransport, PeerEvent};
pub use view::ClusterView;
