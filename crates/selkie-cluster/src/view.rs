//! Cluster membership view
//!
//! Each node maintains its own view of which peers run the runtime in
//! server mode. Views are rebuilt from peer interrogation on every
//! membership event; they are eventually consistent across nodes, never
//! instantaneously so.

use selkie_core::constants::CLUSTER_NODES_COUNT_MAX;
use selkie_core::{home_node, ActorAddr, NodeId};
use std::collections::BTreeSet;

/// Set of nodes eligible to host actors
///
/// Backed by an ordered set so every holder iterates in the same order;
/// placement tie-breaking depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterView {
    nodes: BTreeSet<NodeId>,
}

impl ClusterView {
    /// Create a view over the given nodes
    pub fn new(nodes: BTreeSet<NodeId>) -> Self {
        debug_assert!(nodes.len() <= CLUSTER_NODES_COUNT_MAX);
        Self { nodes }
    }

    /// Create an empty view
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if a node is in the view
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Number of nodes in the view
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the view is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate the nodes in stable order
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// Home node for an address under this view
    ///
    /// `None` iff the view is empty.
    pub fn home_for(&self, addr: &ActorAddr) -> Option<&NodeId> {
        home_node(self.nodes.iter(), addr)
    }
}

impl FromIterator<NodeId> for ClusterView {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u32) -> NodeId {
        NodeId::new(format!("node-{}", n)).unwrap()
    }

    #[test]
    fn test_empty_view() {
        let view = ClusterView::empty();
        assert!(view.is_empty());
        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(view.home_for(&addr), None);
    }

    #[test]
    fn test_view_membership() {
        let view: ClusterView = [node(1), node(2)].into_iter().collect();
        assert_eq!(view.len(), 2);
        assert!(view.contains(&node(1)));
        assert!(!view.contains(&node(3)));
    }

    #[test]
    fn test_home_is_a_member() {
        let view: ClusterView = (0..5).map(node).collect();
        for i in 0..100 {
            let addr = ActorAddr::new("counter", format!("id-{}", i)).unwrap();
            let home = view.home_for(&addr).unwrap();
            assert!(view.contains(home));
        }
    }
}
