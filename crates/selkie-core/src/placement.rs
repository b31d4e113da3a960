//! Deterministic actor placement
//!
//! TigerStyle: Pure function of the cluster view and the address; no state,
//! no I/O.
//!
//! Placement uses rendezvous (highest-random-weight) hashing: every candidate
//! node's weight for an address is the SHA-256 digest of the length-framed
//! `(node, kind, id)` triple, and the node with the lexicographically
//! greatest digest wins. Any two nodes agreeing on the view agree on the
//! home node, and a single-node view change relocates only ~`1/|V|` of the
//! address space, every relocation involving the changed node.

use crate::addr::{ActorAddr, NodeId};
use crate::constants::PLACEMENT_DIGEST_LENGTH_BYTES;
use sha2::{Digest, Sha256};

/// Placement weight of one node for one address
///
/// Exposed for property tests; `home_node` is the operational entry point.
pub fn placement_weight(node: &NodeId, addr: &ActorAddr) -> [u8; PLACEMENT_DIGEST_LENGTH_BYTES] {
    let mut hasher = Sha256::new();

    // Length-framed fields: no pair of distinct triples shares an encoding.
    for field in [node.as_str(), addr.kind(), addr.id()] {
        hasher.update((field.len() as u32).to_be_bytes());
        hasher.update(field.as_bytes());
    }

    hasher.finalize().into()
}

/// Select the home node for an address from a view
///
/// Returns `None` when the view is empty. Ties (astronomically improbable
/// with a 32-byte digest) resolve to the earlier node in iteration order;
/// callers must iterate the view in a deterministic order for cross-node
/// agreement.
pub fn home_node<'a, I>(view: I, addr: &ActorAddr) -> Option<&'a NodeId>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    let mut best: Option<(&'a NodeId, [u8; PLACEMENT_DIGEST_LENGTH_BYTES])> = None;

    for node in view {
        let weight = placement_weight(node, addr);
        match &best {
            // Strict comparison keeps the earlier node on a tie.
            Some((_, best_weight)) if *best_weight >= weight => {}
            _ => best = Some((node, weight)),
        }
    }

    best.map(|(node, _)| node)
}
