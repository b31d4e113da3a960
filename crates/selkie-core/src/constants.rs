//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Address Limits
// =============================================================================

/// Maximum length of an actor kind name in bytes
pub const ACTOR_KIND_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of an actor id in bytes
pub const ACTOR_ID_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of a node id in bytes
pub const NODE_ID_LENGTH_BYTES_MAX: usize = 128;

// =============================================================================
// Instance Limits
// =============================================================================

/// Default idle time-to-live before an instance stops itself (10 min)
pub const TIME_TO_LIVE_MS_DEFAULT: u64 = 10 * 60 * 1000;

/// Maximum number of resident instances per node
pub const INSTANCE_RESIDENT_COUNT_MAX: usize = 1_000_000;

// =============================================================================
// Memory Pressure
// =============================================================================

/// Free/total memory ratio below which the stopper evicts the oldest instance
pub const MEMORY_FREE_RATIO_MIN: f64 = 0.20;

// =============================================================================
// Cluster Limits
// =============================================================================

/// Maximum number of nodes in a cluster view
pub const CLUSTER_NODES_COUNT_MAX: usize = 1024;

/// Length of the placement digest in bytes (SHA-256)
pub const PLACEMENT_DIGEST_LENGTH_BYTES: usize = 32;

// Compile-time assertions for constant validity
const _: () = {
    assert!(ACTOR_KIND_LENGTH_BYTES_MAX >= 16);
    assert!(ACTOR_ID_LENGTH_BYTES_MAX >= ACTOR_KIND_LENGTH_BYTES_MAX);
    assert!(TIME_TO_LIVE_MS_DEFAULT == 600_000);
    assert!(MEMORY_FREE_RATIO_MIN > 0.0 && MEMORY_FREE_RATIO_MIN < 1.0);
    assert!(PLACEMENT_DIGEST_LENGTH_BYTES == 32);
};
