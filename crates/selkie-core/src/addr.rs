//! Actor and node addressing
//!
//! TigerStyle: Explicit validation on construction, immutable after creation.

use crate::constants::*;
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ActorAddr
// =============================================================================

/// Cluster-wide address of a virtual actor instance
///
/// An address is a pair of a kind name and an application-chosen id. The kind
/// names a registered actor behaviour and doubles as the wire-level type
/// token; the id is opaque to the runtime beyond equality and its stable
/// serialisation.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ActorAddr {
    kind: String,
    id: String,
}

impl ActorAddr {
    /// Create a new ActorAddr with validation
    ///
    /// # Errors
    /// Returns error if the kind or id exceeds length limits, or the kind
    /// contains characters outside its wire-safe set.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let kind = kind.into();
        let id = id.into();

        // TigerStyle: Explicit validation
        if kind.is_empty() {
            return Err(Error::invalid_address(
                format!("{}:{}", kind, id),
                "kind must not be empty",
            ));
        }

        if kind.len() > ACTOR_KIND_LENGTH_BYTES_MAX {
            return Err(Error::invalid_address(
                format!("{}:{}", kind, id),
                format!(
                    "kind length {} exceeds limit {}",
                    kind.len(),
                    ACTOR_KIND_LENGTH_BYTES_MAX
                ),
            ));
        }

        // Kind names travel on the wire and in storage keys; restrict to a
        // separator-free character set.
        let kind_valid = kind
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !kind_valid {
            return Err(Error::invalid_address(
                format!("{}:{}", kind, id),
                "kind contains invalid characters",
            ));
        }

        if id.is_empty() {
            return Err(Error::invalid_address(
                format!("{}:{}", kind, id),
                "id must not be empty",
            ));
        }

        if id.len() > ACTOR_ID_LENGTH_BYTES_MAX {
            return Err(Error::invalid_address(
                format!("{}:{}", kind, id),
                format!(
                    "id length {} exceeds limit {}",
                    id.len(),
                    ACTOR_ID_LENGTH_BYTES_MAX
                ),
            ));
        }

        Ok(Self { kind, id })
    }

    /// Get the kind name
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Get the id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the full qualified name (kind:id)
    ///
    /// The kind character set excludes `:`, so the qualified name is
    /// unambiguous and stable. Used for wire identity and storage keys.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    /// Convert to bytes for storage keys
    pub fn to_key_bytes(&self) -> Vec<u8> {
        let qualified = self.qualified_name();
        debug_assert!(
            qualified.len() <= ACTOR_KIND_LENGTH_BYTES_MAX + ACTOR_ID_LENGTH_BYTES_MAX + 1
        );
        qualified.into_bytes()
    }
}

impl fmt::Display for ActorAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// =============================================================================
// NodeId
// =============================================================================

/// Unique identifier for a cluster node
///
/// Node IDs should be stable across restarts for the same physical node,
/// typically derived from hostname or configured explicitly.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId with validation
    ///
    /// # Errors
    /// Returns error if id is empty, too long, or contains invalid characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidNodeId {
                id,
                reason: "node ID cannot be empty".into(),
            });
        }

        if id.len() > NODE_ID_LENGTH_BYTES_MAX {
            return Err(Error::InvalidNodeId {
                reason: format!(
                    "node ID length {} exceeds limit {}",
                    id.len(),
                    NODE_ID_LENGTH_BYTES_MAX
                ),
                id,
            });
        }

        let valid = id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(Error::InvalidNodeId {
                id,
                reason: "node ID contains invalid characters".into(),
            });
        }

        Ok(Self(id))
    }

    /// Create a NodeId without validation (for internal use)
    ///
    /// # Safety
    /// Caller must ensure the ID is valid.
    #[doc(hidden)]
    pub fn new_unchecked(id: String) -> Self {
        debug_assert!(!id.is_empty());
        debug_assert!(id.len() <= NODE_ID_LENGTH_BYTES_MAX);
        Self(id)
    }

    /// Get the node ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a unique node ID based on hostname and random suffix
    pub fn generate() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let suffix: u32 = rand::thread_rng().gen();
        let id = format!("{}-{:08x}", hostname, suffix);

        // Hostnames may contain characters outside the validated set; fall
        // back to the suffix alone rather than fail.
        match Self::new(id) {
            Ok(node_id) => node_id,
            Err(_) => Self::new_unchecked(format!("node-{:08x}", suffix)),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_addr_valid() {
        let addr = ActorAddr::new("counter", "user-42").unwrap();
        assert_eq!(addr.kind(), "counter");
        assert_eq!(addr.id(), "user-42");
        assert_eq!(addr.qualified_name(), "counter:user-42");
    }

    #[test]
    fn test_actor_addr_kind_invalid_chars() {
        assert!(ActorAddr::new("coun/ter", "a").is_err());
        assert!(ActorAddr::new("coun:ter", "a").is_err());
    }

    #[test]
    fn test_actor_addr_id_opaque() {
        // Ids are opaque; arbitrary characters are allowed.
        let addr = ActorAddr::new("counter", "user/42:β").unwrap();
        assert_eq!(addr.id(), "user/42:β");
    }

    #[test]
    fn test_actor_addr_too_long() {
        let long_id = "a".repeat(ACTOR_ID_LENGTH_BYTES_MAX + 1);
        assert!(ActorAddr::new("counter", long_id).is_err());
    }

    #[test]
    fn test_actor_addr_display() {
        let addr = ActorAddr::new("counter", "a").unwrap();
        assert_eq!(format!("{}", addr), "counter:a");
    }

    #[test]
    fn test_node_id_valid() {
        let id = NodeId::new("node-1").unwrap();
        assert_eq!(id.as_str(), "node-1");
    }

    #[test]
    fn test_node_id_invalid() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("node one").is_err());
        assert!(NodeId::new("a".repeat(NODE_ID_LENGTH_BYTES_MAX + 1)).is_err());
    }

    #[test]
    fn test_node_id_generate() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
    }
}
