//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Address Errors
    // =========================================================================
    #[error("Invalid actor address: {addr}, reason: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Invalid node ID: {id}, reason: {reason}")]
    InvalidNodeId { id: String, reason: String },

    // =========================================================================
    // Routing Errors
    // =========================================================================
    /// The cluster view is empty; no node can host the addressed actor.
    #[error("No home node: cluster view is empty")]
    NoHomeNode,

    /// A handle observed alive on the fast path terminated before the
    /// message could be enqueued. The message is dropped.
    #[error("Stale handle for {addr}: instance terminated before delivery")]
    StaleHandle { addr: String },

    #[error("Node unreachable: {node}")]
    NodeUnreachable { node: String },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    #[error("Persister operation failed: {reason}")]
    Persister { reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Create a stale handle error
    pub fn stale_handle(addr: impl Into<String>) -> Self {
        Self::StaleHandle { addr: addr.into() }
    }

    /// Create a persister error
    pub fn persister(reason: impl Into<String>) -> Self {
        Self::Persister {
            reason: reason.into(),
        }
    }

    /// Create a node unreachable error
    pub fn node_unreachable(node: impl Into<String>) -> Self {
        Self::NodeUnreachable { node: node.into() }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::stale_handle("counter:a");
        assert!(err.to_string().contains("counter:a"));
    }

    #[test]
    fn test_persister_error_display() {
        let err = Error::persister("disk full");
        assert!(err.to_string().contains("disk full"));
    }
}
