//! Configuration for Selkie nodes
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a Selkie node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier (auto-generated from hostname if not specified)
    #[serde(default)]
    pub node_id: Option<String>,

    /// Route sends but never host actors
    ///
    /// A client-only node starts no launcher, stopper or persister, and
    /// excludes itself from its own placement view.
    #[serde(default)]
    pub client_only: bool,

    /// Fallback idle time-to-live in milliseconds
    ///
    /// Used for instances whose behaviour does not supply its own ttl.
    #[serde(default = "default_time_to_live_ms")]
    pub default_time_to_live_ms: u64,

    /// Persister selection
    #[serde(default)]
    pub persist: PersistConfig,
}

fn default_time_to_live_ms() -> u64 {
    TIME_TO_LIVE_MS_DEFAULT
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            client_only: false,
            default_time_to_live_ms: default_time_to_live_ms(),
            persist: PersistConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref id) = self.node_id {
            if id.is_empty() || id.len() > NODE_ID_LENGTH_BYTES_MAX {
                return Err(Error::InvalidConfiguration {
                    field: "node_id".into(),
                    reason: format!("length must be 1..={}", NODE_ID_LENGTH_BYTES_MAX),
                });
            }
        }

        if self.default_time_to_live_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "default_time_to_live_ms".into(),
                reason: "must be positive".into(),
            });
        }

        self.persist.validate()
    }

    /// Default ttl as a Duration
    pub fn default_time_to_live(&self) -> Duration {
        Duration::from_millis(self.default_time_to_live_ms)
    }
}

/// Persister selection
///
/// The bundled disk store is the default; it is toy-quality and documented
/// as such. Applications with real durability requirements supply their own
/// persister implementation to the node builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum PersistConfig {
    /// In-memory store, optionally bounded
    Memory {
        /// Maximum number of entries; `None` is unbounded
        #[serde(default)]
        capacity: Option<usize>,
    },
    /// File-per-key store under a root directory
    Disk {
        /// Root directory for state files
        dir: PathBuf,
    },
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self::Disk {
            dir: PathBuf::from("selkie-data"),
        }
    }
}

impl PersistConfig {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Memory { capacity: Some(0) } => Err(Error::InvalidConfiguration {
                field: "persist.capacity".into(),
                reason: "bounded capacity must be positive".into(),
            }),
            Self::Memory { .. } => Ok(()),
            Self::Disk { dir } => {
                if dir.as_os_str().is_empty() {
                    return Err(Error::InvalidConfiguration {
                        field: "persist.dir".into(),
                        reason: "directory must not be empty".into(),
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = NodeConfig::default();
        assert!(!config.client_only);
        assert_eq!(config.default_time_to_live_ms, 600_000);
        assert!(matches!(config.persist, PersistConfig::Disk { .. }));
        config.validate().unwrap();
    }

    #[test]
    fn test_config_rejects_zero_ttl() {
        let config = NodeConfig {
            default_time_to_live_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_capacity() {
        let config = NodeConfig {
            persist: PersistConfig::Memory { capacity: Some(0) },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: NodeConfig = serde_json::from_str(
            r#"{
                "client_only": true,
                "persist": { "provider": "memory" }
            }"#,
        )
        .unwrap();
        assert!(config.client_only);
        assert_eq!(config.default_time_to_live_ms, 600_000);
        assert!(matches!(
            config.persist,
            PersistConfig::Memory { capacity: None }
        ));
        config.validate().unwrap();
    }
}
