//! Selkie Core
//!
//! Core types, errors, placement and configuration for the Selkie virtual
//! actor runtime.
//!
//! # Overview
//!
//! Selkie is a distributed virtual actor runtime: applications address actor
//! instances by `(kind, id)` and the cluster guarantees at most one resident
//! instance per address, materialised on demand from persisted state and
//! evicted under memory pressure.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `ACTOR_ID_LENGTH_BYTES_MAX`)
//! - Explicit validation on every boundary type

pub mod addr;
pub mod config;
pub mod constants;
pub mod error;
pub mod kind;
pub mod placement;
pub mod telemetry;

pub use addr::{ActorAddr, NodeId};
pub use config::{NodeConfig, PersistConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use kind::{ActorKind, KindRegistry, Message, Verdict};
pub use placement::{home_node, placement_weight};
pub use telemetry::{init_telemetry, TelemetryConfig};
