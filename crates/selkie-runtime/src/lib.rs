//! Selkie Runtime
//!
//! Per-node machinery of the Selkie virtual actor runtime: the launcher
//! owning the local instance registry, one loop task per resident instance,
//! and the stopper that evicts the least recently active instance under
//! memory pressure.
//!
//! # TigerStyle
//!
//! - Single-writer discipline: registry and LRU list are mutated only from
//!   their owning task; reads of published tables are lock-guarded snapshots.
//! - Explicit verdicts drive every state and persistence transition.

pub mod instance;
pub mod launcher;
pub mod probe;
pub mod stopper;

pub use instance::{InstanceContext, InstanceHandle, StopSignal};
pub use launcher::{Launcher, LauncherHandle, LocalRegistry};
pub use probe::{FixedMemoryProbe, MemoryProbe, MemorySample, SystemMemoryProbe};
pub use stopper::{Stopper, StopperHandle};
