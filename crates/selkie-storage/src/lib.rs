//! Selkie Storage
//!
//! Persister contract and bundled state stores for the Selkie virtual actor
//! runtime. The runtime keys durable state by actor address and needs only
//! three operations: `get`, `put`, `delete`.

pub mod disk;
pub mod memory;
pub mod persister;

pub use disk::DiskPersister;
pub use memory::{Evicted, MemoryPersister};
pub use persister::Persister;
