//! Persister contract
//!
//! TigerStyle: Three explicit operations, safe under concurrent callers.

use async_trait::async_trait;
use bytes::Bytes;
use selkie_core::{ActorAddr, Result};

/// Durable key-value backend keyed by actor address
///
/// The runtime calls `get` once per materialisation and `put`/`delete` as
/// verdicts dictate, possibly from many instance loops concurrently. The
/// runtime never retries: a failed `put` means the update is not durable and
/// the next materialisation observes the last successful one.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Fetch the persisted state for an address
    ///
    /// `Ok(None)` means the address has never been persisted (or was
    /// deleted); it is not an error.
    async fn get(&self, addr: &ActorAddr) -> Result<Option<Bytes>>;

    /// Store the state for an address, replacing any previous value
    async fn put(&self, addr: &ActorAddr, state: Bytes) -> Result<()>;

    /// Remove the state for an address
    ///
    /// Idempotent with respect to absence.
    async fn delete(&self, addr: &ActorAddr) -> Result<()>;
}
