//! Disk-resident state store
//!
//! TigerStyle: Explicit atomicity via temp-file rename; no partial writes
//! become visible.
//!
//! This is the bundled default persister: one file per address under a root
//! directory. It is deliberately toy-quality - no compaction, no fsync of
//! the directory, no crash-recovery log. Deployments with real durability
//! requirements plug in their own `Persister`.

use crate::persister::Persister;
use async_trait::async_trait;
use bytes::Bytes;
use selkie_core::{ActorAddr, Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-per-key persister rooted at a directory
pub struct DiskPersister {
    root: PathBuf,
}

impl DiskPersister {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::persister(format!("create {}: {}", root.display(), e)))?;
        debug!(root = %root.display(), "disk persister opened");
        Ok(Self { root })
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for an address
    ///
    /// Address ids are opaque and may contain path separators; encode the
    /// qualified name as lowercase hex so every address maps to exactly one
    /// flat file name.
    fn path_for(&self, addr: &ActorAddr) -> PathBuf {
        let key = addr.to_key_bytes();
        let mut name = String::with_capacity(key.len() * 2 + 6);
        for byte in &key {
            name.push_str(&format!("{:02x}", byte));
        }
        name.push_str(".state");
        self.root.join(name)
    }
}

#[async_trait]
impl Persister for DiskPersister {
    async fn get(&self, addr: &ActorAddr) -> Result<Option<Bytes>> {
        let path = self.path_for(addr);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persister(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn put(&self, addr: &ActorAddr, state: Bytes) -> Result<()> {
        let path = self.path_for(addr);
        let tmp = path.with_extension("tmp");

        tokio::fs::write(&tmp, &state)
            .await
            .map_err(|e| Error::persister(format!("write {}: {}", tmp.display(), e)))?;

        // Visible atomically or not at all.
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::persister(format!("rename {}: {}", path.display(), e)))?;

        Ok(())
    }

    async fn delete(&self, addr: &ActorAddr) -> Result<()> {
        let path = self.path_for(addr);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persister(format!(
                "remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
