//! Memory sampling for the stopper
//!
//! TigerStyle: All external I/O goes through abstraction traits. The probe
//! is the stopper's only view of system memory; production reads the host,
//! tests and simulations inject scripted values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use sysinfo::System;

/// One observation of system memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    /// Bytes currently available for new allocations
    pub free_bytes: u64,
    /// Total bytes installed
    pub total_bytes: u64,
}

impl MemorySample {
    /// Free/total ratio in [0, 1]
    ///
    /// A zero-total sample (possible on exotic or containerised hosts)
    /// reads as fully free so it never triggers eviction.
    pub fn free_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64
    }
}

/// Source of memory observations
pub trait MemoryProbe: Send + Sync {
    /// Take a fresh sample
    fn sample(&self) -> MemorySample;
}

/// Probe backed by the host's memory counters
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    /// Create a probe over the host system
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&self) -> MemorySample {
        let mut system = self.system.lock().expect("memory probe poisoned");
        system.refresh_memory();
        MemorySample {
            free_bytes: system.available_memory(),
            total_bytes: system.total_memory(),
        }
    }
}

/// Probe returning scripted values
///
/// For tests and simulations: set the free byte count to steer the stopper
/// into or out of pressure.
pub struct FixedMemoryProbe {
    free_bytes: AtomicU64,
    total_bytes: u64,
}

impl FixedMemoryProbe {
    /// Create a probe reporting the given free/total bytes
    pub fn new(free_bytes: u64, total_bytes: u64) -> Self {
        debug_assert!(total_bytes > 0, "total must be positive");
        Self {
            free_bytes: AtomicU64::new(free_bytes),
            total_bytes,
        }
    }

    /// Change the reported free byte count
    pub fn set_free_bytes(&self, free_bytes: u64) {
        self.free_bytes.store(free_bytes, Ordering::SeqCst);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn sample(&self) -> MemorySample {
        MemorySample {
            free_bytes: self.free_bytes.load(Ordering::SeqCst),
            total_bytes: self.total_bytes,
        }
    }
}
