//! Perf Buffer Management
//!
//! Handles CPU detection and buffer coordination for the probe's per-CPU maps.
//! The perf event array has one ring per CPU, so every online CPU needs a reader
//! and the per-CPU maps must be sized for the highest CPU index, not the count.

use aya::util::online_cpus;
use bytes::BytesMut;
use log::warn;

/// Manages perf buffers and CPU coordination
#[derive(Debug, Clone)]
pub struct PerfBufferManager {
    cpus: Vec<u32>,
}

impl PerfBufferManager {
    /// Create a new buffer manager with online CPU detection
    pub fn new() -> Self {
        Self {
            cpus: Self::detect_online_cpus(),
        }
    }

    /// Manager for an explicit CPU set. An empty set falls back to CPU 0.
    pub fn with_cpus(mut cpus: Vec<u32>) -> Self {
        if cpus.is_empty() {
            cpus.push(0);
        }
        cpus.sort_unstable();
        cpus.dedup();
        Self { cpus }
    }

    /// Get the list of online CPUs
    pub fn online_cpus(&self) -> &[u32] {
        &self.cpus
    }

    /// Entries a per-CPU map needs so that every online CPU index is addressable.
    pub fn map_capacity(&self) -> u32 {
        self.cpus.iter().max().map_or(1, |max| max + 1)
    }

    /// Create a pool of buffers for event reading
    pub fn create_buffer_pool(&self, buffer_size: usize, pool_size: usize) -> Vec<BytesMut> {
        (0..pool_size)
            .map(|_| BytesMut::with_capacity(buffer_size))
            .collect()
    }

    fn detect_online_cpus() -> Vec<u32> {
        match online_cpus() {
            Ok(cpus) if !cpus.is_empty() => cpus,
            Ok(_) => {
                warn!("No online CPUs detected, defaulting to CPU 0");
                vec![0]
            }
            Err(e) => {
                warn!("Failed to detect online CPUs: {:?}, defaulting to CPU 0", e);
                vec![0]
            }
        }
    }
}

impl Default for PerfBufferManager {
    fn default() -> Self {
        Self::new()
    }
}
