//! Ring Buffer Reader
//!
//! First stage after the perf buffers. Data chunks go to the chunk queue in the order
//! they were read. Lost samples never pass through here; the pollers report them to
//! the [`LossCounter`] directly.

use super::RawChunk;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Running total of samples the kernel dropped. Never decreases.
#[derive(Debug, Clone, Default)]
pub struct LossCounter(Arc<AtomicU64>);

impl LossCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` lost samples and return the new total.
    pub fn add(&self, count: u64) -> u64 {
        self.0.fetch_add(count, Ordering::Relaxed) + count
    }

    /// Record samples the kernel dropped on `cpu`.
    pub fn record_lost(&self, cpu: u32, count: u64) -> u64 {
        let total = self.add(count);
        debug!("cpu {cpu}: kernel dropped {count} samples ({total} total)");
        total
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct RingBufferReader {
    chunks: mpsc::Sender<RawChunk>,
}

impl RingBufferReader {
    pub fn new(chunks: mpsc::Sender<RawChunk>) -> Self {
        Self { chunks }
    }

    /// Forward one sample. Returns `false` once the chunk queue has closed.
    pub async fn handle(&self, chunk: RawChunk) -> bool {
        if chunk.data.is_empty() {
            return true;
        }
        self.chunks.send(chunk).await.is_ok()
    }

    /// Drain `samples` until every poller task has dropped its sender.
    pub async fn run(self, mut samples: mpsc::Receiver<RawChunk>) {
        while let Some(chunk) = samples.recv().await {
            if !self.handle(chunk).await {
                debug!("chunk queue closed, stopping reader");
                return;
            }
        }
        debug!("perf sample stream ended");
    }
}
