//! Perf Map Poller
//!
//! One task per online CPU reads its ring of the perf event array and sends every
//! sample downstream as a [`RawChunk`]. Lost-sample notices go straight to the
//! [`LossCounter`], so they never wait behind queued data. All tasks share one
//! cancellation token; once they have exited the chunk channel closes and the
//! downstream stages drain.

use super::{LossCounter, PerfBufferManager, RawChunk};
use crate::configuration::Pipeline;
use crate::errors::{KShieldError, Result};
use aya::maps::{perf::AsyncPerfEventArray, MapData};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct PerfMapPoller {
    array: AsyncPerfEventArray<MapData>,
    map_name: String,
    buffers: PerfBufferManager,
    losses: LossCounter,
    batch_size: usize,
    buffer_size: usize,
    pages: Option<usize>,
}

impl PerfMapPoller {
    pub fn new(
        array: AsyncPerfEventArray<MapData>,
        map_name: impl Into<String>,
        buffers: PerfBufferManager,
        losses: LossCounter,
        pipeline: &Pipeline,
    ) -> Self {
        Self {
            array,
            map_name: map_name.into(),
            buffers,
            losses,
            batch_size: pipeline.read_batch_size.max(1),
            buffer_size: pipeline.read_buffer_size,
            pages: pipeline.perf_buffer_pages,
        }
    }

    /// Open every CPU ring and spawn its reader task.
    pub fn start(mut self, chunks: mpsc::Sender<RawChunk>) -> Result<PollerHandle> {
        let token = CancellationToken::new();
        let mut tasks = Vec::with_capacity(self.buffers.online_cpus().len());

        for &cpu in self.buffers.online_cpus() {
            let mut ring =
                self.array
                    .open(cpu, self.pages)
                    .map_err(|e| KShieldError::RingBufferInitFailed {
                        map_name: format!("{} (cpu {cpu})", self.map_name),
                        source: e.into(),
                    })?;
            let mut pool = self
                .buffers
                .create_buffer_pool(self.buffer_size, self.batch_size);
            let chunks = chunks.clone();
            let losses = self.losses.clone();
            let token = token.clone();

            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        events = ring.read_events(&mut pool) => {
                            let events = match events {
                                Ok(events) => events,
                                Err(e) => {
                                    warn!("cpu {cpu}: perf buffer read failed: {e}");
                                    break;
                                }
                            };

                            if events.lost > 0 {
                                losses.record_lost(cpu, events.lost as u64);
                            }

                            for buf in pool.iter_mut().take(events.read) {
                                let chunk = RawChunk { cpu, data: buf.split().freeze() };
                                if chunks.send(chunk).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                debug!("cpu {cpu}: poller exiting");
            }));
        }

        info!(
            "Polling {} on {} CPUs",
            self.map_name,
            self.buffers.online_cpus().len()
        );
        Ok(PollerHandle { token, tasks })
    }
}

pub struct PollerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop all CPU readers and wait for them to exit.
    pub async fn stop(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("poller task ended abnormally: {e}");
            }
        }
    }
}
