//! Event Pipeline
//!
//! Wires the steady-state stages together:
//!
//! ```text
//! perf samples -> RingBufferReader -> chunk queue -> RecordReassembler
//!              -> record queue -> N decoder workers -> EventSink
//! ```
//!
//! Every queue is bounded, so a slow sink pushes back all the way to the reader.
//! Lost samples bypass the queues; pollers add them to [`PipelineStats::losses`].
//! Shutdown is a drain: once the perf sample senders are gone each stage finishes
//! what it holds and closes the queue behind it.

use super::{
    EventDecoder, LossCounter, RawChunk, RawSyscallRecord, RecordReassembler,
    RingBufferReader, SchemaRegistry,
};
use crate::configuration::Configuration;
use crate::sink::EventSink;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct PipelineStats {
    decoded: AtomicU64,
    rejected: AtomicU64,
    sink_failures: AtomicU64,
    losses: LossCounter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub decoded: u64,
    pub rejected: u64,
    pub sink_failures: u64,
    pub lost: u64,
}

impl PipelineStats {
    pub fn losses(&self) -> &LossCounter {
        &self.losses
    }

    pub fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.add_rejected(1);
    }

    pub fn add_rejected(&self, count: u64) {
        self.rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            decoded: self.decoded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            lost: self.losses.total(),
        }
    }
}

pub struct EventPipeline {
    config: Configuration,
    decoder: EventDecoder,
    sink: Arc<dyn EventSink>,
    stats: Arc<PipelineStats>,
}

impl EventPipeline {
    pub fn new(config: Configuration, sink: Arc<dyn EventSink>) -> Self {
        let decoder = EventDecoder::new(SchemaRegistry::from_config(&config.decode));
        Self {
            config,
            decoder,
            sink,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Spawn all stages. They run until `samples` is closed and drained.
    pub fn start(self, samples: mpsc::Receiver<RawChunk>) -> PipelineHandle {
        let pipeline = &self.config.pipeline;
        let (chunk_tx, chunk_rx) = mpsc::channel(pipeline.chunk_queue_capacity);
        let (record_tx, record_rx) = mpsc::channel(pipeline.record_queue_capacity);
        let mut tasks = Vec::with_capacity(pipeline.decoder_workers + 2);

        let reader = RingBufferReader::new(chunk_tx);
        tasks.push(tokio::spawn(reader.run(samples)));

        let reassembler = RecordReassembler::new(pipeline.max_record_size);
        tasks.push(tokio::spawn(reassembler.run(
            chunk_rx,
            record_tx,
            self.stats.clone(),
        )));

        let records = Arc::new(Mutex::new(record_rx));
        for id in 0..pipeline.decoder_workers {
            tasks.push(tokio::spawn(decode_worker(
                id,
                records.clone(),
                self.decoder.clone(),
                self.sink.clone(),
                self.stats.clone(),
            )));
        }

        info!(
            "Event pipeline started with {} decoder workers",
            pipeline.decoder_workers
        );

        PipelineHandle {
            stats: self.stats,
            tasks,
        }
    }
}

async fn decode_worker(
    id: usize,
    records: Arc<Mutex<mpsc::Receiver<RawSyscallRecord>>>,
    decoder: EventDecoder,
    sink: Arc<dyn EventSink>,
    stats: Arc<PipelineStats>,
) {
    loop {
        let record = records.lock().await.recv().await;
        let Some(record) = record else {
            break;
        };

        let event = match decoder.decode(&record) {
            Ok(event) => event,
            Err(e) => {
                stats.record_rejected();
                warn!(
                    "worker {id}: dropping record type={} tid={}: {e}",
                    record.header.event_type, record.header.tid
                );
                continue;
            }
        };
        stats.record_decoded();

        if let Err(e) = sink.accept(event).await {
            stats.record_sink_failure();
            warn!("worker {id}: sink rejected event: {e:#}");
        }
    }
    debug!("decoder worker {id} exiting");
}

pub struct PipelineHandle {
    stats: Arc<PipelineStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Wait for every stage to drain after the signal stream has closed.
    pub async fn join(self) -> StatsSnapshot {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("pipeline task ended abnormally: {e}");
            }
        }

        let stats = self.stats.snapshot();
        info!(
            "Event pipeline drained: decoded={} rejected={} sink_failures={} lost={}",
            stats.decoded, stats.rejected, stats.sink_failures, stats.lost
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_processing::{DecodedEvent, RawChunk};
    use async_trait::async_trait;
    use kshield_common::{PerfEventHeader, PERF_EVENT_HEADER_SIZE};

    #[derive(Default)]
    struct CountingSink {
        seen: AtomicU64,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn accept(&self, _event: DecodedEvent) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn empty_record(tid: u64) -> Vec<u8> {
        PerfEventHeader::new(0, tid, PERF_EVENT_HEADER_SIZE as u32, 1, 0)
            .to_le_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn should_drain_everything_sent_before_close() {
        let sink = Arc::new(CountingSink::default());
        let pipeline = EventPipeline::new(Configuration::default(), sink.clone());
        let stats = pipeline.stats();
        let (tx, rx) = mpsc::channel(16);
        let handle = pipeline.start(rx);

        for tid in 0..10 {
            tx.send(RawChunk::new(0, empty_record(tid))).await.unwrap();
        }
        stats.losses().record_lost(0, 2);
        assert!(!handle.is_finished());
        drop(tx);

        let stats = handle.join().await;

        assert_eq!(stats.decoded, 10);
        assert_eq!(stats.lost, 2);
        assert_eq!(sink.seen.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn should_start_with_zeroed_stats() {
        assert_eq!(PipelineStats::default().snapshot(), StatsSnapshot::default());
    }
}
