//! Record Reassembly
//!
//! A record can be split across perf samples at any byte, including inside the
//! header, and one sample can carry several records. Bytes are accumulated per CPU
//! until the header's declared `len` is available, then the record is cut off and
//! whatever follows it stays buffered for the next one.

use super::{PipelineStats, RawChunk, RawSyscallRecord};
use crate::errors::RecordError;
use bytes::BytesMut;
use kshield_common::{PerfEventHeader, PERF_EVENT_HEADER_SIZE};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct RecordReassembler {
    max_record_size: usize,
    streams: HashMap<u32, BytesMut>,
}

impl RecordReassembler {
    pub fn new(max_record_size: usize) -> Self {
        Self {
            max_record_size,
            streams: HashMap::new(),
        }
    }

    /// Feed one chunk. Completed records are appended to `out` in stream order.
    ///
    /// On an invalid declared length the buffered bytes of that CPU are discarded and
    /// the error is returned; records completed before it are still in `out`.
    pub fn push(
        &mut self,
        chunk: RawChunk,
        out: &mut Vec<RawSyscallRecord>,
    ) -> Result<(), RecordError> {
        let buffer = self.streams.entry(chunk.cpu).or_default();
        buffer.extend_from_slice(&chunk.data);

        loop {
            let Some(header) = PerfEventHeader::from_le_bytes(&buffer[..]) else {
                break;
            };

            let declared = header.len as usize;
            if declared < PERF_EVENT_HEADER_SIZE {
                buffer.clear();
                return Err(RecordError::LengthBelowHeader { declared: header.len });
            }
            if declared > self.max_record_size {
                buffer.clear();
                return Err(RecordError::RecordTooLarge {
                    declared: header.len,
                    limit: self.max_record_size,
                });
            }
            if buffer.len() < declared {
                trace!(
                    "cpu {}: waiting for {} more bytes",
                    chunk.cpu,
                    declared - buffer.len()
                );
                break;
            }

            let mut record = buffer.split_to(declared);
            let payload = record.split_off(PERF_EVENT_HEADER_SIZE).freeze();
            out.push(RawSyscallRecord { header, payload });
        }

        Ok(())
    }

    /// Bytes still waiting for the rest of their record, across all CPUs.
    pub fn pending_bytes(&self) -> usize {
        self.streams.values().map(BytesMut::len).sum()
    }

    /// Drop whatever partial records remain. Returns how many CPU streams had one.
    pub fn finish(&mut self) -> usize {
        let mut dropped = 0;
        for (cpu, buffer) in self.streams.drain() {
            if buffer.is_empty() {
                continue;
            }
            dropped += 1;
            if buffer.len() < PERF_EVENT_HEADER_SIZE {
                let err = RecordError::TruncatedHeader {
                    available: buffer.len(),
                    required: PERF_EVENT_HEADER_SIZE,
                };
                warn!("cpu {cpu}: dropping partial record at end of stream: {err}");
            } else {
                warn!(
                    "cpu {cpu}: dropping {} bytes of an incomplete record at end of stream",
                    buffer.len()
                );
            }
        }
        dropped
    }

    /// Consume chunks until the chunk queue closes, forwarding complete records.
    pub async fn run(
        mut self,
        mut chunks: mpsc::Receiver<RawChunk>,
        records: mpsc::Sender<RawSyscallRecord>,
        stats: Arc<PipelineStats>,
    ) {
        let mut ready = Vec::new();

        while let Some(chunk) = chunks.recv().await {
            let cpu = chunk.cpu;
            if let Err(e) = self.push(chunk, &mut ready) {
                warn!("cpu {cpu}: discarding buffered bytes: {e}");
                stats.record_rejected();
            }

            for record in ready.drain(..) {
                if records.send(record).await.is_err() {
                    debug!("record queue closed, stopping reassembler");
                    return;
                }
            }
        }

        let dropped = self.finish();
        stats.add_rejected(dropped as u64);
        debug!("reassembler finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record_bytes(tid: u64, payload: &[u8]) -> Vec<u8> {
        let len = (PERF_EVENT_HEADER_SIZE + payload.len()) as u32;
        let mut bytes = PerfEventHeader::new(1, tid, len, 2, 0).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    fn push_all(reassembler: &mut RecordReassembler, cpu: u32, data: &[u8]) -> Vec<RawSyscallRecord> {
        let mut out = Vec::new();
        reassembler
            .push(RawChunk::new(cpu, data.to_vec()), &mut out)
            .unwrap();
        out
    }

    #[test]
    fn should_emit_record_delivered_in_one_chunk() {
        let mut reassembler = RecordReassembler::new(1024);

        let records = push_all(&mut reassembler, 0, &record_bytes(7, b"abc"));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header.tid, 7);
        assert_eq!(&records[0].payload[..], b"abc");
        assert_eq!(reassembler.pending_bytes(), 0);
    }

    #[test]
    fn should_wait_for_split_header() {
        let mut reassembler = RecordReassembler::new(1024);
        let bytes = record_bytes(9, b"xy");

        assert!(push_all(&mut reassembler, 0, &bytes[..10]).is_empty());
        let records = push_all(&mut reassembler, 0, &bytes[10..]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header.tid, 9);
    }

    #[test]
    fn should_keep_leftover_bytes_for_next_record() {
        let mut reassembler = RecordReassembler::new(1024);
        let mut bytes = record_bytes(1, b"first");
        let second = record_bytes(2, b"second");
        bytes.extend_from_slice(&second[..30]);

        let records = push_all(&mut reassembler, 0, &bytes);
        assert_eq!(records.len(), 1);
        assert_eq!(reassembler.pending_bytes(), 30);

        let records = push_all(&mut reassembler, 0, &second[30..]);
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0].payload[..], b"second");
    }

    #[test]
    fn should_reject_length_below_header_and_reset_stream() {
        let mut reassembler = RecordReassembler::new(1024);
        let bytes = PerfEventHeader::new(0, 0, 3, 0, 0).to_le_bytes();
        let mut out = Vec::new();

        let result = reassembler.push(RawChunk::new(0, bytes.to_vec()), &mut out);

        assert_matches!(result, Err(RecordError::LengthBelowHeader { declared: 3 }));
        assert_eq!(reassembler.pending_bytes(), 0);
    }

    #[test]
    fn should_reject_oversized_records() {
        let mut reassembler = RecordReassembler::new(64);
        let bytes = PerfEventHeader::new(0, 0, 65, 0, 0).to_le_bytes();
        let mut out = Vec::new();

        let result = reassembler.push(RawChunk::new(0, bytes.to_vec()), &mut out);

        assert_matches!(result, Err(RecordError::RecordTooLarge { declared: 65, limit: 64 }));
    }

    #[test]
    fn should_count_streams_with_partial_records_on_finish() {
        let mut reassembler = RecordReassembler::new(1024);
        push_all(&mut reassembler, 0, &record_bytes(1, b"abc")[..5]);
        push_all(&mut reassembler, 1, &record_bytes(1, b"abc")[..28]);
        push_all(&mut reassembler, 2, &record_bytes(1, b"abc"));

        assert_eq!(reassembler.finish(), 2);
        assert_eq!(reassembler.pending_bytes(), 0);
    }
}
