//! Event Processing Module
//!
//! Steady-state data path from the kernel perf buffers to the event sink:
//!
//! - PerfMapPoller: per-CPU readers over the perf event array
//! - RingBufferReader: forwards raw chunks into the chunk queue
//! - RecordReassembler: turns chunks into complete header-delimited records
//! - EventDecoder: parses the parameter block of one record
//! - EventPipeline: wires the stages together with bounded queues

pub mod buffer_manager;
pub mod parser;
pub mod poller;
pub mod processor;
pub mod reader;
pub mod reassembler;
pub mod schema;

pub use buffer_manager::PerfBufferManager;
pub use parser::EventDecoder;
pub use poller::{PerfMapPoller, PollerHandle};
pub use processor::{EventPipeline, PipelineHandle, PipelineStats, StatsSnapshot};
pub use reader::{LossCounter, RingBufferReader};
pub use reassembler::RecordReassembler;
pub use schema::{FieldKind, FieldSpec, ParamSchema, SchemaRegistry};

use bytes::Bytes;
use kshield_common::PerfEventHeader;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bytes of one perf sample, tagged with the CPU buffer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub cpu: u32,
    pub data: Bytes,
}

impl RawChunk {
    pub fn new(cpu: u32, data: impl Into<Bytes>) -> Self {
        Self {
            cpu,
            data: data.into(),
        }
    }
}

/// A complete record with the header split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSyscallRecord {
    pub header: PerfEventHeader,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    U64(u64),
    U32(u32),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEvent {
    #[serde(flatten)]
    pub header: PerfEventHeader,
    pub fields: BTreeMap<String, FieldValue>,
}

impl DecodedEvent {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
