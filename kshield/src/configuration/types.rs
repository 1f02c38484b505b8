//! Configuration type definitions
//!
//! Every section deserializes with defaults, so a config file only needs the keys it
//! wants to change.

use clap::ValueEnum;
use kshield_common::{PERF_MAP, PER_CPU_MAPS, TAIL_MAP};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub image_path: PathBuf,
    pub tail_table: String,
    pub perf_map: String,
    pub per_cpu_maps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    pub decoder_workers: usize,
    /// Reader to reassembler queue. Large on purpose: it absorbs kernel bursts.
    pub chunk_queue_capacity: usize,
    pub record_queue_capacity: usize,
    pub signal_queue_capacity: usize,
    pub max_record_size: usize,
    pub read_batch_size: usize,
    pub read_buffer_size: usize,
    pub perf_buffer_pages: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Decode {
    pub dirfd_width: IntWidth,
    pub extra_params: ExtraParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Output {
    pub sink: SinkKind,
    pub format: OutputFormat,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub opa_url: String,
    pub decision_path: String,
    pub policy_dir: Option<PathBuf>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntWidth {
    U32,
    #[default]
    U64,
}

/// What happens to parameters past the last typed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtraParams {
    #[default]
    Drop,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Policy,
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl Policy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from("bpf/probe.o"),
            tail_table: TAIL_MAP.to_string(),
            perf_map: PERF_MAP.to_string(),
            per_cpu_maps: PER_CPU_MAPS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            decoder_workers: 5,
            chunk_queue_capacity: 100_000,
            record_queue_capacity: 1024,
            signal_queue_capacity: 1024,
            max_record_size: 64 * 1024,
            read_batch_size: 10,
            read_buffer_size: 4096,
            perf_buffer_pages: None,
        }
    }
}

impl Default for Decode {
    fn default() -> Self {
        Self {
            dirfd_width: IntWidth::U64,
            extra_params: ExtraParams::Drop,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            opa_url: "http://127.0.0.1:8181".to_string(),
            decision_path: "kshield/allow".to_string(),
            policy_dir: None,
            timeout_ms: 2000,
        }
    }
}
