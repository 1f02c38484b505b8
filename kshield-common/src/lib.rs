#![no_std]

#[cfg(test)]
extern crate std;

pub mod fillers;

pub use fillers::{lookup_filler_id, FILLER_NAMES};

/// Size in bytes of [`PerfEventHeader`] on the wire. The header is packed, so this is
/// the plain sum of its field widths.
pub const PERF_EVENT_HEADER_SIZE: usize = 8 + 8 + 4 + 2 + 4;

/// Size in bytes of one entry of the parameter length table.
pub const PARAM_LEN_SIZE: usize = 2;

/// Program array the generic kernel dispatcher tail-calls through.
pub const TAIL_MAP: &str = "tail_map";

/// Per-CPU perf event array carrying syscall records to userspace.
pub const PERF_MAP: &str = "perf_map";

/// Maps whose `max_entries` must match the number of possible CPUs.
pub const PER_CPU_MAPS: [&str; 4] = [
    "perf_map",
    "frame_scratch_map",
    "tmp_scratch_map",
    "local_state_map",
];

/// Section prefix of every raw tracepoint program in the probe image.
pub const RAW_TRACEPOINT_PREFIX: &str = "raw_tracepoint/";

/// Qualified-name marker of tail-call target programs.
pub const FILLER_PREFIX: &str = "filler/";

/// Fixed header written by the kernel in front of every syscall record.
///
/// All fields are little-endian and packed without padding on the wire. `len` covers
/// the whole record, header included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "user", derive(serde::Serialize))]
pub struct PerfEventHeader {
    pub ts: u64,
    pub tid: u64,
    pub len: u32,
    #[cfg_attr(feature = "user", serde(rename = "type"))]
    pub event_type: u16,
    pub nparams: u32,
}

impl PerfEventHeader {
    pub fn new(ts: u64, tid: u64, len: u32, event_type: u16, nparams: u32) -> Self {
        Self {
            ts,
            tid,
            len,
            event_type,
            nparams,
        }
    }

    /// Reads a header from the front of `buf`, or `None` if `buf` is too short.
    pub fn from_le_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < PERF_EVENT_HEADER_SIZE {
            return None;
        }

        let mut ts = [0u8; 8];
        let mut tid = [0u8; 8];
        let mut len = [0u8; 4];
        let mut event_type = [0u8; 2];
        let mut nparams = [0u8; 4];
        ts.copy_from_slice(&buf[0..8]);
        tid.copy_from_slice(&buf[8..16]);
        len.copy_from_slice(&buf[16..20]);
        event_type.copy_from_slice(&buf[20..22]);
        nparams.copy_from_slice(&buf[22..26]);

        Some(Self {
            ts: u64::from_le_bytes(ts),
            tid: u64::from_le_bytes(tid),
            len: u32::from_le_bytes(len),
            event_type: u16::from_le_bytes(event_type),
            nparams: u32::from_le_bytes(nparams),
        })
    }

    pub fn to_le_bytes(&self) -> [u8; PERF_EVENT_HEADER_SIZE] {
        let mut out = [0u8; PERF_EVENT_HEADER_SIZE];
        out[0..8].copy_from_slice(&self.ts.to_le_bytes());
        out[8..16].copy_from_slice(&self.tid.to_le_bytes());
        out[16..20].copy_from_slice(&self.len.to_le_bytes());
        out[20..22].copy_from_slice(&self.event_type.to_le_bytes());
        out[22..26].copy_from_slice(&self.nparams.to_le_bytes());
        out
    }

    /// Number of payload bytes following the header, or `None` when the declared
    /// length cannot even hold the header.
    pub fn payload_len(&self) -> Option<usize> {
        let len = self.len as usize;
        len.checked_sub(PERF_EVENT_HEADER_SIZE)
    }
}
