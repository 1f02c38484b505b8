//! Error types for kshield
//!
//! Startup failures are fatal and surface as [`KShieldError`]. Problems with a single
//! ring-buffer record are [`RecordError`]s: they are logged by the task that hit them
//! and never leave it. [`PolicyError`] covers the policy evaluator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KShieldError {
    #[error("failed to load probe image {path}: {source}")]
    ProbeLoadFailed {
        path: String,
        source: anyhow::Error,
    },

    #[error("eBPF program failed to load: {program_name} - {source}")]
    EbpfLoadFailed {
        program_name: String,
        source: anyhow::Error,
    },

    #[error("eBPF program failed to attach: {program_name} -> {tracepoint} - {source}")]
    EbpfAttachmentFailed {
        program_name: String,
        tracepoint: String,
        source: anyhow::Error,
    },

    #[error("filler id not found for {event_name} (program {program_name})")]
    FillerNotFound {
        program_name: String,
        event_name: String,
    },

    #[error("failed to write {table}[{index}]: {source}")]
    TableUpdateFailed {
        table: String,
        index: u32,
        source: anyhow::Error,
    },

    #[error("eBPF map not found: {map_name}")]
    MapNotFound { map_name: String },

    #[error("eBPF map {map_name} could not be opened: {source}")]
    MapOpenFailed {
        map_name: String,
        source: anyhow::Error,
    },

    #[error("eBPF program not found: {program_name}")]
    ProgramNotFound { program_name: String },

    #[error("failed to initialize ring buffer {map_name}: {source}")]
    RingBufferInitFailed {
        map_name: String,
        source: anyhow::Error,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Policy evaluator error: {0}")]
    Policy(#[from] PolicyError),
}

pub type Result<T> = std::result::Result<T, KShieldError>;

/// Reasons a single record is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("truncated header: {available} bytes available, {required} required")]
    TruncatedHeader { available: usize, required: usize },

    #[error("declared record length {declared} is shorter than the header")]
    LengthBelowHeader { declared: u32 },

    #[error("declared record length {declared} exceeds limit {limit}")]
    RecordTooLarge { declared: u32, limit: usize },

    #[error("param length table needs {required} bytes, payload has {available}")]
    TruncatedParamTable { required: usize, available: usize },

    #[error("param {index} needs {required} bytes, {available} left")]
    ParamUnderrun {
        index: usize,
        required: usize,
        available: usize,
    },

    #[error("param {index} ({field}) is {actual} bytes, expected at least {expected}")]
    FieldTooShort {
        index: usize,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("request to policy engine failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("policy engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected policy engine response: {0}")]
    InvalidResponse(String),

    #[error("failed to read policy file {path}: {source}")]
    PolicyFile {
        path: String,
        source: std::io::Error,
    },
}
