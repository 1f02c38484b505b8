//! Probe loader boundary
//!
//! The agent never talks to the kernel directly while wiring programs. Everything it
//! needs from a loaded probe image goes through [`ProbeLoader`], which keeps the
//! binding logic testable without root or a real object file.

use crate::errors::Result;
use kshield_common::{FILLER_PREFIX, RAW_TRACEPOINT_PREFIX};
use std::fmt;

/// Name the loader uses to find a program again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub String);

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A program found in the probe image, as reported by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgram {
    pub qualified_name: String,
    pub handle: ProgramHandle,
}

/// How a loaded program gets wired into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramRole<'a> {
    /// Tail-call target, bound into the dispatch table under `event`.
    Filler { event: &'a str },
    /// Attached directly to the named raw tracepoint.
    Tracepoint { name: &'a str },
}

impl LoadedProgram {
    pub fn new(qualified_name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            handle: ProgramHandle(handle.into()),
        }
    }

    pub fn role(&self) -> ProgramRole<'_> {
        let bare = self
            .qualified_name
            .strip_prefix(RAW_TRACEPOINT_PREFIX)
            .unwrap_or(&self.qualified_name);

        match bare.strip_prefix(FILLER_PREFIX) {
            Some(event) => ProgramRole::Filler { event },
            None => ProgramRole::Tracepoint { name: bare },
        }
    }
}

/// Operations the agent needs from a loaded probe image.
pub trait ProbeLoader {
    /// Every program in the image, in a stable order.
    fn programs(&self) -> Vec<LoadedProgram>;

    /// Make sure the indexed program table exists and is ready for writes.
    fn prepare_table(&mut self, table: &str) -> Result<()>;

    /// Store `program` at `index` of `table`.
    fn write_table_entry(&mut self, table: &str, index: u32, program: &LoadedProgram)
        -> Result<()>;

    /// Attach `program` to the raw tracepoint `tracepoint`.
    fn attach_tracepoint(&mut self, program: &LoadedProgram, tracepoint: &str) -> Result<()>;
}
