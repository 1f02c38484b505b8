//! eBPF Probe Management
//!
//! Startup wiring of the probe image: the filler dispatch table, the narrow loader
//! boundary, the binder that populates the tail-call table, and the aya loader
//! that talks to the kernel.

pub mod aya_loader;
pub mod binder;
pub mod filler_table;
pub mod image;
pub mod probe_loader;

pub use aya_loader::AyaProbeLoader;
pub use binder::{Binding, BoundProbe, ProbeBinder};
pub use filler_table::FillerDispatchTable;
pub use image::ProgramSections;
pub use probe_loader::{LoadedProgram, ProbeLoader, ProgramHandle, ProgramRole};
