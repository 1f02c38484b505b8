//! aya-backed probe loader
//!
//! Loads a compiled probe object from disk, loads every raw tracepoint program in it
//! and implements [`ProbeLoader`] on top of the resulting [`Ebpf`] instance. Programs
//! are reported under the section they were compiled into.

use super::image::ProgramSections;
use super::probe_loader::{LoadedProgram, ProbeLoader, ProgramHandle};
use crate::errors::{KShieldError, Result};
use aya::{
    maps::{perf::AsyncPerfEventArray, MapData, ProgramArray},
    programs::{Program, RawTracePoint},
    Ebpf, EbpfLoader,
};
use aya_log::EbpfLogger;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct AyaProbeLoader {
    ebpf: Ebpf,
    programs: Vec<LoadedProgram>,
    // Program arrays are emptied by the kernel once the last user reference goes away,
    // so the tables stay here for the life of the loader.
    tables: HashMap<String, ProgramArray<MapData>>,
}

impl AyaProbeLoader {
    /// Load the probe image at `path`, sizing `per_cpu_maps` to `cpu_count` entries.
    pub fn load(path: &Path, cpu_count: u32, per_cpu_maps: &[String]) -> Result<Self> {
        let load_failed = |source: anyhow::Error| KShieldError::ProbeLoadFailed {
            path: path.display().to_string(),
            source,
        };

        let image = fs::read(path).map_err(|e| load_failed(e.into()))?;
        let sections = ProgramSections::parse(&image).map_err(load_failed)?;
        if sections.is_empty() {
            warn!("no functions found in {}", path.display());
        }
        debug!("{} functions in {}", sections.len(), path.display());

        let mut loader = EbpfLoader::new();
        for map in per_cpu_maps {
            loader.set_max_entries(map, cpu_count);
        }
        let mut ebpf = loader.load(&image).map_err(|e| load_failed(e.into()))?;

        if let Err(e) = EbpfLogger::init(&mut ebpf) {
            warn!("failed to initialize eBPF logger: {e}");
        }

        let mut programs = Vec::new();
        for (name, program) in ebpf.programs_mut() {
            let Program::RawTracePoint(program) = program else {
                debug!("skipping {name}: not a raw tracepoint program");
                continue;
            };
            program.load().map_err(|e| KShieldError::EbpfLoadFailed {
                program_name: name.to_string(),
                source: e.into(),
            })?;

            let section = sections
                .section_of(name)
                .ok_or_else(|| KShieldError::EbpfLoadFailed {
                    program_name: name.to_string(),
                    source: anyhow::anyhow!("no section found for program"),
                })?;
            programs.push(LoadedProgram::new(section, name));
        }
        programs.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));

        Ok(Self {
            ebpf,
            programs,
            tables: HashMap::new(),
        })
    }

    /// Take the perf event array `map_name` out of the image for reading.
    pub fn open_perf_buffer(&mut self, map_name: &str) -> Result<AsyncPerfEventArray<MapData>> {
        let map = self
            .ebpf
            .take_map(map_name)
            .ok_or_else(|| KShieldError::MapNotFound {
                map_name: map_name.to_string(),
            })?;

        AsyncPerfEventArray::try_from(map).map_err(|e| KShieldError::RingBufferInitFailed {
            map_name: map_name.to_string(),
            source: e.into(),
        })
    }

    fn raw_tracepoint(&mut self, handle: &ProgramHandle) -> Result<&mut RawTracePoint> {
        self.ebpf
            .program_mut(&handle.0)
            .ok_or_else(|| KShieldError::ProgramNotFound {
                program_name: handle.0.clone(),
            })?
            .try_into()
            .map_err(|e: aya::programs::ProgramError| KShieldError::EbpfLoadFailed {
                program_name: handle.0.clone(),
                source: e.into(),
            })
    }
}

impl ProbeLoader for AyaProbeLoader {
    fn programs(&self) -> Vec<LoadedProgram> {
        self.programs.clone()
    }

    fn prepare_table(&mut self, table: &str) -> Result<()> {
        if self.tables.contains_key(table) {
            return Ok(());
        }

        let map = self
            .ebpf
            .take_map(table)
            .ok_or_else(|| KShieldError::MapNotFound {
                map_name: table.to_string(),
            })?;
        let array = ProgramArray::try_from(map).map_err(|e| KShieldError::MapOpenFailed {
            map_name: table.to_string(),
            source: e.into(),
        })?;

        self.tables.insert(table.to_string(), array);
        Ok(())
    }

    fn write_table_entry(
        &mut self,
        table: &str,
        index: u32,
        program: &LoadedProgram,
    ) -> Result<()> {
        let update_failed = |source: anyhow::Error| KShieldError::TableUpdateFailed {
            table: table.to_string(),
            index,
            source,
        };

        let fd = self
            .ebpf
            .program(&program.handle.0)
            .ok_or_else(|| KShieldError::ProgramNotFound {
                program_name: program.handle.0.clone(),
            })?
            .fd()
            .map_err(|e| update_failed(e.into()))?;

        let array = self
            .tables
            .get_mut(table)
            .ok_or_else(|| KShieldError::MapNotFound {
                map_name: table.to_string(),
            })?;

        array.set(index, fd, 0).map_err(|e| update_failed(e.into()))
    }

    fn attach_tracepoint(&mut self, program: &LoadedProgram, tracepoint: &str) -> Result<()> {
        let raw = self.raw_tracepoint(&program.handle)?;
        raw.attach(tracepoint)
            .map_err(|e| KShieldError::EbpfAttachmentFailed {
                program_name: program.qualified_name.clone(),
                tracepoint: tracepoint.to_string(),
                source: e.into(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebpf_manager::image::tests::bpf_image;
    use crate::ebpf_manager::ProgramRole;

    #[test]
    fn should_fail_on_missing_image() {
        let result = AyaProbeLoader::load(Path::new("/nonexistent/probe.o"), 1, &[]);

        assert!(matches!(result, Err(KShieldError::ProbeLoadFailed { .. })));
    }

    #[test]
    fn should_derive_roles_from_sections_not_function_names() {
        let image = bpf_image(&[
            ("raw_tracepoint/filler/sys_open_x", "bpf_sys_open_x"),
            ("raw_tracepoint/sys_enter", "filler_lookalike"),
        ]);
        let sections = ProgramSections::parse(&image).unwrap();

        let program = |function: &str| {
            LoadedProgram::new(sections.section_of(function).unwrap(), function)
        };
        let filler = program("bpf_sys_open_x");
        let tracepoint = program("filler_lookalike");

        assert_eq!(filler.role(), ProgramRole::Filler { event: "sys_open_x" });
        assert_eq!(tracepoint.role(), ProgramRole::Tracepoint { name: "sys_enter" });
    }
}
