//! Probe Binder
//!
//! Wires every program of a loaded probe image into the kernel: fillers go into the
//! tail-call table at their dispatch ID, everything else is attached to its raw
//! tracepoint. Binding is all-or-nothing. Every filler is resolved before the first
//! kernel write, so a version mismatch between this agent and the probe image leaves
//! nothing half-wired.

use super::filler_table::FillerDispatchTable;
use super::probe_loader::{LoadedProgram, ProbeLoader, ProgramRole};
use crate::errors::{KShieldError, Result};
use log::{debug, error, info, trace, warn};

/// One planned kernel write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    TailCall { id: u32, program: LoadedProgram },
    Tracepoint { name: String, program: LoadedProgram },
}

pub struct ProbeBinder<'a> {
    fillers: &'a FillerDispatchTable,
    tail_table: String,
}

impl<'a> ProbeBinder<'a> {
    pub fn new(fillers: &'a FillerDispatchTable, tail_table: impl Into<String>) -> Self {
        Self {
            fillers,
            tail_table: tail_table.into(),
        }
    }

    /// Resolve every program to its binding without touching the kernel.
    pub fn plan(&self, programs: &[LoadedProgram]) -> Result<Vec<Binding>> {
        programs
            .iter()
            .map(|program| match program.role() {
                ProgramRole::Filler { event } => match self.fillers.lookup(event) {
                    Some(id) => Ok(Binding::TailCall {
                        id,
                        program: program.clone(),
                    }),
                    None => {
                        error!(
                            "filler id not found: name={} handle={}",
                            program.qualified_name, program.handle
                        );
                        Err(KShieldError::FillerNotFound {
                            program_name: program.qualified_name.clone(),
                            event_name: event.to_string(),
                        })
                    }
                },
                ProgramRole::Tracepoint { name } => Ok(Binding::Tracepoint {
                    name: name.to_string(),
                    program: program.clone(),
                }),
            })
            .collect()
    }

    /// Bind every program the loader reports. On success the loader is handed back
    /// inside a [`BoundProbe`], which keeps the kernel objects alive.
    pub fn bind<L: ProbeLoader>(&self, mut loader: L) -> Result<BoundProbe<L>> {
        if self.fillers.is_empty() {
            warn!("filler table is empty, every filler program will be rejected");
        }
        loader.prepare_table(&self.tail_table)?;

        let programs = loader.programs();
        let plan = self.plan(&programs)?;

        let mut fillers = Vec::new();
        let mut tracepoints = Vec::new();
        for binding in plan {
            match binding {
                Binding::TailCall { id, program } => {
                    loader.write_table_entry(&self.tail_table, id, &program)?;
                    trace!(
                        "bound {} into {}[{}] ({})",
                        program.qualified_name,
                        self.tail_table,
                        id,
                        self.fillers.name(id).unwrap_or("?")
                    );
                    fillers.push((id, program.qualified_name));
                }
                Binding::Tracepoint { name, program } => {
                    loader.attach_tracepoint(&program, &name)?;
                    debug!("attached {} to raw tracepoint {}", program.handle, name);
                    tracepoints.push(name);
                }
            }
        }

        info!(
            "bound {} fillers into {} and attached {} tracepoints",
            fillers.len(),
            self.tail_table,
            tracepoints.len()
        );

        Ok(BoundProbe {
            _loader: loader,
            tail_table: self.tail_table.clone(),
            fillers,
            tracepoints,
        })
    }
}

/// A fully wired probe image. The tail-call table is never written again.
#[derive(Debug)]
pub struct BoundProbe<L> {
    // Owns the kernel objects; dropping it detaches every program.
    _loader: L,
    tail_table: String,
    fillers: Vec<(u32, String)>,
    tracepoints: Vec<String>,
}

impl<L> BoundProbe<L> {
    pub fn tail_table(&self) -> &str {
        &self.tail_table
    }

    /// `(id, qualified name)` of every bound filler, in binding order.
    pub fn fillers(&self) -> &[(u32, String)] {
        &self.fillers
    }

    pub fn tracepoints(&self) -> &[String] {
        &self.tracepoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn should_plan_tail_calls_and_tracepoints() {
        let table = FillerDispatchTable::builtin();
        let binder = ProbeBinder::new(&table, "tail_map");
        let programs = vec![
            LoadedProgram::new("raw_tracepoint/filler/sys_open_x", "filler_sys_open_x"),
            LoadedProgram::new("raw_tracepoint/sys_exit", "sys_exit"),
        ];

        let plan = binder.plan(&programs).unwrap();

        assert_matches!(&plan[0], Binding::TailCall { id: 5, .. });
        assert_matches!(&plan[1], Binding::Tracepoint { name, .. } if name == "sys_exit");
    }

    #[test]
    fn should_fail_plan_on_unknown_filler() {
        let table = FillerDispatchTable::builtin();
        let binder = ProbeBinder::new(&table, "tail_map");
        let programs = vec![LoadedProgram::new(
            "raw_tracepoint/filler/sys_bogus_x",
            "filler_sys_bogus_x",
        )];

        let result = binder.plan(&programs);

        assert_matches!(
            result,
            Err(KShieldError::FillerNotFound { event_name, .. }) if event_name == "sys_bogus_x"
        );
    }
}
