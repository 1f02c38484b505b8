//! Filler Dispatch Table
//!
//! Maps a filler event name to the tail-call index the kernel dispatcher jumps
//! through. The ordering comes from `kshield_common::FILLER_NAMES`.

use kshield_common::FILLER_NAMES;
use std::collections::HashMap;

pub struct FillerDispatchTable {
    names: &'static [&'static str],
    index: HashMap<&'static str, u32>,
}

impl FillerDispatchTable {
    /// Table matching the probe images built from this workspace.
    pub fn builtin() -> Self {
        Self::from_names(&FILLER_NAMES)
    }

    /// The position of each name is its ID. Duplicate names keep their first position.
    pub fn from_names(names: &'static [&'static str]) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (id, &name) in names.iter().enumerate() {
            index.entry(name).or_insert(id as u32);
        }
        Self { names, index }
    }

    pub fn lookup(&self, event: &str) -> Option<u32> {
        self.index.get(event).copied()
    }

    pub fn name(&self, id: u32) -> Option<&'static str> {
        self.names.get(id as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for FillerDispatchTable {
    fn default() -> Self {
        Self::builtin()
    }
}
