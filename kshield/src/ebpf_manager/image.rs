//! Probe image sections
//!
//! A program's role is carried by the ELF section it lives in
//! (`raw_tracepoint/filler/<event>` or `raw_tracepoint/<tracepoint>`), not by its
//! function name. aya reports programs by function name, so the section of every
//! function symbol is read from the image before it is handed to aya.

use object::{Object as _, ObjectSection as _, ObjectSymbol as _, SymbolKind};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramSections {
    by_function: HashMap<String, String>,
}

impl ProgramSections {
    /// Map every function symbol of an ELF image to the name of its section.
    pub fn parse(image: &[u8]) -> anyhow::Result<Self> {
        let file = object::File::parse(image)?;
        let mut by_function = HashMap::new();

        for symbol in file.symbols() {
            if symbol.kind() != SymbolKind::Text {
                continue;
            }
            let Some(index) = symbol.section_index() else {
                continue;
            };
            let name = symbol.name()?;
            if name.is_empty() {
                continue;
            }
            let section = file.section_by_index(index)?;
            by_function.insert(name.to_string(), section.name()?.to_string());
        }

        Ok(Self { by_function })
    }

    pub fn section_of(&self, function: &str) -> Option<&str> {
        self.by_function.get(function).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_function.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_function.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use object::write::{Object, Symbol, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolScope};

    /// Build a BPF ELF object with one function per `(section, function)` pair.
    pub(crate) fn bpf_image(programs: &[(&str, &str)]) -> Vec<u8> {
        let mut obj = Object::new(BinaryFormat::Elf, Architecture::Bpf, Endianness::Little);
        for (section, function) in programs {
            let id = obj.add_section(Vec::new(), section.as_bytes().to_vec(), SectionKind::Text);
            // exit instruction
            let offset = obj.append_section_data(id, &[0x95, 0, 0, 0, 0, 0, 0, 0], 8);
            obj.add_symbol(Symbol {
                name: function.as_bytes().to_vec(),
                value: offset,
                size: 8,
                kind: SymbolKind::Text,
                scope: SymbolScope::Linkage,
                weak: false,
                section: SymbolSection::Section(id),
                flags: SymbolFlags::None,
            });
        }
        obj.write().unwrap()
    }

    #[test]
    fn should_map_functions_to_their_sections_whatever_their_names() {
        let image = bpf_image(&[
            ("raw_tracepoint/filler/sys_open_x", "bpf_sys_open_x"),
            ("raw_tracepoint/sys_enter", "sys_enter"),
        ]);

        let sections = ProgramSections::parse(&image).unwrap();

        assert_eq!(
            sections.section_of("bpf_sys_open_x"),
            Some("raw_tracepoint/filler/sys_open_x")
        );
        assert_eq!(sections.section_of("sys_enter"), Some("raw_tracepoint/sys_enter"));
        assert_eq!(sections.section_of("missing"), None);
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn should_reject_non_elf_images() {
        assert!(ProgramSections::parse(b"not an object file").is_err());
    }

    #[test]
    fn should_find_nothing_in_image_without_functions() {
        let sections = ProgramSections::parse(&bpf_image(&[])).unwrap();

        assert!(sections.is_empty());
    }
}
