use goblin::pe::section_table::SectionTable;

use crate::error::{Error, Result};

/// One entry of a PE section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// RVA of the section, relative to the image base.
    pub virtual_address: u64,
    /// Number of bytes the section occupies on disk.
    pub raw_size: u64,
    /// File offset of the section's first byte.
    pub raw_pointer: u64,
    pub characteristics: u32,
}

impl Section {
    pub fn new(virtual_address: u64, raw_size: u64, raw_pointer: u64) -> Self {
        Section {
            name: String::new(),
            virtual_address,
            raw_size,
            raw_pointer,
            characteristics: 0,
        }
    }

    pub fn from_goblin(sh: &SectionTable) -> Self {
        let name = sh.name().unwrap_or("").to_string();

        Section {
            name,
            virtual_address: sh.virtual_address as u64,
            raw_size: sh.size_of_raw_data as u64,
            raw_pointer: sh.pointer_to_raw_data as u64,
            characteristics: sh.characteristics,
        }
    }

    /// Virtual window `[start, end)` this section covers once loaded at `image_base`.
    pub fn window(&self, image_base: u64) -> Option<(u64, u64)> {
        let start = image_base.checked_add(self.virtual_address)?;
        let end = start.checked_add(self.raw_size)?;
        Some((start, end))
    }
}

/// Maps virtual addresses to file offsets through a section table.
#[derive(Debug, Clone, Copy)]
pub struct AddressTranslator<'a> {
    image_base: u64,
    sections: &'a [Section],
}

impl<'a> AddressTranslator<'a> {
    pub fn new(image_base: u64, sections: &'a [Section]) -> Self {
        Self {
            image_base,
            sections,
        }
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn sections(&self) -> &'a [Section] {
        self.sections
    }

    /// Sections are assumed not to overlap, so the first window containing
    /// `address` is authoritative.
    pub fn virtual_to_physical(&self, address: u64) -> Result<u64> {
        for section in self.sections {
            let Some((start, end)) = section.window(self.image_base) else {
                continue;
            };

            if address >= start && address < end {
                return Ok((address - start) + section.raw_pointer);
            }
        }

        Err(Error::AddressTranslation { address })
    }

    /// Addresses at or above the image base are virtual; anything lower is
    /// already a file offset.
    pub fn resolve(&self, address: u64) -> Result<u64> {
        if address >= self.image_base {
            let physical = self.virtual_to_physical(address)?;
            log::debug!("Resolved virtual {address:#x} -> physical {physical:#x}");
            Ok(physical)
        } else {
            log::debug!("Treating {address:#x} as a physical offset");
            Ok(address)
        }
    }
}
