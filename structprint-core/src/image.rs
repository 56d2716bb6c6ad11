use std::io::Read;

use goblin::Object;

use crate::error::{Error, Result};
use crate::sections::{AddressTranslator, Section};

/// A PE image held entirely in memory.
#[derive(Debug)]
pub struct Image {
    pub path: String,
    pub data: Vec<u8>,
    pub image_base: u64,
    pub sections: Vec<Section>,
}

impl Image {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(&path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut image = Self::from_bytes(buf)?;
        image.path = path.as_ref().display().to_string();
        Ok(image)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let (image_base, sections) = match Object::parse(&data)? {
            Object::PE(pe) => {
                let image_base = pe
                    .header
                    .optional_header
                    .map(|oh| oh.windows_fields.image_base)
                    .ok_or_else(|| {
                        Error::NotPortableExecutable("missing optional header".to_string())
                    })?;

                let sections: Vec<Section> =
                    pe.sections.iter().map(Section::from_goblin).collect();
                (image_base, sections)
            }
            Object::Elf(_) => {
                return Err(Error::NotPortableExecutable("ELF images are not supported".to_string()))
            }
            _ => return Err(Error::NotPortableExecutable("unrecognized format".to_string())),
        };

        log::info!(
            "Image base {:#x}, {} sections, {} bytes",
            image_base,
            sections.len(),
            data.len()
        );
        for s in &sections {
            log::debug!(
                "Section {:<8} rva {:#010x} raw size {:#x} raw ptr {:#x}",
                s.name,
                s.virtual_address,
                s.raw_size,
                s.raw_pointer
            );
        }

        Ok(Self {
            path: String::new(),
            data,
            image_base,
            sections,
        })
    }

    pub fn translator(&self) -> AddressTranslator<'_> {
        AddressTranslator::new(self.image_base, &self.sections)
    }
}
