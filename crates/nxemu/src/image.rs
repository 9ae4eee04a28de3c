//! The program image container.
//!
//! Images are a small sectioned format: a fixed header naming an entry
//! point, then up to four sections, each carrying its file range and guest
//! load address. All multi-byte fields are little-endian.
//!
//! ```text
//! 0x00  magic    "NXPG"
//! 0x04  version  u32 (currently 1)
//! 0x08  entry    u64
//! 0x10  count    u32 (<= 4)
//! 0x14  sections count * { file_offset u32, size u32, load_address u64 }
//! ```

use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"NXPG";
pub const VERSION: u32 = 1;
pub const MAX_SECTIONS: usize = 4;

const FIXED_HEADER_LEN: usize = 0x14;
const SECTION_ENTRY_LEN: usize = 0x10;

/// Total header size with the section table at its maximum.
pub const HEADER_LEN: usize = FIXED_HEADER_LEN + MAX_SECTIONS * SECTION_ENTRY_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("file too short for an image header ({len} bytes)")]
    Truncated { len: usize },
    #[error("bad magic (expected \"NXPG\")")]
    BadMagic,
    #[error("unsupported image version {version}")]
    UnsupportedVersion { version: u32 },
    #[error("section count {count} exceeds the maximum of {MAX_SECTIONS}")]
    TooManySections { count: u32 },
    #[error("section {index} extends past the end of the file")]
    SectionOutOfFile { index: usize },
}

/// One loadable section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSection {
    pub file_offset: u32,
    pub size: u32,
    pub load_address: u64,
}

/// A parsed image, borrowing the file bytes.
#[derive(Debug)]
pub struct Image<'a> {
    pub entry: u64,
    pub sections: Vec<ImageSection>,
    file: &'a [u8],
}

impl<'a> Image<'a> {
    /// Parse and validate a serialized image.
    pub fn parse(file: &'a [u8]) -> Result<Self, ImageError> {
        if file.len() < FIXED_HEADER_LEN {
            return Err(ImageError::Truncated { len: file.len() });
        }
        if &file[0..4] != MAGIC {
            return Err(ImageError::BadMagic);
        }
        let version = read_u32(file, 0x04);
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion { version });
        }
        let entry = read_u64(file, 0x08);
        let count = read_u32(file, 0x10);
        if count as usize > MAX_SECTIONS {
            return Err(ImageError::TooManySections { count });
        }

        let table_end = FIXED_HEADER_LEN + count as usize * SECTION_ENTRY_LEN;
        if file.len() < table_end {
            return Err(ImageError::Truncated { len: file.len() });
        }

        let mut sections = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            let at = FIXED_HEADER_LEN + index * SECTION_ENTRY_LEN;
            let section = ImageSection {
                file_offset: read_u32(file, at),
                size: read_u32(file, at + 4),
                load_address: read_u64(file, at + 8),
            };
            let end = section.file_offset as u64 + section.size as u64;
            if end > file.len() as u64 {
                return Err(ImageError::SectionOutOfFile { index });
            }
            sections.push(section);
        }

        Ok(Self {
            entry,
            sections,
            file,
        })
    }

    /// The file bytes backing one section.
    pub fn section_bytes(&self, section: &ImageSection) -> &'a [u8] {
        let start = section.file_offset as usize;
        &self.file[start..start + section.size as usize]
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

/// Builds serialized images, mainly for the embedded demo and tests.
#[derive(Debug, Default)]
pub struct ImageBuilder {
    entry: u64,
    sections: Vec<(u64, Vec<u8>)>,
}

impl ImageBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            sections: Vec::new(),
        }
    }

    /// Append a section loading `bytes` at `load_address`.
    pub fn section(mut self, load_address: u64, bytes: Vec<u8>) -> Self {
        assert!(self.sections.len() < MAX_SECTIONS, "too many sections");
        self.sections.push((load_address, bytes));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[0..4].copy_from_slice(MAGIC);
        out[0x04..0x08].copy_from_slice(&VERSION.to_le_bytes());
        out[0x08..0x10].copy_from_slice(&self.entry.to_le_bytes());
        out[0x10..0x14].copy_from_slice(&(self.sections.len() as u32).to_le_bytes());

        for (index, (load_address, bytes)) in self.sections.into_iter().enumerate() {
            let file_offset = out.len() as u32;
            let at = FIXED_HEADER_LEN + index * SECTION_ENTRY_LEN;
            out[at..at + 4].copy_from_slice(&file_offset.to_le_bytes());
            out[at + 4..at + 8].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
            out[at + 8..at + 16].copy_from_slice(&load_address.to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_output_parses_back() {
        let file = ImageBuilder::new(0x1_0000)
            .section(0x1_0000, vec![1, 2, 3, 4])
            .section(0x2_0000, vec![9; 16])
            .build();

        let image = Image::parse(&file).unwrap();
        assert_eq!(image.entry, 0x1_0000);
        assert_eq!(image.sections.len(), 2);
        assert_eq!(image.section_bytes(&image.sections[0]), &[1, 2, 3, 4]);
        assert_eq!(image.sections[1].load_address, 0x2_0000);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut file = ImageBuilder::new(0).build();
        file[0] = b'X';
        assert!(matches!(Image::parse(&file), Err(ImageError::BadMagic)));

        let mut file = ImageBuilder::new(0).build();
        file[0x04] = 9;
        assert!(matches!(
            Image::parse(&file),
            Err(ImageError::UnsupportedVersion { version: 9 })
        ));
    }

    #[test]
    fn rejects_truncation_and_runaway_sections() {
        assert!(matches!(
            Image::parse(&[0u8; 4]),
            Err(ImageError::Truncated { len: 4 })
        ));

        let mut file = ImageBuilder::new(0).section(0, vec![1, 2, 3]).build();
        // Inflate the first section's declared size past the file end.
        file[0x14 + 4..0x14 + 8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Image::parse(&file),
            Err(ImageError::SectionOutOfFile { index: 0 })
        ));
    }

    #[test]
    fn rejects_oversized_section_table() {
        let mut file = ImageBuilder::new(0).build();
        file[0x10..0x14].copy_from_slice(&5u32.to_le_bytes());
        assert!(matches!(
            Image::parse(&file),
            Err(ImageError::TooManySections { count: 5 })
        ));
    }
}
