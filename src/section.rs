//! Section Header structures, RVA containment, and name resolution.

use std::borrow::Cow;

use bitflags::bitflags;

use crate::view::ImageView;
use crate::{Error, Result, MAX_PATH};

bitflags! {
    /// Section characteristics flags (IMAGE_SCN_*).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const CODE = 0x0000_0020;
        const INITIALIZED_DATA = 0x0000_0040;
        const UNINITIALIZED_DATA = 0x0000_0080;
        const LINK_INFO = 0x0000_0200;
        const LINK_REMOVE = 0x0000_0800;
        const LINK_COMDAT = 0x0000_1000;
        const GPREL = 0x0000_8000;
        const NRELOC_OVFL = 0x0100_0000;
        const DISCARDABLE = 0x0200_0000;
        const NOT_CACHED = 0x0400_0000;
        const NOT_PAGED = 0x0800_0000;
        const SHARED = 0x1000_0000;
        const EXECUTE = 0x2000_0000;
        const READ = 0x4000_0000;
        const WRITE = 0x8000_0000;
    }
}

/// IMAGE_SECTION_HEADER - 40 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    pub const SIZE: usize = 40;

    /// Parse a section header from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let mut name = [0u8; 8];
        name.copy_from_slice(&data[0..8]);

        Ok(Self {
            name,
            virtual_size: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            virtual_address: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            size_of_raw_data: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            pointer_to_raw_data: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
            pointer_to_relocations: u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
            pointer_to_linenumbers: u32::from_le_bytes([data[28], data[29], data[30], data[31]]),
            number_of_relocations: u16::from_le_bytes([data[32], data[33]]),
            number_of_linenumbers: u16::from_le_bytes([data[34], data[35]]),
            characteristics: u32::from_le_bytes([data[36], data[37], data[38], data[39]]),
        })
    }

    /// The in-header name, trimmed of null padding, lossy on non-UTF-8.
    #[must_use]
    pub fn name_str(&self) -> Cow<'_, str> {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end])
    }

    /// Typed view over the characteristics mask.
    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_retain(self.characteristics)
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(SectionFlags::EXECUTE)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(SectionFlags::WRITE)
    }

    /// Check if this RVA falls within the section's virtual extent.
    pub fn contains_rva(&self, rva: u32) -> bool {
        let start = self.virtual_address as u64;
        let end = start + self.virtual_size as u64;
        (rva as u64) >= start && (rva as u64) < end
    }

    /// Translate an RVA within this section to a file offset.
    pub fn rva_to_offset(&self, rva: u32) -> Option<u64> {
        if !self.contains_rva(rva) {
            return None;
        }
        Some(self.pointer_to_raw_data as u64 + (rva - self.virtual_address) as u64)
    }

    /// Resolve the section name, following the COFF string table for names
    /// of the form `/decimal`.
    ///
    /// `string_table` is the file offset of the string table, i.e.
    /// `PointerToSymbolTable + 18 * NumberOfSymbols`. Returns `None` when a
    /// `/` name has malformed digits or the referenced string is out of
    /// bounds; callers skip such entries.
    pub fn resolved_name(&self, view: &ImageView<'_>, string_table: u64) -> Option<String> {
        if self.name[0] != b'/' {
            return Some(self.name_str().into_owned());
        }
        let digits = &self.name[1..];
        let end = digits.iter().position(|&b| b == 0).unwrap_or(digits.len());
        let offset: u64 = std::str::from_utf8(&digits[..end]).ok()?.parse().ok()?;
        view.read_cstr(string_table.checked_add(offset)?, MAX_PATH)
    }
}
