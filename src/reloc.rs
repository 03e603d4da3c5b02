//! Base relocation table parsing.
//!
//! Relocations come in per-page blocks: an 8-byte header followed by 16-bit
//! entries whose high 4 bits are the type and low 12 bits the offset within
//! the page. A HIGHADJ entry consumes the following 16-bit slot as its
//! adjustment datum.

/// Relocation types (IMAGE_REL_BASED_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelocationType {
    /// No relocation (padding).
    Absolute = 0,
    /// High 16 bits of a 32-bit address.
    High = 1,
    /// Low 16 bits of a 32-bit address.
    Low = 2,
    /// Full 32-bit address (HIGHLOW).
    HighLow = 3,
    /// High 16 bits adjusted for sign extension; takes an extra slot.
    HighAdj = 4,
    /// Machine-specific (type 5): MIPS JMPADDR, ARM MOV32, RISC-V HIGH20.
    MachineSpecific5 = 5,
    /// Reserved.
    Section = 6,
    /// Machine-specific (type 7): REL32, THUMB MOV32, RISC-V LOW12I.
    MachineSpecific7 = 7,
    /// RISC-V low 12 bits S-type.
    RiscvLow12S = 8,
    /// MIPS 16-bit jump address.
    MipsJmpAddr16 = 9,
    /// 64-bit address (DIR64).
    Dir64 = 10,
}

impl RelocationType {
    /// Parse from the type bits (high 4 bits of entry).
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::High,
            2 => Self::Low,
            3 => Self::HighLow,
            4 => Self::HighAdj,
            5 => Self::MachineSpecific5,
            6 => Self::Section,
            7 => Self::MachineSpecific7,
            8 => Self::RiscvLow12S,
            9 => Self::MipsJmpAddr16,
            10 => Self::Dir64,
            _ => Self::Absolute,
        }
    }
}

/// A single relocation entry within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    /// Relocation type (high 4 bits).
    pub reloc_type: RelocationType,
    /// Offset from the block's page RVA (low 12 bits).
    pub offset: u16,
    /// The extra 16-bit datum a HIGHADJ entry consumes.
    pub adjustment: Option<u16>,
}

impl RelocationEntry {
    /// Split a raw 16-bit slot into type and offset.
    pub fn from_u16(value: u16) -> Self {
        Self {
            reloc_type: RelocationType::from_u8((value >> 12) as u8),
            offset: value & 0x0FFF,
            adjustment: None,
        }
    }

    /// Check if this is a padding entry.
    pub fn is_padding(&self) -> bool {
        matches!(self.reloc_type, RelocationType::Absolute)
    }
}

/// IMAGE_BASE_RELOCATION block: relocations for one 4KB page.
#[derive(Debug, Clone, Default)]
pub struct RelocationBlock {
    /// Page RVA (base address for this block's relocations).
    pub page_rva: u32,
    /// Total size of this block including the header.
    pub size_of_block: u32,
    /// Decoded entries.
    pub entries: Vec<RelocationEntry>,
}

impl RelocationBlock {
    pub const HEADER_SIZE: usize = 8;

    /// The RVA a specific entry patches.
    pub fn rva_for_entry(&self, entry: &RelocationEntry) -> u32 {
        self.page_rva.wrapping_add(entry.offset as u32)
    }
}

/// The complete base relocation table.
#[derive(Debug, Clone, Default)]
pub struct RelocationTable {
    pub blocks: Vec<RelocationBlock>,
}

impl RelocationTable {
    /// Walk relocation blocks at the directory RVA.
    ///
    /// Stops at a zero `VirtualAddress` or `SizeOfBlock`, at the directory
    /// end, or when a block header claims fewer than 8 bytes (the block is
    /// still emitted, with no entries).
    pub fn parse<F>(reloc_rva: u32, reloc_size: u32, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        let mut blocks = Vec::new();
        let mut offset = 0u64;

        while offset + RelocationBlock::HEADER_SIZE as u64 <= reloc_size as u64 {
            let block_rva = (reloc_rva as u64)
                .checked_add(offset)
                .and_then(|v| u32::try_from(v).ok())?;
            let Some(header) =
                read_at_rva(block_rva, RelocationBlock::HEADER_SIZE).filter(|d| d.len() == 8)
            else {
                break;
            };
            let page_rva = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let size_of_block = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if page_rva == 0 || size_of_block == 0 {
                break;
            }
            if (size_of_block as usize) < RelocationBlock::HEADER_SIZE {
                blocks.push(RelocationBlock {
                    page_rva,
                    size_of_block,
                    entries: Vec::new(),
                });
                break;
            }

            let body_len = size_of_block as usize - RelocationBlock::HEADER_SIZE;
            let body = read_at_rva(block_rva.checked_add(8)?, body_len).unwrap_or_default();
            let entries = decode_entries(&body);

            blocks.push(RelocationBlock {
                page_rva,
                size_of_block,
                entries,
            });

            offset = offset.checked_add(size_of_block as u64)?;
        }

        Some(Self { blocks })
    }
}

/// Decode 16-bit slots; HIGHADJ takes the next slot as its adjustment.
fn decode_entries(body: &[u8]) -> Vec<RelocationEntry> {
    let mut entries = Vec::with_capacity(body.len() / 2);
    let mut slots = body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]));

    while let Some(value) = slots.next() {
        let mut entry = RelocationEntry::from_u16(value);
        if entry.reloc_type == RelocationType::HighAdj {
            entry.adjustment = slots.next();
        }
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_bytes(page_rva: u32, entries: &[u16]) -> Vec<u8> {
        let size = 8 + entries.len() * 2;
        let mut data = Vec::with_capacity(size);
        data.extend_from_slice(&page_rva.to_le_bytes());
        data.extend_from_slice(&(size as u32).to_le_bytes());
        for &entry in entries {
            data.extend_from_slice(&entry.to_le_bytes());
        }
        data
    }

    fn reader(blob: &[u8], base: u32) -> impl Fn(u32, usize) -> Option<Vec<u8>> + '_ {
        move |rva, len| {
            let start = (rva as u64).checked_sub(base as u64)? as usize;
            if start >= blob.len() {
                return None;
            }
            let avail = blob.len() - start;
            Some(blob[start..start + len.min(avail)].to_vec())
        }
    }

    #[test]
    fn test_entry_split() {
        let entry = RelocationEntry::from_u16(0x3A21);
        assert_eq!(entry.reloc_type, RelocationType::HighLow);
        assert_eq!(entry.offset, 0xA21);
        assert!(entry.adjustment.is_none());
        assert!(RelocationEntry::from_u16(0x0004).is_padding());
    }

    #[test]
    fn test_two_blocks() {
        let mut blob = block_bytes(0x1000, &[0x3010, 0x3014]);
        blob.extend_from_slice(&block_bytes(0x2000, &[0xA020]));

        let table = RelocationTable::parse(0x8000, blob.len() as u32, reader(&blob, 0x8000))
            .unwrap();
        assert_eq!(table.blocks.len(), 2);
        assert_eq!(table.blocks[0].entries.len(), 2);
        assert_eq!(table.blocks[0].rva_for_entry(&table.blocks[0].entries[1]), 0x1014);
        assert_eq!(table.blocks[1].entries[0].reloc_type, RelocationType::Dir64);
    }

    #[test]
    fn test_highadj_consumes_extra_slot() {
        let blob = block_bytes(0x1000, &[0x4010, 0x0123, 0x3020]);
        let table = RelocationTable::parse(0x8000, blob.len() as u32, reader(&blob, 0x8000))
            .unwrap();
        let entries = &table.blocks[0].entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reloc_type, RelocationType::HighAdj);
        assert_eq!(entries[0].adjustment, Some(0x0123));
        assert_eq!(entries[1].reloc_type, RelocationType::HighLow);
    }

    #[test]
    fn test_zero_page_rva_terminates() {
        let mut blob = block_bytes(0x1000, &[0x3010]);
        blob.extend_from_slice(&[0u8; 8]);
        blob.extend_from_slice(&block_bytes(0x3000, &[0x3000]));

        let table = RelocationTable::parse(0x8000, blob.len() as u32, reader(&blob, 0x8000))
            .unwrap();
        assert_eq!(table.blocks.len(), 1);
    }

    #[test]
    fn test_undersized_block_emitted_empty_and_halts() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&0x1000u32.to_le_bytes());
        blob.extend_from_slice(&4u32.to_le_bytes()); // SizeOfBlock < 8
        blob.extend_from_slice(&block_bytes(0x2000, &[0x3000]));

        let table = RelocationTable::parse(0x8000, blob.len() as u32, reader(&blob, 0x8000))
            .unwrap();
        assert_eq!(table.blocks.len(), 1);
        assert!(table.blocks[0].entries.is_empty());
        assert_eq!(table.blocks[0].size_of_block, 4);
    }
}
