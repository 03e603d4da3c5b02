//! DOS Header structures and parsing.

use crate::{Error, Result};

/// DOS "MZ" signature.
pub const DOS_SIGNATURE: u16 = 0x5A4D; // "MZ"

/// DOS Header (IMAGE_DOS_HEADER).
///
/// The first structure in a PE file, located at offset 0. `e_lfanew` points
/// at the NT header; everything else is legacy DOS loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DosHeader {
    /// Magic number ("MZ" = 0x5A4D).
    pub e_magic: u16,
    /// Bytes on last page of file.
    pub e_cblp: u16,
    /// Pages in file.
    pub e_cp: u16,
    /// Relocations.
    pub e_crlc: u16,
    /// Size of header in paragraphs.
    pub e_cparhdr: u16,
    /// Minimum extra paragraphs needed.
    pub e_minalloc: u16,
    /// Maximum extra paragraphs needed.
    pub e_maxalloc: u16,
    /// Initial (relative) SS value.
    pub e_ss: u16,
    /// Initial SP value.
    pub e_sp: u16,
    /// Checksum.
    pub e_csum: u16,
    /// Initial IP value.
    pub e_ip: u16,
    /// Initial (relative) CS value.
    pub e_cs: u16,
    /// File address of relocation table.
    pub e_lfarlc: u16,
    /// Overlay number.
    pub e_ovno: u16,
    /// Reserved words.
    pub e_res: [u16; 4],
    /// OEM identifier.
    pub e_oemid: u16,
    /// OEM information.
    pub e_oeminfo: u16,
    /// Reserved words.
    pub e_res2: [u16; 10],
    /// File address of new exe header (PE header offset).
    pub e_lfanew: i32,
}

impl DosHeader {
    /// Size of the DOS header in bytes.
    pub const SIZE: usize = 64;

    /// Parse a DOS header from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let e_magic = u16::from_le_bytes([data[0], data[1]]);
        if e_magic != DOS_SIGNATURE {
            return Err(Error::DosSignature);
        }

        Ok(Self {
            e_magic,
            e_cblp: u16::from_le_bytes([data[2], data[3]]),
            e_cp: u16::from_le_bytes([data[4], data[5]]),
            e_crlc: u16::from_le_bytes([data[6], data[7]]),
            e_cparhdr: u16::from_le_bytes([data[8], data[9]]),
            e_minalloc: u16::from_le_bytes([data[10], data[11]]),
            e_maxalloc: u16::from_le_bytes([data[12], data[13]]),
            e_ss: u16::from_le_bytes([data[14], data[15]]),
            e_sp: u16::from_le_bytes([data[16], data[17]]),
            e_csum: u16::from_le_bytes([data[18], data[19]]),
            e_ip: u16::from_le_bytes([data[20], data[21]]),
            e_cs: u16::from_le_bytes([data[22], data[23]]),
            e_lfarlc: u16::from_le_bytes([data[24], data[25]]),
            e_ovno: u16::from_le_bytes([data[26], data[27]]),
            e_res: [
                u16::from_le_bytes([data[28], data[29]]),
                u16::from_le_bytes([data[30], data[31]]),
                u16::from_le_bytes([data[32], data[33]]),
                u16::from_le_bytes([data[34], data[35]]),
            ],
            e_oemid: u16::from_le_bytes([data[36], data[37]]),
            e_oeminfo: u16::from_le_bytes([data[38], data[39]]),
            e_res2: [
                u16::from_le_bytes([data[40], data[41]]),
                u16::from_le_bytes([data[42], data[43]]),
                u16::from_le_bytes([data[44], data[45]]),
                u16::from_le_bytes([data[46], data[47]]),
                u16::from_le_bytes([data[48], data[49]]),
                u16::from_le_bytes([data[50], data[51]]),
                u16::from_le_bytes([data[52], data[53]]),
                u16::from_le_bytes([data[54], data[55]]),
                u16::from_le_bytes([data[56], data[57]]),
                u16::from_le_bytes([data[58], data[59]]),
            ],
            e_lfanew: i32::from_le_bytes([data[60], data[61], data[62], data[63]]),
        })
    }

    /// `e_lfanew` as a file offset, or `None` when negative.
    pub fn nt_header_offset(&self) -> Option<u64> {
        u64::try_from(self.e_lfanew).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dos_header_size() {
        assert_eq!(DosHeader::SIZE, 64);
    }

    #[test]
    fn test_dos_header_parse_too_small() {
        let data = [0u8; 32];
        let result = DosHeader::parse(&data);
        assert!(matches!(result, Err(Error::BufferTooSmall { .. })));
    }

    #[test]
    fn test_dos_header_invalid_signature() {
        let data = [0u8; 64];
        let result = DosHeader::parse(&data);
        assert!(matches!(result, Err(Error::DosSignature)));
    }

    #[test]
    fn test_dos_header_fields() {
        let mut data = [0u8; 64];
        data[0] = 0x4D; // 'M'
        data[1] = 0x5A; // 'Z'
        data[60..64].copy_from_slice(&0x80i32.to_le_bytes());

        let header = DosHeader::parse(&data).unwrap();
        assert_eq!(header.e_magic, DOS_SIGNATURE);
        assert_eq!(header.e_lfanew, 0x80);
        assert_eq!(header.nt_header_offset(), Some(0x80));
    }

    #[test]
    fn test_negative_lfanew() {
        let mut data = [0u8; 64];
        data[0] = 0x4D;
        data[1] = 0x5A;
        data[60..64].copy_from_slice(&(-4i32).to_le_bytes());

        let header = DosHeader::parse(&data).unwrap();
        assert_eq!(header.nt_header_offset(), None);
    }
}
