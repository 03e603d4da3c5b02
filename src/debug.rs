//! Debug directory parsing.
//!
//! Each 28-byte IMAGE_DEBUG_DIRECTORY entry carries a file pointer to its
//! payload; a prefix of the payload is captured raw, and CODEVIEW entries
//! additionally yield the PDB path at a signature-dependent offset.

use crate::view::ImageView;
use crate::{Error, Result, MAX_PATH};

/// Debug types (IMAGE_DEBUG_TYPE_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DebugType {
    Unknown = 0,
    Coff = 1,
    CodeView = 2,
    Fpo = 3,
    Misc = 4,
    Exception = 5,
    Fixup = 6,
    OmapToSrc = 7,
    OmapFromSrc = 8,
    Borland = 9,
    Reserved10 = 10,
    Clsid = 11,
    VcFeature = 12,
    Pogo = 13,
    Iltcg = 14,
    Mpx = 15,
    Repro = 16,
    ExDllCharacteristics = 20,
}

impl DebugType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Coff,
            2 => Self::CodeView,
            3 => Self::Fpo,
            4 => Self::Misc,
            5 => Self::Exception,
            6 => Self::Fixup,
            7 => Self::OmapToSrc,
            8 => Self::OmapFromSrc,
            9 => Self::Borland,
            10 => Self::Reserved10,
            11 => Self::Clsid,
            12 => Self::VcFeature,
            13 => Self::Pogo,
            14 => Self::Iltcg,
            15 => Self::Mpx,
            16 => Self::Repro,
            20 => Self::ExDllCharacteristics,
            _ => Self::Unknown,
        }
    }
}

/// CodeView PDB 7.0 signature ("RSDS"); PDB path at raw offset 24.
pub const CV_SIGNATURE_RSDS: u32 = 0x53445352;

/// CodeView PDB 2.0 signature ("NB10"); PDB path at raw offset 16.
pub const CV_SIGNATURE_NB10: u32 = 0x3031424E;

/// Bytes of payload captured per entry.
pub const DEBUG_RAW_PREFIX: usize = 24;

/// IMAGE_DEBUG_DIRECTORY - 28 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugDirectory {
    /// Reserved (must be zero).
    pub characteristics: u32,
    /// Time/date stamp.
    pub time_date_stamp: u32,
    /// Major version.
    pub major_version: u16,
    /// Minor version.
    pub minor_version: u16,
    /// Debug type.
    pub debug_type: u32,
    /// Size of debug data.
    pub size_of_data: u32,
    /// RVA of debug data (when loaded).
    pub address_of_raw_data: u32,
    /// File offset of debug data.
    pub pointer_to_raw_data: u32,
}

impl DebugDirectory {
    pub const SIZE: usize = 28;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            characteristics: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            time_date_stamp: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            major_version: u16::from_le_bytes([data[8], data[9]]),
            minor_version: u16::from_le_bytes([data[10], data[11]]),
            debug_type: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            size_of_data: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            address_of_raw_data: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
            pointer_to_raw_data: u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
        })
    }

    /// Get the debug type as an enum.
    pub fn get_type(&self) -> DebugType {
        DebugType::from_u32(self.debug_type)
    }
}

/// One debug directory entry with its captured payload.
#[derive(Debug, Clone)]
pub struct DebugEntry {
    /// The raw directory record.
    pub directory: DebugDirectory,
    /// Up to 24 raw bytes from the payload's file pointer.
    pub raw: Vec<u8>,
    /// Null-terminated PDB path, for CODEVIEW RSDS/NB10 payloads.
    pub pdb_path: Option<String>,
}

/// The debug directory: all entries.
#[derive(Debug, Clone, Default)]
pub struct DebugTable {
    pub entries: Vec<DebugEntry>,
}

impl DebugTable {
    /// Parse `size / 28` entries at file offset `dir_offset`.
    ///
    /// The caller resolves the directory RVA (preferring the `.debug`
    /// section when its virtual address matches); payload reads go straight
    /// through the raw view because `pointer_to_raw_data` is a file offset.
    pub fn parse(view: &ImageView<'_>, dir_offset: u64, dir_size: u32) -> Option<DebugTable> {
        let count = dir_size as usize / DebugDirectory::SIZE;
        if count == 0 {
            return None;
        }

        let mut entries = Vec::new();
        for index in 0..count {
            let offset = dir_offset + (index * DebugDirectory::SIZE) as u64;
            let Some(directory) = view
                .bytes(offset, DebugDirectory::SIZE)
                .and_then(|data| DebugDirectory::parse(data).ok())
            else {
                break;
            };

            let raw_offset = directory.pointer_to_raw_data as u64;
            let raw = match view.bytes_to_end(raw_offset) {
                Some(tail) => tail[..tail.len().min(DEBUG_RAW_PREFIX)].to_vec(),
                None => Vec::new(),
            };

            let pdb_path = if directory.get_type() == DebugType::CodeView {
                pdb_path_for(view, raw_offset, &raw)
            } else {
                None
            };

            entries.push(DebugEntry {
                directory,
                raw,
                pdb_path,
            });
        }

        if entries.is_empty() {
            return None;
        }
        Some(DebugTable { entries })
    }
}

fn pdb_path_for(view: &ImageView<'_>, raw_offset: u64, raw: &[u8]) -> Option<String> {
    if raw.len() < 4 {
        return None;
    }
    let signature = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let path_offset = match signature {
        CV_SIGNATURE_RSDS => 24,
        CV_SIGNATURE_NB10 => 16,
        _ => return None,
    };
    view.read_cstr(raw_offset + path_offset, MAX_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory_bytes(debug_type: u32, pointer_to_raw: u32) -> Vec<u8> {
        let mut data = vec![0u8; 28];
        data[12..16].copy_from_slice(&debug_type.to_le_bytes());
        data[24..28].copy_from_slice(&pointer_to_raw.to_le_bytes());
        data
    }

    #[test]
    fn test_debug_directory_size() {
        assert_eq!(DebugDirectory::SIZE, 28);
    }

    #[test]
    fn test_rsds_pdb_path() {
        let mut file = vec![0u8; 0x200];
        // Directory at 0x40, payload at 0x100.
        file.splice(0x40..0x40 + 28, directory_bytes(2, 0x100));
        file[0x100..0x104].copy_from_slice(&CV_SIGNATURE_RSDS.to_le_bytes());
        // GUID + age occupy [0x104, 0x118); path at 0x100 + 24.
        file[0x118..0x128].copy_from_slice(b"C:\\out\\app.pdb\0\0");

        let view = ImageView::new(&file);
        let table = DebugTable::parse(&view, 0x40, 28).unwrap();
        assert_eq!(table.entries.len(), 1);
        let entry = &table.entries[0];
        assert_eq!(entry.directory.get_type(), DebugType::CodeView);
        assert_eq!(entry.raw.len(), DEBUG_RAW_PREFIX);
        assert_eq!(entry.pdb_path.as_deref(), Some("C:\\out\\app.pdb"));
    }

    #[test]
    fn test_nb10_pdb_path() {
        let mut file = vec![0u8; 0x200];
        file.splice(0x40..0x40 + 28, directory_bytes(2, 0x100));
        file[0x100..0x104].copy_from_slice(&CV_SIGNATURE_NB10.to_le_bytes());
        // Offset + signature + age occupy [0x104, 0x110); path at 0x100 + 16.
        file[0x110..0x119].copy_from_slice(b"app.pdb\0\0");

        let view = ImageView::new(&file);
        let table = DebugTable::parse(&view, 0x40, 28).unwrap();
        assert_eq!(table.entries[0].pdb_path.as_deref(), Some("app.pdb"));
    }

    #[test]
    fn test_non_codeview_has_no_path() {
        let mut file = vec![0u8; 0x200];
        file.splice(0x40..0x40 + 28, directory_bytes(13, 0x100)); // POGO
        let view = ImageView::new(&file);
        let table = DebugTable::parse(&view, 0x40, 28).unwrap();
        assert_eq!(table.entries[0].directory.get_type(), DebugType::Pogo);
        assert!(table.entries[0].pdb_path.is_none());
    }

    #[test]
    fn test_unknown_codeview_signature() {
        let mut file = vec![0u8; 0x200];
        file.splice(0x40..0x40 + 28, directory_bytes(2, 0x100));
        file[0x100..0x104].copy_from_slice(b"XXXX");
        let view = ImageView::new(&file);
        let table = DebugTable::parse(&view, 0x40, 28).unwrap();
        assert!(table.entries[0].pdb_path.is_none());
    }

    #[test]
    fn test_payload_out_of_bounds() {
        let mut file = vec![0u8; 0x60];
        file.splice(0x40..0x40 + 28, directory_bytes(2, 0x4000));
        let view = ImageView::new(&file);
        let table = DebugTable::parse(&view, 0x40, 28).unwrap();
        assert!(table.entries[0].raw.is_empty());
        assert!(table.entries[0].pdb_path.is_none());
    }

    #[test]
    fn test_truncated_directory_absent() {
        let view = ImageView::new(&[0u8; 16]);
        assert!(DebugTable::parse(&view, 0, 28).is_none());
        assert!(DebugTable::parse(&view, 0, 0).is_none());
    }
}
