//! Export table parsing.
//!
//! The export directory carries three parallel arrays: function RVAs, name
//! RVAs, and name ordinals. A function RVA that falls inside the export
//! directory's own extent is a forwarder string, not code; the discriminator
//! is positional, not flagged.

use crate::{Error, Result, MAX_PATH};

/// IMAGE_EXPORT_DIRECTORY - 40 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportDirectory {
    /// Export flags (reserved, must be 0).
    pub characteristics: u32,
    /// Time/date stamp.
    pub time_date_stamp: u32,
    /// Major version.
    pub major_version: u16,
    /// Minor version.
    pub minor_version: u16,
    /// RVA to the DLL name.
    pub name_rva: u32,
    /// Starting ordinal number.
    pub base: u32,
    /// Number of entries in the Export Address Table.
    pub number_of_functions: u32,
    /// Number of entries in the Name Pointer Table.
    pub number_of_names: u32,
    /// RVA to the Export Address Table.
    pub address_of_functions: u32,
    /// RVA to the Export Name Pointer Table.
    pub address_of_names: u32,
    /// RVA to the Export Ordinal Table.
    pub address_of_name_ordinals: u32,
}

impl ExportDirectory {
    pub const SIZE: usize = 40;

    /// Parse from bytes.
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
            name_rva: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            base: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            number_of_functions: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
            number_of_names: u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
            address_of_functions: u32::from_le_bytes([data[28], data[29], data[30], data[31]]),
            address_of_names: u32::from_le_bytes([data[32], data[33], data[34], data[35]]),
            address_of_name_ordinals: u32::from_le_bytes([data[36], data[37], data[38], data[39]]),
        })
    }
}

/// A single exported function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFunction {
    /// Index into the Export Address Table.
    pub ordinal: u32,
    /// Raw value from the Export Address Table.
    pub rva: u32,
    /// RVA of the function name, zero when exported by ordinal only.
    pub name_rva: u32,
    /// Function name, when exported by name and resolvable.
    pub name: Option<String>,
    /// Forwarder target ("OTHER.dll.Func") when the RVA points back into
    /// the export directory.
    pub forwarder: Option<String>,
}

/// The complete export table.
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    /// Export directory header.
    pub directory: ExportDirectory,
    /// Exporting module name.
    pub dll_name: String,
    /// Exported functions, empty EAT slots skipped.
    pub functions: Vec<ExportedFunction>,
}

impl ExportTable {
    /// Parse the export table.
    ///
    /// `export_rva` / `export_size` come from the data directory; the size
    /// bounds forwarder detection. `read_at_rva` reads up to the requested
    /// number of bytes at an RVA, clamped to the mapped extent, and returns
    /// `None` for an unmapped address.
    pub fn parse<F>(export_rva: u32, export_size: u32, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        let directory =
            ExportDirectory::parse(&read_at_rva(export_rva, ExportDirectory::SIZE)?).ok()?;

        let dll_name = read_string(&read_at_rva, directory.name_rva).unwrap_or_default();

        let export_start = export_rva as u64;
        let export_end = export_start + export_size as u64;

        // The parallel name tables, read up front so the per-function ordinal
        // search does not re-read them. Claimed counts are untrusted; reads
        // stop at the first slot past the mapped extent.
        let ordinals = read_u16_array(
            &read_at_rva,
            directory.address_of_name_ordinals,
            directory.number_of_names,
        );
        let name_rvas = read_u32_array(
            &read_at_rva,
            directory.address_of_names,
            directory.number_of_names,
        );

        let mut functions = Vec::new();
        for i in 0..directory.number_of_functions {
            let slot_rva = directory.address_of_functions.checked_add(i.checked_mul(4)?)?;
            let Some(slot) = read_at_rva(slot_rva, 4).filter(|s| s.len() == 4) else {
                break;
            };
            let func_rva = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            if func_rva == 0 {
                continue;
            }

            let forwarder = if (func_rva as u64) >= export_start && (func_rva as u64) < export_end
            {
                read_string(&read_at_rva, func_rva)
            } else {
                None
            };

            let (name_rva, name) = match ordinals.iter().position(|&ord| ord as u32 == i) {
                Some(k) => {
                    let name_rva = name_rvas.get(k).copied().unwrap_or(0);
                    (name_rva, read_string(&read_at_rva, name_rva))
                }
                None => (0, None),
            };

            functions.push(ExportedFunction {
                ordinal: i,
                rva: func_rva,
                name_rva,
                name,
                forwarder,
            });
        }

        Some(Self {
            directory,
            dll_name,
            functions,
        })
    }

    /// Find an export by name.
    pub fn by_name(&self, name: &str) -> Option<&ExportedFunction> {
        self.functions.iter().find(|f| f.name.as_deref() == Some(name))
    }
}

fn read_string<F>(read_at_rva: &F, rva: u32) -> Option<String>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    if rva == 0 {
        return None;
    }
    let data = read_at_rva(rva, MAX_PATH)?;
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    Some(String::from_utf8_lossy(&data[..end]).into_owned())
}

fn read_u16_array<F>(read_at_rva: &F, rva: u32, count: u32) -> Vec<u16>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let mut values = Vec::new();
    for i in 0..count as u64 {
        let Some(slot_rva) = (rva as u64).checked_add(i * 2).and_then(|v| u32::try_from(v).ok())
        else {
            break;
        };
        let Some(data) = read_at_rva(slot_rva, 2).filter(|d| d.len() == 2) else {
            break;
        };
        values.push(u16::from_le_bytes([data[0], data[1]]));
    }
    values
}

fn read_u32_array<F>(read_at_rva: &F, rva: u32, count: u32) -> Vec<u32>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let mut values = Vec::new();
    for i in 0..count as u64 {
        let Some(slot_rva) = (rva as u64).checked_add(i * 4).and_then(|v| u32::try_from(v).ok())
        else {
            break;
        };
        let Some(data) = read_at_rva(slot_rva, 4).filter(|d| d.len() == 4) else {
            break;
        };
        values.push(u32::from_le_bytes([data[0], data[1], data[2], data[3]]));
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Sparse RVA space backed by a map of (rva -> bytes).
    struct RvaSpace {
        regions: HashMap<u32, Vec<u8>>,
    }

    impl RvaSpace {
        fn new() -> Self {
            Self {
                regions: HashMap::new(),
            }
        }

        fn put(&mut self, rva: u32, bytes: Vec<u8>) {
            self.regions.insert(rva, bytes);
        }

        fn reader(&self) -> impl Fn(u32, usize) -> Option<Vec<u8>> + '_ {
            move |rva, len| {
                for (&base, bytes) in &self.regions {
                    let end = base as u64 + bytes.len() as u64;
                    if (rva as u64) >= base as u64 && (rva as u64) < end {
                        let start = (rva - base) as usize;
                        let avail = bytes.len() - start;
                        return Some(bytes[start..start + len.min(avail)].to_vec());
                    }
                }
                None
            }
        }
    }

    fn directory_bytes(dir: &ExportDirectory) -> Vec<u8> {
        let mut data = vec![0u8; 40];
        data[12..16].copy_from_slice(&dir.name_rva.to_le_bytes());
        data[16..20].copy_from_slice(&dir.base.to_le_bytes());
        data[20..24].copy_from_slice(&dir.number_of_functions.to_le_bytes());
        data[24..28].copy_from_slice(&dir.number_of_names.to_le_bytes());
        data[28..32].copy_from_slice(&dir.address_of_functions.to_le_bytes());
        data[32..36].copy_from_slice(&dir.address_of_names.to_le_bytes());
        data[36..40].copy_from_slice(&dir.address_of_name_ordinals.to_le_bytes());
        data
    }

    #[test]
    fn test_export_directory_size() {
        assert_eq!(ExportDirectory::SIZE, 40);
    }

    #[test]
    fn test_parse_named_and_unnamed_exports() {
        let mut space = RvaSpace::new();
        let dir = ExportDirectory {
            name_rva: 0x3000,
            base: 1,
            number_of_functions: 3,
            number_of_names: 1,
            address_of_functions: 0x2000,
            address_of_names: 0x2100,
            address_of_name_ordinals: 0x2200,
            ..Default::default()
        };
        space.put(0x1000, directory_bytes(&dir));
        // EAT: slot 0 empty, slot 1 = code, slot 2 = code.
        let mut eat = Vec::new();
        for rva in [0u32, 0x4010, 0x4020] {
            eat.extend_from_slice(&rva.to_le_bytes());
        }
        space.put(0x2000, eat);
        space.put(0x2100, 0x3010u32.to_le_bytes().to_vec());
        space.put(0x2200, 1u16.to_le_bytes().to_vec());
        space.put(0x3000, b"testlib.dll\0".to_vec());
        space.put(0x3010, b"DoWork\0".to_vec());

        let table = ExportTable::parse(0x1000, 0x100, space.reader()).unwrap();
        assert_eq!(table.dll_name, "testlib.dll");
        assert_eq!(table.functions.len(), 2);

        let named = &table.functions[0];
        assert_eq!(named.ordinal, 1);
        assert_eq!(named.rva, 0x4010);
        assert_eq!(named.name.as_deref(), Some("DoWork"));
        assert!(named.forwarder.is_none());

        let unnamed = &table.functions[1];
        assert_eq!(unnamed.ordinal, 2);
        assert!(unnamed.name.is_none());
    }

    #[test]
    fn test_forwarder_detected_by_position() {
        let mut space = RvaSpace::new();
        let dir = ExportDirectory {
            number_of_functions: 1,
            address_of_functions: 0x1040,
            ..Default::default()
        };
        space.put(0x1000, directory_bytes(&dir));
        // The EAT slot points inside [0x1000, 0x1100): a forwarder string.
        space.put(0x1040, 0x1050u32.to_le_bytes().to_vec());
        space.put(0x1050, b"NTDLL.RtlAllocateHeap\0".to_vec());

        let table = ExportTable::parse(0x1000, 0x100, space.reader()).unwrap();
        assert_eq!(table.functions.len(), 1);
        assert_eq!(
            table.functions[0].forwarder.as_deref(),
            Some("NTDLL.RtlAllocateHeap")
        );
    }

    #[test]
    fn test_directory_unreadable() {
        let space = RvaSpace::new();
        assert!(ExportTable::parse(0x1000, 0x100, space.reader()).is_none());
    }

    #[test]
    fn test_truncated_eat_stops_cleanly() {
        let mut space = RvaSpace::new();
        let dir = ExportDirectory {
            number_of_functions: 1000,
            address_of_functions: 0x2000,
            ..Default::default()
        };
        space.put(0x1000, directory_bytes(&dir));
        // Only two readable slots despite the claimed thousand.
        let mut eat = Vec::new();
        for rva in [0x4000u32, 0x4004] {
            eat.extend_from_slice(&rva.to_le_bytes());
        }
        space.put(0x2000, eat);

        let table = ExportTable::parse(0x1000, 0x100, space.reader()).unwrap();
        assert_eq!(table.functions.len(), 2);
    }
}
