//! Delay-load import directory parsing.
//!
//! Delay-load descriptors reference four parallel thunk tables: the import
//! name table drives the walk, and the IAT, bound IAT, and unload info
//! tables are sampled at the same index when present.

use crate::import::ImportThunk;
use crate::{Error, Result, MAX_PATH};

/// IMAGE_DELAYLOAD_DESCRIPTOR - 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct DelayLoadDescriptor {
    /// Attributes (bit 0: offsets are RVAs).
    pub attributes: u32,
    /// RVA of the DLL name; zero terminates the descriptor array.
    pub dll_name_rva: u32,
    /// RVA of the module handle.
    pub module_handle_rva: u32,
    /// RVA of the delay-load import address table.
    pub import_address_table_rva: u32,
    /// RVA of the delay-load import name table.
    pub import_name_table_rva: u32,
    /// RVA of the bound delay-load import address table.
    pub bound_import_address_table_rva: u32,
    /// RVA of the unload information table.
    pub unload_information_table_rva: u32,
    /// Timestamp of the bound DLL (0 if not bound).
    pub time_date_stamp: u32,
}

impl DelayLoadDescriptor {
    pub const SIZE: usize = 32;

    /// Parse from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        let read_u32 = |offset: usize| {
            u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
        };

        Ok(Self {
            attributes: read_u32(0),
            dll_name_rva: read_u32(4),
            module_handle_rva: read_u32(8),
            import_address_table_rva: read_u32(12),
            import_name_table_rva: read_u32(16),
            bound_import_address_table_rva: read_u32(20),
            unload_information_table_rva: read_u32(24),
            time_date_stamp: read_u32(28),
        })
    }
}

/// One delay-loaded function, with the parallel table slots sampled.
#[derive(Debug, Clone)]
pub struct DelayImportFunction {
    /// Ordinal or (hint, name), decoded from the name table slot.
    pub thunk: ImportThunk,
    /// IAT slot value, when the table is present and readable.
    pub iat_value: Option<u64>,
    /// Bound IAT slot value, when present and readable.
    pub bound_iat_value: Option<u64>,
    /// Unload info slot value, when present and readable.
    pub unload_info_value: Option<u64>,
}

/// A delay-loaded module.
#[derive(Debug, Clone)]
pub struct DelayLoadedModule {
    /// The module name.
    pub name: String,
    /// The raw descriptor.
    pub descriptor: DelayLoadDescriptor,
    /// Functions, in name-table order.
    pub functions: Vec<DelayImportFunction>,
}

/// The complete delay import directory.
#[derive(Debug, Clone, Default)]
pub struct DelayImportDirectory {
    pub modules: Vec<DelayLoadedModule>,
}

impl DelayImportDirectory {
    /// Walk the null-terminated descriptor array at the directory RVA.
    pub fn parse<F>(dir_rva: u32, is_64bit: bool, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        let mut modules = Vec::new();

        for index in 0u32.. {
            let desc_rva = dir_rva
                .checked_add(index.checked_mul(DelayLoadDescriptor::SIZE as u32)?)?;
            let Some(descriptor) = read_at_rva(desc_rva, DelayLoadDescriptor::SIZE)
                .and_then(|data| DelayLoadDescriptor::parse(&data).ok())
            else {
                break;
            };
            if descriptor.dll_name_rva == 0 {
                break;
            }

            let name = read_string(&read_at_rva, descriptor.dll_name_rva).unwrap_or_default();
            let functions = read_functions(&descriptor, is_64bit, &read_at_rva);

            modules.push(DelayLoadedModule {
                name,
                descriptor,
                functions,
            });
        }

        if modules.is_empty() {
            return None;
        }
        Some(Self { modules })
    }
}

fn read_functions<F>(
    descriptor: &DelayLoadDescriptor,
    is_64bit: bool,
    read_at_rva: &F,
) -> Vec<DelayImportFunction>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let mut functions = Vec::new();
    if descriptor.import_name_table_rva == 0 {
        return functions;
    }
    let slot_size = if is_64bit { 8u32 } else { 4u32 };

    for index in 0u32.. {
        let Some(slot_offset) = index.checked_mul(slot_size) else {
            break;
        };
        let Some(value) = read_slot(descriptor.import_name_table_rva, slot_offset, is_64bit, read_at_rva)
        else {
            break;
        };
        if value == 0 {
            break;
        }

        let is_ordinal = if is_64bit {
            ImportThunk::is_ordinal_entry_64(value)
        } else {
            ImportThunk::is_ordinal_entry_32(value as u32)
        };
        let thunk = if is_ordinal {
            ImportThunk::Ordinal((value & 0xFFFF) as u16)
        } else {
            let hint_rva = (value & 0x7FFF_FFFF) as u32;
            let Some(hint_data) = read_at_rva(hint_rva, 2).filter(|d| d.len() == 2) else {
                break;
            };
            let hint = u16::from_le_bytes([hint_data[0], hint_data[1]]);
            let Some(name) = read_string(read_at_rva, hint_rva.wrapping_add(2)) else {
                break;
            };
            ImportThunk::Name { hint, name }
        };

        // The other three tables run parallel to the name table.
        let sample = |table_rva: u32| {
            if table_rva == 0 {
                return None;
            }
            read_slot(table_rva, slot_offset, is_64bit, read_at_rva)
        };

        functions.push(DelayImportFunction {
            thunk,
            iat_value: sample(descriptor.import_address_table_rva),
            bound_iat_value: sample(descriptor.bound_import_address_table_rva),
            unload_info_value: sample(descriptor.unload_information_table_rva),
        });
    }

    functions
}

fn read_slot<F>(table_rva: u32, slot_offset: u32, is_64bit: bool, read_at_rva: &F) -> Option<u64>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let slot_size = if is_64bit { 8 } else { 4 };
    let rva = table_rva.checked_add(slot_offset)?;
    let data = read_at_rva(rva, slot_size).filter(|d| d.len() == slot_size)?;
    Some(if is_64bit {
        u64::from_le_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ])
    } else {
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64
    })
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
