//! Bound import directory parsing.
//!
//! Bound imports record pre-resolved import addresses plus the timestamps
//! they were bound against. Each descriptor is trailed by its forwarder
//! refs in the same array; module name strings sit at byte offsets from the
//! record that references them.

use crate::MAX_PATH;

/// IMAGE_BOUND_FORWARDER_REF - 8 bytes.
#[derive(Debug, Clone)]
pub struct BoundForwarderRef {
    /// Timestamp of the forwarder DLL.
    pub time_date_stamp: u32,
    /// Offset of the module name, from this record.
    pub offset_module_name: u16,
    /// Reserved.
    pub reserved: u16,
    /// Resolved module name.
    pub module_name: String,
}

impl BoundForwarderRef {
    pub const SIZE: usize = 8;
}

/// IMAGE_BOUND_IMPORT_DESCRIPTOR - 8 bytes.
#[derive(Debug, Clone)]
pub struct BoundImportDescriptor {
    /// Timestamp of the bound DLL; zero terminates the array.
    pub time_date_stamp: u32,
    /// Offset of the module name, from this record.
    pub offset_module_name: u16,
    /// Number of forwarder references trailing this descriptor.
    pub number_of_module_forwarder_refs: u16,
    /// Resolved module name.
    pub module_name: String,
    /// Forwarder references.
    pub forwarder_refs: Vec<BoundForwarderRef>,
}

impl BoundImportDescriptor {
    pub const SIZE: usize = 8;
}

/// The complete bound import directory.
#[derive(Debug, Clone, Default)]
pub struct BoundImportDirectory {
    pub descriptors: Vec<BoundImportDescriptor>,
}

impl BoundImportDirectory {
    /// Walk descriptors at the directory RVA until a zero timestamp.
    pub fn parse<F>(dir_rva: u32, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        let mut descriptors = Vec::new();
        let mut offset = 0u64;

        loop {
            let desc_rva = (dir_rva as u64)
                .checked_add(offset)
                .and_then(|v| u32::try_from(v).ok())?;
            let Some((time_date_stamp, offset_module_name, refs)) =
                read_record(desc_rva, &read_at_rva)
            else {
                break;
            };
            if time_date_stamp == 0 {
                break;
            }

            let module_name = read_name(desc_rva, offset_module_name, &read_at_rva);

            let mut forwarder_refs = Vec::new();
            let mut truncated = false;
            for ref_index in 0..refs {
                let Some(ref_rva) = (desc_rva as u64)
                    .checked_add(BoundImportDescriptor::SIZE as u64)
                    .and_then(|v| v.checked_add(ref_index as u64 * BoundForwarderRef::SIZE as u64))
                    .and_then(|v| u32::try_from(v).ok())
                else {
                    truncated = true;
                    break;
                };
                let Some((fwd_stamp, fwd_name_offset, fwd_reserved)) =
                    read_record(ref_rva, &read_at_rva)
                else {
                    truncated = true;
                    break;
                };
                forwarder_refs.push(BoundForwarderRef {
                    time_date_stamp: fwd_stamp,
                    offset_module_name: fwd_name_offset,
                    reserved: fwd_reserved,
                    module_name: read_name(ref_rva, fwd_name_offset, &read_at_rva),
                });
            }

            let ref_count = forwarder_refs.len();
            descriptors.push(BoundImportDescriptor {
                time_date_stamp,
                offset_module_name,
                number_of_module_forwarder_refs: refs,
                module_name,
                forwarder_refs,
            });
            if truncated {
                break;
            }

            offset += (BoundImportDescriptor::SIZE
                + ref_count * BoundForwarderRef::SIZE) as u64;
        }

        if descriptors.is_empty() {
            return None;
        }
        Some(Self { descriptors })
    }
}

/// An 8-byte bound import record: (timestamp, name offset, third field).
fn read_record<F>(rva: u32, read_at_rva: &F) -> Option<(u32, u16, u16)>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let data = read_at_rva(rva, 8).filter(|d| d.len() == 8)?;
    Some((
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        u16::from_le_bytes([data[4], data[5]]),
        u16::from_le_bytes([data[6], data[7]]),
    ))
}

fn read_name<F>(record_rva: u32, name_offset: u16, read_at_rva: &F) -> String
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let Some(name_rva) = record_rva.checked_add(name_offset as u32) else {
        return String::new();
    };
    match read_at_rva(name_rva, MAX_PATH) {
        Some(data) => {
            let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
            String::from_utf8_lossy(&data[..end]).into_owned()
        }
        None => String::new(),
    }
}
