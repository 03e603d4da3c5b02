//! Exception directory (.pdata) parsing.
//!
//! The exception directory is a packed array of RUNTIME_FUNCTION records
//! used for stack unwinding on x64; the record count is derived from the
//! directory size and the full extent is bounds-checked before any record
//! is copied out.

use crate::{Error, Result};

/// RUNTIME_FUNCTION entry for x64 (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeFunction {
    /// RVA of the start of the function.
    pub begin_address: u32,
    /// RVA of the end of the function.
    pub end_address: u32,
    /// RVA of the unwind information.
    pub unwind_info_address: u32,
}

impl RuntimeFunction {
    pub const SIZE: usize = 12;

    /// Parse from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            begin_address: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            end_address: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            unwind_info_address: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
        })
    }

    /// Check if an RVA is within this function.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.begin_address && rva < self.end_address
    }
}

/// The exception directory: all runtime function entries.
#[derive(Debug, Clone, Default)]
pub struct ExceptionTable {
    pub functions: Vec<RuntimeFunction>,
}

impl ExceptionTable {
    /// Parse `size / 12` entries at the directory RVA.
    ///
    /// The whole extent must be readable; a truncated directory yields
    /// `None` rather than a partial table.
    pub fn parse<F>(rva: u32, size: u32, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        let count = size as usize / RuntimeFunction::SIZE;
        let extent = count * RuntimeFunction::SIZE;
        let data = read_at_rva(rva, extent).filter(|d| d.len() == extent)?;

        let mut functions = Vec::with_capacity(count);
        for chunk in data.chunks_exact(RuntimeFunction::SIZE) {
            functions.push(RuntimeFunction::parse(chunk).ok()?);
        }

        Some(Self { functions })
    }

    /// Find the function covering an RVA.
    pub fn function_at(&self, rva: u32) -> Option<&RuntimeFunction> {
        self.functions.iter().find(|f| f.contains_rva(rva))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_bytes(begin: u32, end: u32, unwind: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&begin.to_le_bytes());
        data.extend_from_slice(&end.to_le_bytes());
        data.extend_from_slice(&unwind.to_le_bytes());
        data
    }

    #[test]
    fn test_runtime_function_size() {
        assert_eq!(RuntimeFunction::SIZE, 12);
    }

    #[test]
    fn test_parse_entries() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&entry_bytes(0x1000, 0x1040, 0x5000));
        blob.extend_from_slice(&entry_bytes(0x1040, 0x10A0, 0x5010));
        let blob_len = blob.len();

        let table = ExceptionTable::parse(0x2000, blob_len as u32, |rva, len| {
            let start = (rva as u64).checked_sub(0x2000)? as usize;
            if start >= blob.len() {
                return None;
            }
            let avail = blob.len() - start;
            Some(blob[start..start + len.min(avail)].to_vec())
        })
        .unwrap();

        assert_eq!(table.functions.len(), 2);
        assert_eq!(table.functions[0].begin_address, 0x1000);
        assert_eq!(table.function_at(0x1050).unwrap().unwind_info_address, 0x5010);
        assert!(table.function_at(0x2000).is_none());
    }

    #[test]
    fn test_truncated_extent_is_absent() {
        let blob = entry_bytes(0x1000, 0x1040, 0x5000);
        // Directory claims two entries, backing store has one.
        let result = ExceptionTable::parse(0x2000, 24, |rva, len| {
            let start = (rva as u64).checked_sub(0x2000)? as usize;
            if start >= blob.len() {
                return None;
            }
            let avail = blob.len() - start;
            Some(blob[start..start + len.min(avail)].to_vec())
        });
        assert!(result.is_none());
    }

    #[test]
    fn test_size_remainder_ignored() {
        let blob = entry_bytes(0x1000, 0x1040, 0x5000);
        // Size of 13: one whole entry, trailing byte dropped.
        let table = ExceptionTable::parse(0x2000, 13, |rva, len| {
            let start = (rva as u64).checked_sub(0x2000)? as usize;
            if start >= blob.len() {
                return None;
            }
            let avail = blob.len() - start;
            Some(blob[start..start + len.min(avail)].to_vec())
        })
        .unwrap();
        assert_eq!(table.functions.len(), 1);
    }
}
