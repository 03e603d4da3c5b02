//! Data Directory structures and parsing.

use crate::{Error, Result};

/// Data directory type - type-safe enum for data directory indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum DirectoryType {
    /// Export table (.edata)
    Export = 0,
    /// Import table (.idata)
    Import = 1,
    /// Resource table (.rsrc)
    Resource = 2,
    /// Exception table (.pdata)
    Exception = 3,
    /// Certificate/Security table. Its "RVA" is a file offset.
    Security = 4,
    /// Base relocation table (.reloc)
    BaseReloc = 5,
    /// Debug directory
    Debug = 6,
    /// Architecture-specific data
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage (.tls)
    Tls = 9,
    /// Load configuration
    LoadConfig = 10,
    /// Bound import table
    BoundImport = 11,
    /// Import address table
    Iat = 12,
    /// Delay import descriptor
    DelayImport = 13,
    /// COM descriptor (CLR runtime header)
    ComDescriptor = 14,
}

impl DirectoryType {
    /// Get the index value.
    pub const fn as_index(self) -> usize {
        self as usize
    }

    /// Try to create from an index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Export),
            1 => Some(Self::Import),
            2 => Some(Self::Resource),
            3 => Some(Self::Exception),
            4 => Some(Self::Security),
            5 => Some(Self::BaseReloc),
            6 => Some(Self::Debug),
            7 => Some(Self::Architecture),
            8 => Some(Self::GlobalPtr),
            9 => Some(Self::Tls),
            10 => Some(Self::LoadConfig),
            11 => Some(Self::BoundImport),
            12 => Some(Self::Iat),
            13 => Some(Self::DelayImport),
            14 => Some(Self::ComDescriptor),
            _ => None,
        }
    }

    /// Iterate over all addressable directory types.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..crate::MAX_DATA_DIRECTORIES).filter_map(Self::from_index)
    }
}

/// Data Directory entry (IMAGE_DATA_DIRECTORY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct DataDirectory {
    /// RVA of the table (file offset for the Security directory).
    pub virtual_address: u32,
    /// Size of the table in bytes.
    pub size: u32,
}

impl DataDirectory {
    /// Size of a data directory entry in bytes.
    pub const SIZE: usize = 8;

    /// Parse a data directory from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            virtual_address: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            size: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    /// Check if this directory entry is present (non-zero).
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 || self.size != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_directory_size() {
        assert_eq!(DataDirectory::SIZE, 8);
    }

    #[test]
    fn test_data_directory_parse() {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&0x1000u32.to_le_bytes());
        buf[4..8].copy_from_slice(&0x200u32.to_le_bytes());

        let parsed = DataDirectory::parse(&buf).unwrap();
        assert_eq!(parsed.virtual_address, 0x1000);
        assert_eq!(parsed.size, 0x200);
        assert!(parsed.is_present());
    }

    #[test]
    fn test_data_directory_not_present() {
        let dir = DataDirectory::default();
        assert!(!dir.is_present());
    }

    #[test]
    fn test_directory_type_roundtrip() {
        for dir_type in DirectoryType::all() {
            let index = dir_type.as_index();
            assert_eq!(DirectoryType::from_index(index), Some(dir_type));
        }
        assert_eq!(DirectoryType::from_index(15), None);
    }

    #[test]
    fn test_directory_type_values() {
        assert_eq!(DirectoryType::Export.as_index(), 0);
        assert_eq!(DirectoryType::Import.as_index(), 1);
        assert_eq!(DirectoryType::Resource.as_index(), 2);
        assert_eq!(DirectoryType::Security.as_index(), 4);
        assert_eq!(DirectoryType::BaseReloc.as_index(), 5);
        assert_eq!(DirectoryType::Tls.as_index(), 9);
        assert_eq!(DirectoryType::BoundImport.as_index(), 11);
        assert_eq!(DirectoryType::DelayImport.as_index(), 13);
        assert_eq!(DirectoryType::ComDescriptor.as_index(), 14);
    }
}
