//! TLS (Thread Local Storage) directory parsing.
//!
//! The TLS directory is width-specific. Its addresses are VAs, not RVAs;
//! the callback array is located by subtracting the preferred image base
//! before resolving through the section table.

use crate::{Error, Result};

/// IMAGE_TLS_DIRECTORY32 - 24 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsDirectory32 {
    /// Starting address of the TLS template (VA).
    pub start_address_of_raw_data: u32,
    /// Ending address of the TLS template (VA).
    pub end_address_of_raw_data: u32,
    /// Address of the TLS index (VA).
    pub address_of_index: u32,
    /// Address of TLS callback array (VA).
    pub address_of_callbacks: u32,
    /// Size of zero-filled area.
    pub size_of_zero_fill: u32,
    /// Characteristics (reserved, typically 0).
    pub characteristics: u32,
}

impl TlsDirectory32 {
    pub const SIZE: usize = 24;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            start_address_of_raw_data: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            end_address_of_raw_data: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            address_of_index: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            address_of_callbacks: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            size_of_zero_fill: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            characteristics: u32::from_le_bytes([data[20], data[21], data[22], data[23]]),
        })
    }
}

/// IMAGE_TLS_DIRECTORY64 - 40 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsDirectory64 {
    /// Starting address of the TLS template (VA).
    pub start_address_of_raw_data: u64,
    /// Ending address of the TLS template (VA).
    pub end_address_of_raw_data: u64,
    /// Address of the TLS index (VA).
    pub address_of_index: u64,
    /// Address of TLS callback array (VA).
    pub address_of_callbacks: u64,
    /// Size of zero-filled area.
    pub size_of_zero_fill: u32,
    /// Characteristics (reserved, typically 0).
    pub characteristics: u32,
}

impl TlsDirectory64 {
    pub const SIZE: usize = 40;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            start_address_of_raw_data: u64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]),
            end_address_of_raw_data: u64::from_le_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]),
            address_of_index: u64::from_le_bytes([
                data[16], data[17], data[18], data[19], data[20], data[21], data[22], data[23],
            ]),
            address_of_callbacks: u64::from_le_bytes([
                data[24], data[25], data[26], data[27], data[28], data[29], data[30], data[31],
            ]),
            size_of_zero_fill: u32::from_le_bytes([data[32], data[33], data[34], data[35]]),
            characteristics: u32::from_le_bytes([data[36], data[37], data[38], data[39]]),
        })
    }
}

/// Width-combined TLS directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsDirectory {
    Tls32(TlsDirectory32),
    Tls64(TlsDirectory64),
}

impl TlsDirectory {
    /// Callback array VA, widened for PE32.
    pub fn address_of_callbacks(&self) -> u64 {
        match self {
            TlsDirectory::Tls32(dir) => dir.address_of_callbacks as u64,
            TlsDirectory::Tls64(dir) => dir.address_of_callbacks as u64,
        }
    }
}

/// Parsed TLS information: the directory plus its callback array.
#[derive(Debug, Clone)]
pub struct TlsInfo {
    /// The width-specific directory record.
    pub directory: TlsDirectory,
    /// Raw callback slot values (VAs), walked until the zero terminator.
    pub callbacks: Vec<u64>,
}

impl TlsInfo {
    /// Parse the TLS directory and its callback array.
    ///
    /// `image_base` rebases `AddressOfCallBacks` from VA space to an RVA
    /// before resolution; a VA below the base yields no callbacks.
    pub fn parse<F>(tls_rva: u32, is_64bit: bool, image_base: u64, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        let directory = if is_64bit {
            let data = read_at_rva(tls_rva, TlsDirectory64::SIZE)?;
            TlsDirectory::Tls64(TlsDirectory64::parse(&data).ok()?)
        } else {
            let data = read_at_rva(tls_rva, TlsDirectory32::SIZE)?;
            TlsDirectory::Tls32(TlsDirectory32::parse(&data).ok()?)
        };

        let callbacks = read_callbacks(&directory, is_64bit, image_base, &read_at_rva);

        Some(Self {
            directory,
            callbacks,
        })
    }
}

fn read_callbacks<F>(
    directory: &TlsDirectory,
    is_64bit: bool,
    image_base: u64,
    read_at_rva: &F,
) -> Vec<u64>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let callbacks_va = directory.address_of_callbacks();
    if callbacks_va == 0 {
        return Vec::new();
    }
    let Some(array_rva) = callbacks_va
        .checked_sub(image_base)
        .and_then(|rva| u32::try_from(rva).ok())
    else {
        return Vec::new();
    };

    let slot_size = if is_64bit { 8 } else { 4 };
    let mut callbacks = Vec::new();
    for index in 0u64.. {
        let Some(slot_rva) = (array_rva as u64)
            .checked_add(index * slot_size as u64)
            .and_then(|v| u32::try_from(v).ok())
        else {
            break;
        };
        let Some(data) = read_at_rva(slot_rva, slot_size).filter(|d| d.len() == slot_size) else {
            break;
        };
        let value = if is_64bit {
            u64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ])
        } else {
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64
        };
        if value == 0 {
            break;
        }
        callbacks.push(value);
    }
    callbacks
}
