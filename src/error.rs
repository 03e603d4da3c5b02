//! Error types for PE parsing.
//!
//! Only the open path reports errors; per-directory queries signal failure by
//! returning `None` (see the crate docs). Each open error maps onto a stable
//! numeric status code for callers that bridge to non-Rust consumers.

use std::io;

use thiserror::Error;

/// Result type alias for pescope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening a PE image.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The file could not be opened for reading.
    #[error("failed to open file: {0}")]
    FileOpen(#[source] io::Error),
    /// The input is smaller than the 64-byte DOS header.
    #[error("file too small for a DOS header ({size} bytes)")]
    TooSmall { size: u64 },
    /// The read-only file mapping could not be created.
    #[error("failed to map file: {0}")]
    Mapping(#[source] io::Error),
    /// The buffer does not start with the "MZ" signature.
    #[error("DOS signature not found")]
    DosSignature,
    /// A fixed-size structure was parsed from an undersized slice.
    #[error("buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
}

impl Error {
    /// Stable numeric status code for this error.
    ///
    /// `0` is reserved for success; open failures report `1` (file open),
    /// `2` (short file), `3` (mapping) or `4` (DOS signature).
    pub fn status_code(&self) -> u32 {
        match self {
            Error::FileOpen(_) => 1,
            Error::TooSmall { .. } | Error::BufferTooSmall { .. } => 2,
            Error::Mapping(_) => 3,
            Error::DosSignature => 4,
        }
    }
}
