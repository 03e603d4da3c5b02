//! Byte-range provider and the bounds-checked read primitives.
//!
//! Every address computed from file-supplied fields goes through [`ImageView`]:
//! offsets are `u64` (strictly wider than the 32-bit RVA space), sums use
//! checked arithmetic, and a read succeeds only when the full extent lies
//! inside the backing bytes. No other module performs raw offset arithmetic.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::{Error, Result};

/// Backing storage for an opened image.
///
/// A mapped or owned variant is released when the handle is closed or
/// dropped; a borrowed variant merely references caller memory, whose
/// lifetime must outlive the handle.
pub enum ImageData<'a> {
    /// Read-only file mapping owned by the handle.
    Mapped(Mmap),
    /// Owned byte vector.
    Owned(Vec<u8>),
    /// Caller-supplied slice.
    Borrowed(&'a [u8]),
    /// Post-close state; zero length, every query comes back empty.
    Closed,
}

impl ImageData<'_> {
    /// Map a file read-only.
    pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(Error::FileOpen)?;
        let len = file.metadata().map_err(Error::FileOpen)?.len();
        if len < crate::dos::DosHeader::SIZE as u64 {
            return Err(Error::TooSmall { size: len });
        }
        // Safety: the map is private and read-only; mutation of the file by
        // other processes is outside the defended perimeter.
        let map = unsafe { Mmap::map(&file) }.map_err(Error::Mapping)?;
        Ok(ImageData::Mapped(map))
    }

    /// The underlying bytes; empty after close.
    pub fn bytes(&self) -> &[u8] {
        match self {
            ImageData::Mapped(map) => map,
            ImageData::Owned(vec) => vec,
            ImageData::Borrowed(slice) => slice,
            ImageData::Closed => &[],
        }
    }
}

impl std::fmt::Debug for ImageData<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ImageData::Mapped(_) => "Mapped",
            ImageData::Owned(_) => "Owned",
            ImageData::Borrowed(_) => "Borrowed",
            ImageData::Closed => "Closed",
        };
        write!(f, "ImageData::{}({} bytes)", kind, self.bytes().len())
    }
}

/// Bounds-checked view over a contiguous byte range.
///
/// All reads are little-endian and total: out-of-range access yields `None`,
/// never a panic or a wrapped address.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
}

impl<'a> ImageView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Length of the viewed range.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `len` bytes starting at `offset`, if the whole extent is in range.
    pub fn bytes(&self, offset: u64, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len as u64)?;
        if end > self.len() {
            return None;
        }
        Some(&self.data[offset as usize..end as usize])
    }

    /// Bytes from `offset` to the end of the range.
    pub fn bytes_to_end(&self, offset: u64) -> Option<&'a [u8]> {
        if offset > self.len() {
            return None;
        }
        Some(&self.data[offset as usize..])
    }

    pub fn read_u8(&self, offset: u64) -> Option<u8> {
        self.bytes(offset, 1).map(|b| b[0])
    }

    pub fn read_u16(&self, offset: u64) -> Option<u16> {
        self.bytes(offset, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, offset: u64) -> Option<u32> {
        self.bytes(offset, 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&self, offset: u64) -> Option<u64> {
        self.bytes(offset, 8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Null-terminated string at `offset`, at most `max` bytes.
    ///
    /// Stops at the terminator, at `max`, or at the end of the range,
    /// whichever comes first. Non-UTF-8 bytes are replaced, not rejected.
    pub fn read_cstr(&self, offset: u64, max: usize) -> Option<String> {
        if offset >= self.len() {
            return None;
        }
        let avail = (self.len() - offset) as usize;
        let slice = &self.data[offset as usize..offset as usize + avail.min(max)];
        let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        Some(String::from_utf8_lossy(&slice[..end]).into_owned())
    }

    /// UTF-16LE string of `units` code units at `offset`.
    pub fn read_utf16(&self, offset: u64, units: usize) -> Option<String> {
        let raw = self.bytes(offset, units.checked_mul(2)?)?;
        let words: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Some(String::from_utf16_lossy(&words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_in_range() {
        let data = [0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00];
        let view = ImageView::new(&data);
        assert_eq!(view.read_u16(0), Some(0x5A4D));
        assert_eq!(view.read_u32(2), Some(0x00000090));
        assert_eq!(view.read_u64(0), Some(0x0000000300905A4D));
    }

    #[test]
    fn test_reads_out_of_range() {
        let data = [0u8; 4];
        let view = ImageView::new(&data);
        assert_eq!(view.read_u32(1), None);
        assert_eq!(view.read_u8(4), None);
        assert!(view.bytes(2, 3).is_none());
    }

    #[test]
    fn test_offset_sum_cannot_wrap() {
        let data = [0u8; 16];
        let view = ImageView::new(&data);
        assert!(view.bytes(u64::MAX, 8).is_none());
        assert!(view.bytes(u64::MAX - 2, usize::MAX).is_none());
    }

    #[test]
    fn test_cstr_terminator_and_cap() {
        let data = b"KERNEL32.dll\0garbage";
        let view = ImageView::new(data);
        assert_eq!(view.read_cstr(0, 260).as_deref(), Some("KERNEL32.dll"));
        // No terminator within the cap: truncated at the cap.
        assert_eq!(view.read_cstr(13, 4).as_deref(), Some("garb"));
        assert_eq!(view.read_cstr(64, 260), None);
    }

    #[test]
    fn test_cstr_clamped_to_end() {
        let data = b"abc";
        let view = ImageView::new(data);
        assert_eq!(view.read_cstr(1, 260).as_deref(), Some("bc"));
    }

    #[test]
    fn test_utf16() {
        let data = [b'M', 0, b'Z', 0];
        let view = ImageView::new(&data);
        assert_eq!(view.read_utf16(0, 2).as_deref(), Some("MZ"));
        assert_eq!(view.read_utf16(2, 2), None);
    }

    #[test]
    fn test_image_data_bytes() {
        let owned = ImageData::Owned(vec![1, 2, 3]);
        assert_eq!(owned.bytes(), &[1, 2, 3]);
        let buf = [4u8, 5];
        let borrowed = ImageData::Borrowed(&buf);
        assert_eq!(borrowed.bytes(), &[4, 5]);
        assert!(ImageData::Closed.bytes().is_empty());
    }
}
