//! # Pescope
//!
//! A defensive, read-only parser for PE (Portable Executable) images, both
//! PE32 and PE32+, built for inspection, forensics, and security tooling.
//!
//! Input bytes are treated as hostile: every offset derived from a
//! file-supplied field is bounds-checked through a validated byte view,
//! address arithmetic runs in a width wider than the RVA space, and cyclic
//! or self-referential directory structures are traversed with explicit
//! guards. Malformed content never panics; it prunes.
//!
//! ## Architecture
//!
//! Parsing follows a two-tier pattern:
//!
//! 1. **Raw structures** use `parse(&[u8])` for fixed-size records:
//!    `DosHeader::parse`, `SectionHeader::parse`, `ExportDirectory::parse`.
//! 2. **High-level tables** take an RVA-reader closure for following
//!    file-supplied pointers: `ImportTable::parse(rva, is_64bit, read_fn)`,
//!    `ResourceDirectory::parse(rva, read_fn)`. The closure clamps every
//!    read to the mapped extent.
//!
//! The [`Image`] handle ties the tiers together: it classifies the headers
//! once at open and exposes each directory as an independent, idempotent
//! query returning `Option`. A directory that is missing, malformed, or
//! truncated is simply absent; no query failure affects another query.
//!
//! ## Errors
//!
//! Only opening reports errors ([`Error`], with stable status codes for
//! embedders). A buffer with a valid DOS header but no locatable NT header
//! still opens: the DOS header stays queryable and every NT-dependent
//! query returns `None`.
//!
//! ## Example
//!
//! ```no_run
//! use pescope::Image;
//!
//! let image = Image::open("example.exe")?;
//! println!("type: {:?}", image.file_type());
//!
//! if let Some(import) = image.import() {
//!     for module in &import.modules {
//!         println!("imports {} ({} functions)", module.name, module.functions.len());
//!     }
//! }
//! for section in image.section_headers().unwrap_or_default() {
//!     println!("section {} at {:#x}", section.name, section.header.virtual_address);
//! }
//! # Ok::<(), pescope::Error>(())
//! ```

pub mod bound_import;
pub mod clr;
pub mod coff;
pub mod data_dir;
pub mod debug;
pub mod delay_import;
pub mod dos;
pub mod error;
pub mod exception;
pub mod export;
pub mod image;
pub mod import;
pub mod loadconfig;
pub mod optional;
pub mod reloc;
pub mod resource;
pub mod rich;
pub mod section;
pub mod security;
pub mod tls;
pub mod view;

/// Byte cap for every in-image string read (ASCII paths and names).
pub const MAX_PATH: usize = 260;

/// Cap on import descriptors walked per image; a crafted descriptor array
/// stops here.
pub const MAX_IMPORT_MODULES: usize = 1000;

/// Cap on thunks walked per import descriptor.
pub const MAX_IMPORT_FUNCTIONS: usize = 5000;

/// Data directory entries read from the optional header. The PE format
/// defines 16 slots but only indices 0-14 are addressable directories; the
/// reserved 15th entry is not reported.
pub const MAX_DATA_DIRECTORIES: usize = 15;

pub use bound_import::{BoundForwarderRef, BoundImportDescriptor, BoundImportDirectory};
pub use clr::Cor20Header;
pub use coff::{FileCharacteristics, FileHeader, MachineType, PE_SIGNATURE};
pub use data_dir::{DataDirectory, DirectoryType};
pub use debug::{DebugDirectory, DebugEntry, DebugTable, DebugType};
pub use delay_import::{
    DelayImportDirectory, DelayImportFunction, DelayLoadDescriptor, DelayLoadedModule,
};
pub use dos::DosHeader;
pub use error::{Error, Result};
pub use exception::{ExceptionTable, RuntimeFunction};
pub use export::{ExportDirectory, ExportTable, ExportedFunction};
pub use image::{FileType, Image, NtHeaders, SectionRecord};
pub use import::{ImportDescriptor, ImportTable, ImportThunk, ImportedModule};
pub use loadconfig::{LoadConfigDirectory, LoadConfigDirectory32, LoadConfigDirectory64};
pub use optional::{
    DllCharacteristics, OptionalHeader, OptionalHeader32, OptionalHeader64, Subsystem,
};
pub use reloc::{RelocationBlock, RelocationEntry, RelocationTable, RelocationType};
pub use resource::{
    FlatResource, ResourceDataEntry, ResourceDirectory, ResourceDirectoryEntry,
    ResourceDirectoryHeader, ResourceEntry, ResourceId, ResourceNode, ResourceType,
};
pub use rich::{RichEntry, RichHeader};
pub use section::{SectionFlags, SectionHeader};
pub use security::{Certificate, CertificateRevision, CertificateType, SecurityDirectory};
pub use tls::{TlsDirectory, TlsDirectory32, TlsDirectory64, TlsInfo};
pub use view::{ImageData, ImageView};
