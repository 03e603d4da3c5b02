//! The image handle: lifecycle, header classification, and per-directory
//! queries.
//!
//! An [`Image`] is immutable once opened: the headers are classified exactly
//! once, every query borrows `&self`, and failures stay local to the query
//! that hit them. A handle whose NT header could not be located still
//! answers the DOS header query; everything NT-dependent comes back `None`.

use std::path::Path;

use log::debug;

use crate::bound_import::BoundImportDirectory;
use crate::clr::Cor20Header;
use crate::coff::{FileHeader, PE_SIGNATURE};
use crate::data_dir::{DataDirectory, DirectoryType};
use crate::debug::DebugTable;
use crate::delay_import::DelayImportDirectory;
use crate::dos::DosHeader;
use crate::exception::ExceptionTable;
use crate::export::ExportTable;
use crate::import::ImportTable;
use crate::loadconfig::LoadConfigDirectory;
use crate::optional::{
    OptionalHeader, OptionalHeader32, OptionalHeader64, PE32PLUS_MAGIC, PE32_MAGIC, ROM_MAGIC,
};
use crate::reloc::RelocationTable;
use crate::resource::{FlatResource, ResourceDirectory};
use crate::rich::RichHeader;
use crate::section::SectionHeader;
use crate::security::SecurityDirectory;
use crate::tls::TlsInfo;
use crate::view::{ImageData, ImageView};
use crate::{Error, Result};

/// Machine-width classification of an opened image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// 32-bit image (optional header magic 0x10B).
    Pe32,
    /// 64-bit image (optional header magic 0x20B).
    Pe64,
    /// ROM image (magic 0x107); recognized, not parsed further.
    Rom,
    /// No NT header, or an unrecognized optional header magic.
    #[default]
    Unknown,
}

/// The located NT header: signature offset plus its two halves.
#[derive(Debug, Clone)]
pub struct NtHeaders {
    /// File offset of the "PE\0\0" signature (`e_lfanew`).
    pub offset: u64,
    /// The COFF file header.
    pub file_header: FileHeader,
    /// The width-specific optional header.
    pub optional_header: OptionalHeader,
}

/// A section header with its resolved name.
///
/// Names of the form `/decimal` resolve through the COFF string table;
/// entries whose resolution fails are skipped from the reported list.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    /// The raw header.
    pub header: SectionHeader,
    /// Resolved name.
    pub name: String,
}

/// A parsed PE image.
///
/// Queries are idempotent and independent; the handle is safe to share
/// across threads once opened.
#[derive(Debug)]
pub struct Image<'a> {
    data: ImageData<'a>,
    dos: Option<DosHeader>,
    file_type: FileType,
    nt: Option<NtHeaders>,
    /// Raw section table, parsed once at open; drives RVA resolution even
    /// when individual entries are skipped from the reported list.
    sections: Vec<SectionHeader>,
}

impl Image<'static> {
    /// Open a file read-only and map it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_data(ImageData::map_file(path)?)
    }

    /// Take ownership of a byte vector.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_data(ImageData::Owned(data))
    }
}

impl<'a> Image<'a> {
    /// Parse a caller-supplied buffer. The buffer must outlive the handle.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        Self::from_data(ImageData::Borrowed(data))
    }

    fn from_data(data: ImageData<'a>) -> Result<Self> {
        let bytes = data.bytes();
        if bytes.len() < DosHeader::SIZE {
            return Err(Error::TooSmall {
                size: bytes.len() as u64,
            });
        }
        let dos = DosHeader::parse(bytes)?;

        let view = ImageView::new(bytes);
        let (file_type, nt) = classify(&view, &dos);
        let sections = match &nt {
            Some(nt) => read_section_table(&view, nt),
            None => Vec::new(),
        };
        debug!(
            "opened image: {:?}, {} sections, NT header at {:?}",
            file_type,
            sections.len(),
            nt.as_ref().map(|nt| nt.offset)
        );

        Ok(Self {
            data,
            dos: Some(dos),
            file_type,
            nt,
            sections,
        })
    }

    /// Release the backing bytes and reset all cached headers.
    ///
    /// Idempotent; every query returns `None` afterwards. Dropping the
    /// handle releases owned resources implicitly.
    pub fn close(&mut self) {
        self.data = ImageData::Closed;
        self.dos = None;
        self.file_type = FileType::Unknown;
        self.nt = None;
        self.sections.clear();
    }

    /// Check if the handle still holds an opened image.
    pub fn is_open(&self) -> bool {
        self.dos.is_some()
    }

    /// The machine-width classification.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Check if this is a 64-bit (PE32+) image.
    pub fn is_64bit(&self) -> bool {
        self.file_type == FileType::Pe64
    }

    /// The raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    fn view(&self) -> ImageView<'_> {
        ImageView::new(self.data.bytes())
    }

    // ---- header queries ----

    /// The DOS header.
    pub fn dos_header(&self) -> Option<&DosHeader> {
        self.dos.as_ref()
    }

    /// The Rich header, when present between the DOS stub and NT header.
    pub fn rich_header(&self) -> Option<RichHeader> {
        let e_lfanew = self.dos.as_ref()?.nt_header_offset()?;
        RichHeader::parse(&self.view(), e_lfanew)
    }

    /// The located NT header.
    pub fn nt_header(&self) -> Option<&NtHeaders> {
        self.nt.as_ref()
    }

    /// The COFF file header half of the NT header.
    pub fn file_header(&self) -> Option<&FileHeader> {
        self.nt.as_ref().map(|nt| &nt.file_header)
    }

    /// The optional header half of the NT header.
    pub fn optional_header(&self) -> Option<&OptionalHeader> {
        self.nt.as_ref().map(|nt| &nt.optional_header)
    }

    /// The data directory array (at most the 15 addressable entries).
    pub fn data_directories(&self) -> Option<&[DataDirectory]> {
        self.optional_header().map(|opt| opt.data_directories())
    }

    /// A single data directory entry, when present and non-zero.
    pub fn directory_entry(&self, which: DirectoryType) -> Option<DataDirectory> {
        let dir = self
            .data_directories()?
            .get(which.as_index())
            .copied()?;
        if dir.virtual_address == 0 || dir.size == 0 {
            return None;
        }
        Some(dir)
    }

    /// RVA of a directory entry (file offset for Security).
    pub fn directory_rva(&self, which: DirectoryType) -> Option<u32> {
        self.directory_entry(which).map(|dir| dir.virtual_address)
    }

    /// Size of a directory entry.
    pub fn directory_size(&self, which: DirectoryType) -> Option<u32> {
        self.directory_entry(which).map(|dir| dir.size)
    }

    /// Section headers with resolved names.
    ///
    /// Absent when there is no NT header or the section count is zero.
    /// Entries whose `/decimal` name fails to resolve are skipped.
    pub fn section_headers(&self) -> Option<Vec<SectionRecord>> {
        if self.sections.is_empty() {
            return None;
        }
        let view = self.view();
        let string_table = self
            .file_header()
            .and_then(FileHeader::string_table_offset)
            .unwrap_or(0);
        let records: Vec<SectionRecord> = self
            .sections
            .iter()
            .filter_map(|header| {
                Some(SectionRecord {
                    header: header.clone(),
                    name: header.resolved_name(&view, string_table)?,
                })
            })
            .collect();
        Some(records)
    }

    /// The raw section header covering an RVA.
    pub fn section_by_rva(&self, rva: u32) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// The raw section header with the given in-header name.
    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.name_str() == name)
    }

    // ---- address translation ----

    /// Translate an RVA to a file offset through the section table.
    pub fn rva_to_offset(&self, rva: u32) -> Option<u64> {
        self.rva_span(rva).map(|(offset, _)| offset)
    }

    /// Resolve an RVA to `(file offset, readable bytes)`.
    ///
    /// The readable extent is clamped to both the file length and the
    /// section's raw data end.
    fn rva_span(&self, rva: u32) -> Option<(u64, u64)> {
        let section = self.section_by_rva(rva)?;
        let offset = section.rva_to_offset(rva)?;
        let raw_end =
            (section.pointer_to_raw_data as u64 + section.size_of_raw_data as u64).min(self.view().len());
        if offset >= raw_end {
            return None;
        }
        Some((offset, raw_end - offset))
    }

    /// Reader closure handed to the directory parsers: up to `len` bytes at
    /// an RVA, clamped to the mapped extent.
    fn rva_reader(&self) -> impl Fn(u32, usize) -> Option<Vec<u8>> + '_ {
        move |rva, len| {
            let (offset, avail) = self.rva_span(rva)?;
            let take = (len as u64).min(avail) as usize;
            Some(self.view().bytes(offset, take)?.to_vec())
        }
    }

    // ---- directory queries ----

    /// The export table.
    pub fn export(&self) -> Option<ExportTable> {
        let dir = self.directory_entry(DirectoryType::Export)?;
        ExportTable::parse(dir.virtual_address, dir.size, self.rva_reader())
    }

    /// The import table.
    pub fn import(&self) -> Option<ImportTable> {
        let dir = self.directory_entry(DirectoryType::Import)?;
        ImportTable::parse(dir.virtual_address, self.is_64bit(), self.rva_reader())
    }

    /// The three-level resource tree.
    pub fn resources(&self) -> Option<ResourceDirectory> {
        let dir = self.directory_entry(DirectoryType::Resource)?;
        ResourceDirectory::parse(dir.virtual_address, self.rva_reader())
    }

    /// The resource tree flattened to one record per language-level leaf.
    pub fn resources_flat(&self) -> Option<Vec<FlatResource>> {
        self.resources().map(|tree| tree.flatten())
    }

    /// The exception directory (RUNTIME_FUNCTION array).
    pub fn exceptions(&self) -> Option<ExceptionTable> {
        let dir = self.directory_entry(DirectoryType::Exception)?;
        ExceptionTable::parse(dir.virtual_address, dir.size, self.rva_reader())
    }

    /// The certificate table. The directory's address is a file offset.
    pub fn security(&self) -> Option<SecurityDirectory> {
        let dir = self.directory_entry(DirectoryType::Security)?;
        SecurityDirectory::parse(&self.view(), dir.virtual_address as u64, dir.size)
    }

    /// The base relocation table.
    pub fn relocations(&self) -> Option<RelocationTable> {
        let dir = self.directory_entry(DirectoryType::BaseReloc)?;
        RelocationTable::parse(dir.virtual_address, dir.size, self.rva_reader())
    }

    /// The debug directory.
    ///
    /// When a section named `.debug` starts exactly at the directory RVA,
    /// its raw pointer is used directly; otherwise the RVA resolves through
    /// the section table.
    pub fn debug_directory(&self) -> Option<DebugTable> {
        let dir = self.directory_entry(DirectoryType::Debug)?;
        let dir_offset = match self
            .section_by_name(".debug")
            .filter(|s| s.virtual_address == dir.virtual_address)
        {
            Some(section) => section.pointer_to_raw_data as u64,
            None => self.rva_to_offset(dir.virtual_address)?,
        };
        DebugTable::parse(&self.view(), dir_offset, dir.size)
    }

    /// The TLS directory and its callback array.
    pub fn tls(&self) -> Option<TlsInfo> {
        let dir = self.directory_entry(DirectoryType::Tls)?;
        let image_base = self.optional_header()?.image_base();
        TlsInfo::parse(
            dir.virtual_address,
            self.is_64bit(),
            image_base,
            self.rva_reader(),
        )
    }

    /// The load configuration record.
    pub fn load_config(&self) -> Option<LoadConfigDirectory> {
        let dir = self.directory_entry(DirectoryType::LoadConfig)?;
        LoadConfigDirectory::parse(dir.virtual_address, self.is_64bit(), self.rva_reader())
    }

    /// The bound import directory.
    pub fn bound_import(&self) -> Option<BoundImportDirectory> {
        let dir = self.directory_entry(DirectoryType::BoundImport)?;
        BoundImportDirectory::parse(dir.virtual_address, self.rva_reader())
    }

    /// The delay-load import directory.
    pub fn delay_import(&self) -> Option<DelayImportDirectory> {
        let dir = self.directory_entry(DirectoryType::DelayImport)?;
        DelayImportDirectory::parse(dir.virtual_address, self.is_64bit(), self.rva_reader())
    }

    /// The COM descriptor (CLR header) of managed assemblies.
    pub fn com_descriptor(&self) -> Option<Cor20Header> {
        let dir = self.directory_entry(DirectoryType::ComDescriptor)?;
        Cor20Header::parse_at(dir.virtual_address, self.rva_reader())
    }
}

/// Locate and classify the NT header. Failures are non-fatal: the caller
/// keeps a DOS-only handle with `FileType::Unknown`.
fn classify(view: &ImageView<'_>, dos: &DosHeader) -> (FileType, Option<NtHeaders>) {
    let Some(nt_offset) = dos.nt_header_offset() else {
        return (FileType::Unknown, None);
    };
    if view.read_u32(nt_offset) != Some(PE_SIGNATURE) {
        return (FileType::Unknown, None);
    }
    let Some(file_header) = view
        .bytes(nt_offset + 4, FileHeader::SIZE)
        .and_then(|data| FileHeader::parse(data).ok())
    else {
        return (FileType::Unknown, None);
    };

    let opt_offset = nt_offset + 4 + FileHeader::SIZE as u64;
    let Some(magic) = view.read_u16(opt_offset) else {
        return (FileType::Unknown, None);
    };
    let Some(opt_data) = view.bytes_to_end(opt_offset) else {
        return (FileType::Unknown, None);
    };

    match magic {
        PE32_MAGIC => match OptionalHeader32::parse(opt_data) {
            Ok(header) => (
                FileType::Pe32,
                Some(NtHeaders {
                    offset: nt_offset,
                    file_header,
                    optional_header: OptionalHeader::Pe32(header),
                }),
            ),
            Err(_) => (FileType::Unknown, None),
        },
        PE32PLUS_MAGIC => match OptionalHeader64::parse(opt_data) {
            Ok(header) => (
                FileType::Pe64,
                Some(NtHeaders {
                    offset: nt_offset,
                    file_header,
                    optional_header: OptionalHeader::Pe32Plus(header),
                }),
            ),
            Err(_) => (FileType::Unknown, None),
        },
        ROM_MAGIC => (FileType::Rom, None),
        _ => (FileType::Unknown, None),
    }
}

/// Read the raw section table; a header that does not fit truncates the
/// table there.
fn read_section_table(view: &ImageView<'_>, nt: &NtHeaders) -> Vec<SectionHeader> {
    let file_header = &nt.file_header;
    let first_section = nt.offset
        + 4
        + FileHeader::SIZE as u64
        + file_header.size_of_optional_header as u64;

    let mut sections = Vec::new();
    for index in 0..file_header.number_of_sections as u64 {
        let offset = first_section + index * SectionHeader::SIZE as u64;
        match view
            .bytes(offset, SectionHeader::SIZE)
            .and_then(|data| SectionHeader::parse(data).ok())
        {
            Some(header) => sections.push(header),
            None => break,
        }
    }
    sections
}
