//! Resource directory parsing and flattening.
//!
//! Resources form a tree of exactly three levels: Type, Name, Language.
//! Directory-internal offsets are relative to the resource root; the data
//! leaf's `offset_to_data` is an RVA into the image. Sub-directory offsets
//! that point back at an ancestor are emitted as empty directories instead of
//! recursing; samples in the wild use a root-referencing offset to induce
//! unbounded recursion.

use crate::{Error, Result, MAX_PATH};

/// Number of levels in a resource tree: Type, Name, Language.
const RESOURCE_LEVELS: u8 = 3;

/// Standard resource types (level-1 IDs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResourceType {
    Cursor = 1,
    Bitmap = 2,
    Icon = 3,
    Menu = 4,
    Dialog = 5,
    String = 6,
    FontDir = 7,
    Font = 8,
    Accelerator = 9,
    RcData = 10,
    MessageTable = 11,
    GroupCursor = 12,
    GroupIcon = 14,
    Version = 16,
    DlgInclude = 17,
    PlugPlay = 19,
    Vxd = 20,
    AniCursor = 21,
    AniIcon = 22,
    Html = 23,
    Manifest = 24,
}

impl ResourceType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Cursor),
            2 => Some(Self::Bitmap),
            3 => Some(Self::Icon),
            4 => Some(Self::Menu),
            5 => Some(Self::Dialog),
            6 => Some(Self::String),
            7 => Some(Self::FontDir),
            8 => Some(Self::Font),
            9 => Some(Self::Accelerator),
            10 => Some(Self::RcData),
            11 => Some(Self::MessageTable),
            12 => Some(Self::GroupCursor),
            14 => Some(Self::GroupIcon),
            16 => Some(Self::Version),
            17 => Some(Self::DlgInclude),
            19 => Some(Self::PlugPlay),
            20 => Some(Self::Vxd),
            21 => Some(Self::AniCursor),
            22 => Some(Self::AniIcon),
            23 => Some(Self::Html),
            24 => Some(Self::Manifest),
            _ => None,
        }
    }
}

/// Resource identifier - numeric ID or UTF-16 string name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceId {
    /// Numeric ID.
    Id(u16),
    /// String name.
    Name(String),
}

impl ResourceId {
    /// Interpret a level-1 ID as a standard resource type.
    pub fn as_resource_type(&self) -> Option<ResourceType> {
        match self {
            Self::Id(id) => ResourceType::from_u16(*id),
            Self::Name(_) => None,
        }
    }

    /// Numeric value, when this is an ID.
    pub fn id(&self) -> Option<u16> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }
}

/// IMAGE_RESOURCE_DIRECTORY - 16 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDirectoryHeader {
    /// Resource flags (reserved, usually 0).
    pub characteristics: u32,
    /// Time/date stamp.
    pub time_date_stamp: u32,
    /// Major version.
    pub major_version: u16,
    /// Minor version.
    pub minor_version: u16,
    /// Number of named entries.
    pub number_of_named_entries: u16,
    /// Number of ID entries.
    pub number_of_id_entries: u16,
}

impl ResourceDirectoryHeader {
    pub const SIZE: usize = 16;

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
            number_of_named_entries: u16::from_le_bytes([data[12], data[13]]),
            number_of_id_entries: u16::from_le_bytes([data[14], data[15]]),
        })
    }

    pub fn total_entries(&self) -> usize {
        self.number_of_named_entries as usize + self.number_of_id_entries as usize
    }
}

/// IMAGE_RESOURCE_DIRECTORY_ENTRY - 8 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDirectoryEntry {
    /// Name offset (high bit set) or ID.
    pub name_or_id: u32,
    /// Offset to data entry or subdirectory (high bit set = subdirectory).
    pub offset_to_data: u32,
}

impl ResourceDirectoryEntry {
    pub const SIZE: usize = 8;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            name_or_id: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            offset_to_data: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    /// Check if this entry has a string name (vs numeric ID).
    pub fn is_named(&self) -> bool {
        (self.name_or_id & 0x8000_0000) != 0
    }

    /// Root-relative offset of the name string (valid when named).
    pub fn name_offset(&self) -> u32 {
        self.name_or_id & 0x7FFF_FFFF
    }

    /// Numeric ID (valid when not named).
    pub fn id(&self) -> u16 {
        self.name_or_id as u16
    }

    /// Check if this points to a subdirectory (vs data entry).
    pub fn is_directory(&self) -> bool {
        (self.offset_to_data & 0x8000_0000) != 0
    }

    /// Root-relative offset of the subdirectory or data entry.
    pub fn data_offset(&self) -> u32 {
        self.offset_to_data & 0x7FFF_FFFF
    }
}

/// IMAGE_RESOURCE_DATA_ENTRY - 16 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDataEntry {
    /// RVA of the resource data (not root-relative).
    pub offset_to_data: u32,
    /// Size of the resource data.
    pub size: u32,
    /// Code page.
    pub code_page: u32,
    /// Reserved.
    pub reserved: u32,
}

impl ResourceDataEntry {
    pub const SIZE: usize = 16;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            offset_to_data: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            size: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            code_page: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            reserved: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        })
    }
}

/// One entry of a resource directory level.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Type/name/language identifier, depending on the level.
    pub id: ResourceId,
    /// The raw directory entry.
    pub raw: ResourceDirectoryEntry,
    /// What the entry points at.
    pub node: ResourceNode,
}

/// Target of a resource directory entry.
#[derive(Debug, Clone)]
pub enum ResourceNode {
    /// A sub-directory. Cycle-breaking emits an empty one.
    Directory(ResourceDirectory),
    /// A data leaf with the bytes it spans, when readable.
    Data {
        entry: ResourceDataEntry,
        data: Option<Vec<u8>>,
    },
}

/// One level of the resource tree.
#[derive(Debug, Clone, Default)]
pub struct ResourceDirectory {
    /// The level's directory header.
    pub header: ResourceDirectoryHeader,
    /// Entries of this level, truncated at the first unreadable one.
    pub entries: Vec<ResourceEntry>,
}

impl ResourceDirectory {
    /// Parse the three-level resource tree rooted at `root_rva`.
    pub fn parse<F>(root_rva: u32, read_at_rva: F) -> Option<Self>
    where
        F: Fn(u32, usize) -> Option<Vec<u8>>,
    {
        parse_level(root_rva, 0, 1, &read_at_rva)
    }

    /// Flatten the tree into one record per language-level data leaf.
    pub fn flatten(&self) -> Vec<FlatResource> {
        let mut flat = Vec::new();
        for type_entry in &self.entries {
            let ResourceNode::Directory(names) = &type_entry.node else {
                continue;
            };
            for name_entry in &names.entries {
                let ResourceNode::Directory(langs) = &name_entry.node else {
                    continue;
                };
                for lang_entry in &langs.entries {
                    let ResourceNode::Data { entry, data } = &lang_entry.node else {
                        continue;
                    };
                    flat.push(FlatResource {
                        type_id: type_entry.id.clone(),
                        name_id: name_entry.id.clone(),
                        lang_id: lang_entry.id.clone(),
                        entry: *entry,
                        data: data.clone(),
                    });
                }
            }
        }
        flat
    }
}

/// A flattened resource leaf: one record per (type, name, language).
#[derive(Debug, Clone)]
pub struct FlatResource {
    /// Level-1 identifier.
    pub type_id: ResourceId,
    /// Level-2 identifier.
    pub name_id: ResourceId,
    /// Level-3 identifier.
    pub lang_id: ResourceId,
    /// The raw data entry (RVA, size, code page).
    pub entry: ResourceDataEntry,
    /// The spanned bytes, when readable.
    pub data: Option<Vec<u8>>,
}

fn parse_level<F>(root_rva: u32, dir_offset: u32, level: u8, read_at_rva: &F) -> Option<ResourceDirectory>
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let dir_rva = root_rva.checked_add(dir_offset)?;
    let header = ResourceDirectoryHeader::parse(
        &read_at_rva(dir_rva, ResourceDirectoryHeader::SIZE)?,
    )
    .ok()?;

    let mut entries = Vec::new();
    for index in 0..header.total_entries() {
        let entry_rva = dir_rva
            .checked_add(ResourceDirectoryHeader::SIZE as u32)?
            .checked_add((index as u32).checked_mul(ResourceDirectoryEntry::SIZE as u32)?)?;
        let Some(raw) = read_at_rva(entry_rva, ResourceDirectoryEntry::SIZE)
            .and_then(|data| ResourceDirectoryEntry::parse(&data).ok())
        else {
            break;
        };

        let id = if raw.is_named() {
            ResourceId::Name(read_resource_name(root_rva, raw.name_offset(), read_at_rva))
        } else {
            ResourceId::Id(raw.id())
        };

        let node = if raw.is_directory() {
            let sub_offset = raw.data_offset();
            // A sub-directory offset equal to the root or the current level
            // would recurse forever; emit it as an empty directory.
            if sub_offset == 0 || sub_offset == dir_offset || level >= RESOURCE_LEVELS {
                ResourceNode::Directory(ResourceDirectory::default())
            } else {
                match parse_level(root_rva, sub_offset, level + 1, read_at_rva) {
                    Some(dir) => ResourceNode::Directory(dir),
                    None => ResourceNode::Directory(ResourceDirectory::default()),
                }
            }
        } else {
            let data_rva = root_rva.checked_add(raw.data_offset())?;
            match read_at_rva(data_rva, ResourceDataEntry::SIZE)
                .and_then(|data| ResourceDataEntry::parse(&data).ok())
            {
                Some(entry) => {
                    let data = read_at_rva(entry.offset_to_data, entry.size as usize);
                    ResourceNode::Data { entry, data }
                }
                None => break,
            }
        };

        entries.push(ResourceEntry { id, raw, node });
    }

    Some(ResourceDirectory { header, entries })
}

/// Length-prefixed UTF-16 name at a root-relative offset, capped at
/// `MAX_PATH` code units. Unreadable names decode to the empty string.
fn read_resource_name<F>(root_rva: u32, name_offset: u32, read_at_rva: &F) -> String
where
    F: Fn(u32, usize) -> Option<Vec<u8>>,
{
    let Some(name_rva) = root_rva.checked_add(name_offset) else {
        return String::new();
    };
    let Some(len_data) = read_at_rva(name_rva, 2).filter(|d| d.len() == 2) else {
        return String::new();
    };
    let units = (u16::from_le_bytes([len_data[0], len_data[1]]) as usize).min(MAX_PATH);
    let Some(raw) = name_rva
        .checked_add(2)
        .and_then(|rva| read_at_rva(rva, units * 2))
    else {
        return String::new();
    };
    let words: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

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

    fn dir_header(named: u16, ids: u16) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[12..14].copy_from_slice(&named.to_le_bytes());
        data[14..16].copy_from_slice(&ids.to_le_bytes());
        data
    }

    fn dir_entry(name_or_id: u32, offset: u32) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&name_or_id.to_le_bytes());
        data[4..8].copy_from_slice(&offset.to_le_bytes());
        data
    }

    fn data_entry(rva: u32, size: u32, code_page: u32) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&rva.to_le_bytes());
        data[4..8].copy_from_slice(&size.to_le_bytes());
        data[8..12].copy_from_slice(&code_page.to_le_bytes());
        data
    }

    /// Manifest resource: type 24 -> name 1 -> language 0x0409 -> bytes.
    fn manifest_tree(root: u32) -> RvaSpace {
        let mut space = RvaSpace::new();
        let mut blob = Vec::new();
        blob.extend_from_slice(&dir_header(0, 1)); // level 1 @ 0x00
        blob.extend_from_slice(&dir_entry(24, 0x8000_0020));
        blob.resize(0x20, 0);
        blob.extend_from_slice(&dir_header(0, 1)); // level 2 @ 0x20
        blob.extend_from_slice(&dir_entry(1, 0x8000_0040));
        blob.resize(0x40, 0);
        blob.extend_from_slice(&dir_header(0, 1)); // level 3 @ 0x40
        blob.extend_from_slice(&dir_entry(0x0409, 0x60));
        blob.resize(0x60, 0);
        blob.extend_from_slice(&data_entry(root + 0x100, 14, 1252)); // leaf @ 0x60
        blob.resize(0x100, 0);
        blob.extend_from_slice(b"<?xml version(padding)");
        space.put(root, blob);
        space
    }

    #[test]
    fn test_struct_sizes() {
        assert_eq!(ResourceDirectoryHeader::SIZE, 16);
        assert_eq!(ResourceDirectoryEntry::SIZE, 8);
        assert_eq!(ResourceDataEntry::SIZE, 16);
    }

    #[test]
    fn test_entry_discriminators() {
        let entry = ResourceDirectoryEntry {
            name_or_id: 0x8000_0010,
            offset_to_data: 0x8000_0040,
        };
        assert!(entry.is_named());
        assert_eq!(entry.name_offset(), 0x10);
        assert!(entry.is_directory());
        assert_eq!(entry.data_offset(), 0x40);

        let plain = ResourceDirectoryEntry {
            name_or_id: 24,
            offset_to_data: 0x60,
        };
        assert!(!plain.is_named());
        assert_eq!(plain.id(), 24);
        assert!(!plain.is_directory());
    }

    #[test]
    fn test_three_level_tree() {
        let space = manifest_tree(0x3000);
        let tree = ResourceDirectory::parse(0x3000, space.reader()).unwrap();
        assert_eq!(tree.entries.len(), 1);
        assert_eq!(tree.entries[0].id, ResourceId::Id(24));

        let flat = tree.flatten();
        assert_eq!(flat.len(), 1);
        let record = &flat[0];
        assert_eq!(record.type_id, ResourceId::Id(24));
        assert_eq!(record.type_id.as_resource_type(), Some(ResourceType::Manifest));
        assert_eq!(record.name_id, ResourceId::Id(1));
        assert_eq!(record.lang_id, ResourceId::Id(0x0409));
        assert_eq!(record.entry.code_page, 1252);
        assert_eq!(record.data.as_deref(), Some(&b"<?xml version("[..]));
    }

    #[test]
    fn test_root_referencing_offset_is_cycle_broken() {
        let mut space = RvaSpace::new();
        let mut blob = Vec::new();
        blob.extend_from_slice(&dir_header(0, 1));
        // Sub-directory offset 0: points back at the root.
        blob.extend_from_slice(&dir_entry(24, 0x8000_0000));
        space.put(0x3000, blob);

        let tree = ResourceDirectory::parse(0x3000, space.reader()).unwrap();
        assert_eq!(tree.entries.len(), 1);
        match &tree.entries[0].node {
            ResourceNode::Directory(dir) => assert!(dir.entries.is_empty()),
            other => panic!("expected empty directory, got {:?}", other),
        }
    }

    #[test]
    fn test_self_referencing_subdirectory_is_cycle_broken() {
        let mut space = RvaSpace::new();
        let mut blob = Vec::new();
        blob.extend_from_slice(&dir_header(0, 1)); // level 1 @ 0
        blob.extend_from_slice(&dir_entry(24, 0x8000_0020));
        blob.resize(0x20, 0);
        blob.extend_from_slice(&dir_header(0, 1)); // level 2 @ 0x20
        blob.extend_from_slice(&dir_entry(1, 0x8000_0020)); // points at itself
        space.put(0x3000, blob);

        let tree = ResourceDirectory::parse(0x3000, space.reader()).unwrap();
        let ResourceNode::Directory(level2) = &tree.entries[0].node else {
            panic!("expected directory");
        };
        match &level2.entries[0].node {
            ResourceNode::Directory(dir) => assert!(dir.entries.is_empty()),
            other => panic!("expected empty directory, got {:?}", other),
        }
    }

    #[test]
    fn test_named_entry() {
        let mut space = RvaSpace::new();
        let mut blob = Vec::new();
        blob.extend_from_slice(&dir_header(1, 0));
        blob.extend_from_slice(&dir_entry(0x8000_0020, 0x40)); // named, data leaf
        blob.resize(0x20, 0);
        // Length-prefixed UTF-16 name "APP".
        blob.extend_from_slice(&3u16.to_le_bytes());
        for ch in [b'A', b'P', b'P'] {
            blob.extend_from_slice(&(ch as u16).to_le_bytes());
        }
        blob.resize(0x40, 0);
        blob.extend_from_slice(&data_entry(0, 0, 0));
        space.put(0x3000, blob);

        let tree = ResourceDirectory::parse(0x3000, space.reader()).unwrap();
        assert_eq!(tree.entries[0].id, ResourceId::Name("APP".into()));
    }

    #[test]
    fn test_unreadable_root() {
        let space = RvaSpace::new();
        assert!(ResourceDirectory::parse(0x3000, space.reader()).is_none());
    }
}
