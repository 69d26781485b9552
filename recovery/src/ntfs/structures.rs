// NTFS on-disk constants and attribute type codes

use std::fmt;

// Signatures as read little-endian from the first four bytes of a sector
pub const MFT_RECORD_MAGIC: u32 = 0x454C_4946; // "FILE"
pub const BOOT_SECTOR_MAGIC: u32 = 0x4E90_52EB; // jmp 0x52; nop; 'N'

pub const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";
pub const NTFS_OEM_ID_OFFSET: u64 = 0x03;

// Boot sector field offsets
pub const BOOT_BYTES_PER_SECTOR: u64 = 0x0B;
pub const BOOT_TOTAL_SECTORS: u64 = 0x28;

/// Sector unit used for boot sector distances and scan alignment
pub const SECTOR_SIZE: u64 = 0x200;

// Attribute layout
pub const ATTR_TYPE_END: u32 = 0xFFFF_FFFF;
pub const RESIDENT_DATA_BASE: u32 = 0x18;
pub const NON_RESIDENT_DATA_BASE: u32 = 0x40;
/// Largest attribute payload accepted after the fixed header region
pub const MAX_ATTRIBUTE_PAYLOAD: u32 = 512;

// $FILE_NAME value layout
pub const FILE_NAME_LENGTH_OFFSET: usize = 0x40;
pub const FILE_NAME_NAMESPACE_OFFSET: usize = 0x41;
pub const FILE_NAME_OFFSET: usize = 0x42;

// File name namespaces
pub const FILE_NAME_POSIX: u8 = 0x00;
pub const FILE_NAME_WIN32: u8 = 0x01;
pub const FILE_NAME_DOS: u8 = 0x02;
pub const FILE_NAME_WIN32_AND_DOS: u8 = 0x03;

// System file names used as geometry evidence
pub const MFT_FILE_NAME: &str = "$MFT";
pub const MFT_MIRROR_FILE_NAME: &str = "$MFTMirr";

/// Placeholder key for records without any $FILE_NAME attribute
pub const UNNAMED_RECORD: &str = " ";

pub const FIRST_USER_DEFINED_ATTRIBUTE: u32 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    StandardInformation,
    AttributeList,
    FileName,
    ObjectId,
    SecurityDescriptor,
    VolumeName,
    VolumeInformation,
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    PropertySet,
    LoggedUtilityStream,
    /// Any other code, including user-defined types at or beyond 0x1000
    Other(u32),
}

const KNOWN_TYPES: [(u32, AttributeType, &str); 16] = [
    (0x10, AttributeType::StandardInformation, "STANDARD_INFORMATION"),
    (0x20, AttributeType::AttributeList, "ATTRIBUTE_LIST"),
    (0x30, AttributeType::FileName, "FILE_NAME"),
    (0x40, AttributeType::ObjectId, "OBJECT_ID"),
    (0x50, AttributeType::SecurityDescriptor, "SECURITY_DESCRIPTOR"),
    (0x60, AttributeType::VolumeName, "VOLUME_NAME"),
    (0x70, AttributeType::VolumeInformation, "VOLUME_INFORMATION"),
    (0x80, AttributeType::Data, "DATA"),
    (0x90, AttributeType::IndexRoot, "INDEX_ROOT"),
    (0xA0, AttributeType::IndexAllocation, "INDEX_ALLOCATION"),
    (0xB0, AttributeType::Bitmap, "BITMAP"),
    (0xC0, AttributeType::ReparsePoint, "REPARSE_POINT"),
    (0xD0, AttributeType::EaInformation, "EA_INFORMATION"),
    (0xE0, AttributeType::Ea, "EA"),
    (0xF0, AttributeType::PropertySet, "PROPERTY_SET"),
    (0x100, AttributeType::LoggedUtilityStream, "LOGGED_UTILITY_STREAM"),
];

impl AttributeType {
    pub fn from_code(code: u32) -> Self {
        KNOWN_TYPES
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, t, _)| *t)
            .unwrap_or(AttributeType::Other(code))
    }

    pub fn code(&self) -> u32 {
        match self {
            AttributeType::Other(code) => *code,
            known => KNOWN_TYPES
                .iter()
                .find(|(_, t, _)| t == known)
                .map(|(c, _, _)| *c)
                .unwrap_or_default(),
        }
    }

    pub fn is_user_defined(&self) -> bool {
        self.code() >= FIRST_USER_DEFINED_ATTRIBUTE
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match KNOWN_TYPES.iter().find(|(_, t, _)| t == self) {
            Some((_, _, name)) => f.write_str(name),
            None => write!(f, "{:04x}", self.code()),
        }
    }
}
