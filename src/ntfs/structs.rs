//! NTFS on-disk structures and constants

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

// ============================================================================
// NTFS Constants
// ============================================================================

/// MFT record signature "FILE"
pub const MFT_RECORD_SIGNATURE: u32 = 0x454C4946; // "FILE" in little-endian

/// End of attributes marker
pub const ATTRIBUTE_END_MARKER: u32 = 0xFFFFFFFF;

/// Type code of the $FILE_NAME attribute
pub const FILE_NAME_ATTRIBUTE: u32 = 0x30;

/// Records below this index are NTFS system files ($MFT, $LogFile, ...)
pub const FIRST_USER_RECORD: u64 = 16;

/// Size of the fixed part of a record header
pub const MFT_RECORD_HEADER_SIZE: usize = 48;

/// Size of the common attribute header
pub const ATTRIBUTE_HEADER_SIZE: usize = 16;

/// Size of the resident attribute header (common part + value descriptor)
pub const RESIDENT_HEADER_SIZE: usize = 24;

/// Fixed part of a $FILE_NAME value before the name characters
pub const FILE_NAME_FIXED_SIZE: usize = 66;

// MFT Record Flags
pub const MFT_RECORD_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x0002;
pub const MFT_RECORD_IN_EXTEND: u16 = 0x0004;

// ============================================================================
// Filename Namespace
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilenameNamespace {
    Posix = 0,
    Win32 = 1,
    Dos = 2,
    Win32AndDos = 3,
}

impl FilenameNamespace {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Posix),
            1 => Some(Self::Win32),
            2 => Some(Self::Dos),
            3 => Some(Self::Win32AndDos),
            _ => None,
        }
    }

    /// The long Win32 name: set for `Win32` and `Win32AndDos`.
    ///
    /// A record carries at most one such name per link, so keeping only these
    /// avoids indexing the 8.3 alias next to the long name.
    pub fn is_win32_long(&self) -> bool {
        (*self as u8) & 0x01 != 0
    }
}

// ============================================================================
// NTFS Volume Data (from FSCTL_GET_NTFS_VOLUME_DATA)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NtfsVolumeData {
    pub total_clusters: u64,
    pub free_clusters: u64,
    pub bytes_per_sector: u32,
    pub bytes_per_cluster: u32,
    pub bytes_per_file_record_segment: u32,
    pub mft_valid_data_length: u64,
}

/// Size of NTFS_VOLUME_DATA_BUFFER
pub const NTFS_VOLUME_DATA_SIZE: usize = 0x60;

impl NtfsVolumeData {
    /// Parse from raw buffer (0x60 bytes from FSCTL_GET_NTFS_VOLUME_DATA)
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < NTFS_VOLUME_DATA_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);

        // serial number, sector count
        cursor.set_position(0x10);
        let total_clusters = cursor.read_u64::<LittleEndian>().ok()?;
        let free_clusters = cursor.read_u64::<LittleEndian>().ok()?;
        cursor.set_position(0x28);
        let bytes_per_sector = cursor.read_u32::<LittleEndian>().ok()?;
        let bytes_per_cluster = cursor.read_u32::<LittleEndian>().ok()?;
        let bytes_per_file_record_segment = cursor.read_u32::<LittleEndian>().ok()?;
        cursor.set_position(0x38);
        let mft_valid_data_length = cursor.read_u64::<LittleEndian>().ok()?;

        Some(Self {
            total_clusters,
            free_clusters,
            bytes_per_sector,
            bytes_per_cluster,
            bytes_per_file_record_segment,
            mft_valid_data_length,
        })
    }

    /// Number of record segments covered by the valid part of the MFT
    pub fn record_count(&self) -> u64 {
        if self.bytes_per_file_record_segment == 0 {
            return 0;
        }
        self.mft_valid_data_length / self.bytes_per_file_record_segment as u64
    }
}

// ============================================================================
// MFT Record Header
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MftRecordHeader {
    pub signature: u32,
    pub sequence_number: u16,
    pub first_attribute_offset: u16,
    pub flags: u16,
}

impl MftRecordHeader {
    /// Parse MFT record header from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < MFT_RECORD_HEADER_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);

        let signature = cursor.read_u32::<LittleEndian>().ok()?;
        // update sequence array, $LogFile sequence number
        cursor.set_position(16);
        let sequence_number = cursor.read_u16::<LittleEndian>().ok()?;
        let _hard_link_count = cursor.read_u16::<LittleEndian>().ok()?;
        let first_attribute_offset = cursor.read_u16::<LittleEndian>().ok()?;
        let flags = cursor.read_u16::<LittleEndian>().ok()?;

        Some(Self {
            signature,
            sequence_number,
            first_attribute_offset,
            flags,
        })
    }

    /// Check if this is a valid MFT record
    pub fn is_valid(&self) -> bool {
        self.signature == MFT_RECORD_SIGNATURE
    }

    /// Check if this record is in use
    pub fn is_in_use(&self) -> bool {
        (self.flags & MFT_RECORD_IN_USE) != 0
    }

    /// Check if this record represents a directory
    pub fn is_directory(&self) -> bool {
        (self.flags & MFT_RECORD_IS_DIRECTORY) != 0
    }

    /// Flag 0x0004 is not documented for user files; such records are skipped
    pub fn is_in_extend(&self) -> bool {
        (self.flags & MFT_RECORD_IN_EXTEND) != 0
    }

    /// A zero sequence number marks a stale, never-reused segment
    pub fn is_stale(&self) -> bool {
        self.sequence_number == 0
    }
}

// ============================================================================
// Attribute Header
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AttributeHeader {
    pub attribute_type: u32,
    pub length: u32,
    pub non_resident: bool,
}

#[derive(Debug, Clone)]
pub struct ResidentAttributeHeader {
    pub value_length: u32,
    pub value_offset: u16,
}

impl AttributeHeader {
    /// Parse attribute header from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ATTRIBUTE_HEADER_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);

        Some(Self {
            attribute_type: cursor.read_u32::<LittleEndian>().ok()?,
            length: cursor.read_u32::<LittleEndian>().ok()?,
            non_resident: cursor.read_u8().ok()? != 0,
        })
    }
}

impl ResidentAttributeHeader {
    /// Parse resident attribute header
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let base = AttributeHeader::from_bytes(data)?;
        if base.non_resident || data.len() < RESIDENT_HEADER_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(&data[ATTRIBUTE_HEADER_SIZE..]);

        Some(Self {
            value_length: cursor.read_u32::<LittleEndian>().ok()?,
            value_offset: cursor.read_u16::<LittleEndian>().ok()?,
        })
    }

    /// The attribute value, if it lies inside `attr_data`
    pub fn value<'a>(&self, attr_data: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.value_offset as usize;
        let end = start.checked_add(self.value_length as usize)?;
        attr_data.get(start..end)
    }
}

// ============================================================================
// File Name Attribute
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileNameAttribute {
    pub parent_reference: u64,
    pub namespace: FilenameNamespace,
    pub name: String,
}

impl FileNameAttribute {
    /// Parse from resident attribute content
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < FILE_NAME_FIXED_SIZE {
            return None;
        }

        let mut cursor = Cursor::new(data);

        let parent_reference = cursor.read_u64::<LittleEndian>().ok()?;
        // times, sizes, file attributes and reparse value
        cursor.set_position(64);
        let name_length = cursor.read_u8().ok()?;
        let namespace = FilenameNamespace::from_u8(cursor.read_u8().ok()?)?;

        // Read filename (UTF-16LE, explicit length)
        let name_bytes = name_length as usize * 2;
        let name_data = data.get(FILE_NAME_FIXED_SIZE..FILE_NAME_FIXED_SIZE + name_bytes)?;
        let mut name_u16 = vec![0u16; name_length as usize];
        LittleEndian::read_u16_into(name_data, &mut name_u16);
        let name = String::from_utf16_lossy(&name_u16);

        Some(Self {
            parent_reference,
            namespace,
            name,
        })
    }

    /// Parent segment number, low 32 bits only.
    ///
    /// The sequence bits and the high segment word are dropped, so a deleted
    /// and reused parent segment resolves to its new owner.
    pub fn parent_segment(&self) -> u64 {
        self.parent_reference & 0xFFFF_FFFF
    }
}
