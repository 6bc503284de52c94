//! NVS partition image format.
//!
//! An NVS partition is a sequence of 4096 byte flash pages. Each page holds
//! a 32 byte header, a 32 byte entry-state bitmap and 126 entries of 32
//! bytes. Items occupy one entry (integers, namespace definitions) or span
//! several (strings and blobs, whose payload follows the item header).
//!
//! - [`PartitionWriter`] builds an image the way ESP-IDF's
//!   `nvs_partition_gen` lays it out.
//! - [`read_partition`] walks an image back into items, verifying every CRC.

pub mod crc;
pub mod entry;
pub mod page;
pub mod reader;
pub mod writer;

pub use entry::{Entry, ItemType};
pub use page::{Page, PageState};
pub use reader::{read_partition, Item, PageInfo, Partition};
pub use writer::PartitionWriter;

/// Flash page size.
pub const PAGE_SIZE: usize = 4096;

/// Size of a single entry slot.
pub const ENTRY_SIZE: usize = 32;

/// Entry slots per page.
pub const ENTRIES_PER_PAGE: usize = 126;

/// Smallest partition the generator accepts (two data pages plus the
/// reserved page).
pub const MIN_PARTITION_SIZE: usize = 0x3000;

/// Longest key or namespace name, in bytes.
pub const MAX_KEY_LEN: usize = 15;

/// Largest string (including its terminator) in a version 2 partition.
pub const MAX_STRING_SIZE_V2: usize = 4000;

/// Largest string or blob in a version 1 partition.
pub const MAX_BLOB_SIZE_V1: usize = 1984;

/// Namespace indices run from 1 to this value; 0 holds namespace definitions.
pub const MAX_NAMESPACES: usize = 254;

/// NVS format version, stored in every page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    /// Multipage blobs not supported.
    V1,
    /// Blobs split into chunks with an index entry.
    #[default]
    V2,
}

impl Version {
    /// Header byte for this version.
    pub fn to_byte(self) -> u8 {
        match self {
            Version::V1 => 0xFF,
            Version::V2 => 0xFE,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xFF => Some(Version::V1),
            0xFE => Some(Version::V2),
            _ => None,
        }
    }

    /// Version from its number, `1` or `2`.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Version::V1),
            2 => Some(Version::V2),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Version::V1 => 1,
            Version::V2 => 2,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Validate a key or namespace name.
pub fn check_key(key: &str) -> Result<(), crate::NvsError> {
    if key.is_empty() {
        return Err(crate::NvsError::EmptyKey);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(crate::NvsError::KeyTooLong(key.to_string()));
    }
    Ok(())
}
