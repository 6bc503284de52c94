//! 32 byte NVS entries.
//!
//! ```text
//! +----+------+------+-------+--------+----------+---------+
//! | ns | type | span | chunk | crc32  | key[16]  | data[8] |
//! +----+------+------+-------+--------+----------+---------+
//!   0     1      2      3      4..8     8..24      24..32
//! ```

use super::crc;
use super::ENTRY_SIZE;

/// Item type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ItemType {
    U8 = 0x01,
    I8 = 0x11,
    U16 = 0x02,
    I16 = 0x12,
    U32 = 0x04,
    I32 = 0x14,
    U64 = 0x08,
    I64 = 0x18,
    /// NUL-terminated string.
    Sz = 0x21,
    /// Single-page blob (version 1 layout).
    Blob = 0x41,
    /// One chunk of a multipage blob.
    BlobData = 0x42,
    /// Index entry closing a multipage blob.
    BlobIndex = 0x48,
    Any = 0xff,
}

impl ItemType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => ItemType::U8,
            0x11 => ItemType::I8,
            0x02 => ItemType::U16,
            0x12 => ItemType::I16,
            0x04 => ItemType::U32,
            0x14 => ItemType::I32,
            0x08 => ItemType::U64,
            0x18 => ItemType::I64,
            0x21 => ItemType::Sz,
            0x41 => ItemType::Blob,
            0x42 => ItemType::BlobData,
            0x48 => ItemType::BlobIndex,
            0xff => ItemType::Any,
            _ => return None,
        })
    }

    /// Width in bytes of an integer item, `None` for everything else.
    pub fn primitive_width(self) -> Option<usize> {
        match self {
            ItemType::U8 | ItemType::I8 => Some(1),
            ItemType::U16 | ItemType::I16 => Some(2),
            ItemType::U32 | ItemType::I32 => Some(4),
            ItemType::U64 | ItemType::I64 => Some(8),
            _ => None,
        }
    }

    /// Item types whose payload follows the header entry.
    pub fn is_variable_length(self) -> bool {
        matches!(self, ItemType::Sz | ItemType::Blob | ItemType::BlobData)
    }
}

/// Chunk index of every item that is not a blob chunk.
pub const CHUNK_ANY: u8 = 0xff;

/// A decoded entry slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub ns: u8,
    pub item_type: ItemType,
    pub span: u8,
    pub chunk_index: u8,
    pub crc: u32,
    pub key: [u8; 16],
    pub data: [u8; 8],
}

impl Entry {
    /// Header for an item named `key` in namespace `ns`.
    ///
    /// The data field starts erased (`0xFF`); callers fill it in.
    pub fn new(ns: u8, item_type: ItemType, span: u8, key: &str) -> Self {
        let mut key_bytes = [0u8; 16];
        let len = key.len().min(16);
        key_bytes[..len].copy_from_slice(&key.as_bytes()[..len]);
        Self {
            ns,
            item_type,
            span,
            chunk_index: CHUNK_ANY,
            crc: 0,
            key: key_bytes,
            data: [0xff; 8],
        }
    }

    /// Integer item. `bytes` is the little-endian value.
    pub fn primitive(ns: u8, item_type: ItemType, key: &str, bytes: &[u8]) -> Self {
        let mut entry = Self::new(ns, item_type, 1, key);
        entry.data[..bytes.len()].copy_from_slice(bytes);
        entry
    }

    /// Header of a string, v1 blob or blob chunk carrying `payload`.
    pub fn variable(ns: u8, item_type: ItemType, key: &str, payload: &[u8], chunk_index: u8) -> Self {
        let span = 1 + payload.len().div_ceil(ENTRY_SIZE);
        let mut entry = Self::new(ns, item_type, span as u8, key);
        entry.chunk_index = chunk_index;
        entry.data[0..2].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        entry.data[4..8].copy_from_slice(&crc::checksum(payload).to_le_bytes());
        entry
    }

    /// Index entry of a multipage blob.
    pub fn blob_index(ns: u8, key: &str, total_size: u32, chunk_count: u8, chunk_start: u8) -> Self {
        let mut entry = Self::new(ns, ItemType::BlobIndex, 1, key);
        entry.data[0..4].copy_from_slice(&total_size.to_le_bytes());
        entry.data[4] = chunk_count;
        entry.data[5] = chunk_start;
        entry
    }

    /// Serialize with a freshly computed CRC.
    pub fn encode(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[0] = self.ns;
        bytes[1] = self.item_type as u8;
        bytes[2] = self.span;
        bytes[3] = self.chunk_index;
        bytes[8..24].copy_from_slice(&self.key);
        bytes[24..32].copy_from_slice(&self.data);
        let crc = crc::entry_crc(&bytes);
        bytes[4..8].copy_from_slice(&crc.to_le_bytes());
        bytes
    }

    /// Parse a slot. Returns `None` for an unknown item type.
    pub fn decode(bytes: &[u8; 32]) -> Option<Self> {
        let item_type = ItemType::from_byte(bytes[1])?;
        let mut key = [0u8; 16];
        key.copy_from_slice(&bytes[8..24]);
        let mut data = [0u8; 8];
        data.copy_from_slice(&bytes[24..32]);
        Some(Self {
            ns: bytes[0],
            item_type,
            span: bytes[2],
            chunk_index: bytes[3],
            crc: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            key,
            data,
        })
    }

    /// Whether the stored CRC matches the entry contents.
    pub fn crc_valid(&self) -> bool {
        self.encode()[4..8] == self.crc.to_le_bytes()
    }

    /// Key up to the first NUL.
    pub fn key_str(&self) -> String {
        let end = self.key.iter().position(|&b| b == 0).unwrap_or(self.key.len());
        String::from_utf8_lossy(&self.key[..end]).into_owned()
    }

    /// Payload size of a variable-length item.
    pub fn payload_size(&self) -> usize {
        u16::from_le_bytes([self.data[0], self.data[1]]) as usize
    }

    /// Payload CRC of a variable-length item.
    pub fn payload_crc(&self) -> u32 {
        u32::from_le_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }
}
