//! NVS flash pages.

use super::crc;
use super::entry::Entry;
use super::{Version, ENTRIES_PER_PAGE, ENTRY_SIZE, PAGE_SIZE};

const HEADER_SIZE: usize = 32;
const BITMAP_OFFSET: usize = 32;
const BITMAP_SIZE: usize = 32;
pub(crate) const FIRST_ENTRY_OFFSET: usize = BITMAP_OFFSET + BITMAP_SIZE;

/// Page state word at offset 0.
///
/// Flash bits only go from 1 to 0, so each state clears more bits than the
/// one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Uninitialized,
    Active,
    Full,
    Freeing,
    Corrupt,
    Invalid(u32),
}

impl PageState {
    pub fn from_word(word: u32) -> Self {
        match word {
            0xffff_ffff => PageState::Uninitialized,
            0xffff_fffe => PageState::Active,
            0xffff_fffc => PageState::Full,
            0xffff_fff8 => PageState::Freeing,
            0xffff_fff0 => PageState::Corrupt,
            other => PageState::Invalid(other),
        }
    }

    pub fn to_word(self) -> u32 {
        match self {
            PageState::Uninitialized => 0xffff_ffff,
            PageState::Active => 0xffff_fffe,
            PageState::Full => 0xffff_fffc,
            PageState::Freeing => 0xffff_fff8,
            PageState::Corrupt => 0xffff_fff0,
            PageState::Invalid(word) => word,
        }
    }
}

/// State of one entry slot, two bits in the page bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Empty,
    Written,
    Erased,
    Illegal,
}

/// An in-memory page being filled by the writer.
#[derive(Clone)]
pub struct Page {
    buf: Vec<u8>,
    used: usize,
}

impl Page {
    /// Fresh active page with sequence number `seq`.
    pub fn new(seq: u32, version: Version) -> Self {
        let mut buf = vec![0xffu8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&PageState::Active.to_word().to_le_bytes());
        buf[4..8].copy_from_slice(&seq.to_le_bytes());
        buf[8] = version.to_byte();
        let crc = crc::header_crc(&buf[..HEADER_SIZE]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        Self { buf, used: 0 }
    }

    /// The reserved last page: fully erased, no header.
    pub fn reserved() -> Self {
        Self {
            buf: vec![0xffu8; PAGE_SIZE],
            used: ENTRIES_PER_PAGE,
        }
    }

    /// Entry slots already written.
    pub fn used_entries(&self) -> usize {
        self.used
    }

    pub fn free_entries(&self) -> usize {
        ENTRIES_PER_PAGE - self.used
    }

    /// Bytes a variable-length item can still store here, after its header.
    pub fn tailroom(&self) -> usize {
        self.free_entries().saturating_sub(1) * ENTRY_SIZE
    }

    pub fn state(&self) -> PageState {
        PageState::from_word(u32::from_le_bytes([
            self.buf[0],
            self.buf[1],
            self.buf[2],
            self.buf[3],
        ]))
    }

    pub fn push_entry(&mut self, entry: &Entry) {
        debug_assert!(self.free_entries() > 0, "page overflow");
        let offset = self.next_offset();
        self.buf[offset..offset + ENTRY_SIZE].copy_from_slice(&entry.encode());
        self.mark_written();
    }

    /// Write raw payload bytes into the following slots.
    ///
    /// Slack in the last slot stays erased.
    pub fn push_data(&mut self, data: &[u8]) {
        let slots = data.len().div_ceil(ENTRY_SIZE);
        debug_assert!(slots <= self.free_entries(), "page overflow");
        let offset = self.next_offset();
        self.buf[offset..offset + data.len()].copy_from_slice(data);
        for _ in 0..slots {
            self.mark_written();
        }
    }

    /// Mark an active page full. Other states are left alone.
    pub fn mark_full(&mut self) {
        if self.state() == PageState::Active {
            self.buf[0..4].copy_from_slice(&PageState::Full.to_word().to_le_bytes());
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn next_offset(&self) -> usize {
        FIRST_ENTRY_OFFSET + self.used * ENTRY_SIZE
    }

    fn mark_written(&mut self) {
        let bit = self.used * 2;
        self.buf[BITMAP_OFFSET + bit / 8] &= !(1u8 << (bit % 8));
        self.used += 1;
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("state", &self.state())
            .field("used", &self.used)
            .finish()
    }
}

/// State of slot `index` according to a page's bitmap.
pub fn entry_state(page: &[u8], index: usize) -> EntryState {
    let bit = index * 2;
    let byte = page[BITMAP_OFFSET + bit / 8];
    match (byte >> (bit % 8)) & 0b11 {
        0b11 => EntryState::Empty,
        0b10 => EntryState::Written,
        0b00 => EntryState::Erased,
        _ => EntryState::Illegal,
    }
}
