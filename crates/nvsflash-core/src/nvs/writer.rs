//! Partition image writer.
//!
//! Lays items out the way ESP-IDF's `nvs_partition_gen` does, with two
//! exceptions. An item fits a page when `used + span <= 126`, the runtime's
//! rule, one slot more than the IDF tool allows. A blob chunk is never
//! started on a page with a single free slot, so no empty chunk is written.
//! Otherwise:
//!
//! - pages are filled in order, an item that does not fit moves to a fresh
//!   page;
//! - version 2 blobs are split into chunks that fill each page's tailroom,
//!   followed by an index entry;
//! - every data page ends up `Full` and the last page of the partition is
//!   left erased for the runtime's garbage collector.

use std::collections::HashSet;

use super::entry::{Entry, ItemType, CHUNK_ANY};
use super::page::Page;
use super::{
    check_key, Version, ENTRIES_PER_PAGE, ENTRY_SIZE, MAX_BLOB_SIZE_V1, MAX_NAMESPACES,
    MAX_STRING_SIZE_V2, MIN_PARTITION_SIZE, PAGE_SIZE,
};
use crate::error::NvsError;
use crate::value::NvsValue;

/// Chunk indices 0x80 and up belong to the runtime's second blob version.
const MAX_BLOB_CHUNKS: usize = 0x80;

/// Builds an NVS partition image.
///
/// ```
/// use nvsflash_core::{NvsValue, PartitionWriter, Version};
///
/// let mut writer = PartitionWriter::new(0x4000, Version::V2)?;
/// writer.namespace("bonicbot")?;
/// writer.write("device_id", &NvsValue::Str("BB-0001".into()))?;
/// let image = writer.finish();
/// assert_eq!(image.len(), 0x4000);
/// # Ok::<(), nvsflash_core::NvsError>(())
/// ```
#[derive(Debug)]
pub struct PartitionWriter {
    version: Version,
    size: usize,
    data_pages: usize,
    pages: Vec<Page>,
    namespaces: Vec<String>,
    current_ns: Option<u8>,
    keys: HashSet<(u8, String)>,
}

impl PartitionWriter {
    /// Start a partition of `size` bytes.
    pub fn new(size: usize, version: Version) -> Result<Self, NvsError> {
        if size % PAGE_SIZE != 0 {
            return Err(NvsError::SizeNotAligned(size));
        }
        if size < MIN_PARTITION_SIZE {
            return Err(NvsError::SizeTooSmall(size));
        }

        Ok(Self {
            version,
            size,
            data_pages: size / PAGE_SIZE - 1,
            pages: vec![Page::new(0, version)],
            namespaces: Vec::new(),
            current_ns: None,
            keys: HashSet::new(),
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Partition size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pages holding at least one entry so far.
    pub fn used_pages(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| page.used_entries() > 0)
            .count()
    }

    /// Open namespace `name`; following values are stored under it.
    pub fn namespace(&mut self, name: &str) -> Result<(), NvsError> {
        check_key(name)?;
        if self.namespaces.iter().any(|existing| existing == name) {
            return Err(NvsError::DuplicateNamespace(name.to_string()));
        }
        if self.namespaces.len() >= MAX_NAMESPACES {
            return Err(NvsError::TooManyNamespaces);
        }

        let index = (self.namespaces.len() + 1) as u8;
        self.reserve(1)?;
        self.page()
            .push_entry(&Entry::primitive(0, ItemType::U8, name, &[index]));
        self.namespaces.push(name.to_string());
        self.current_ns = Some(index);
        Ok(())
    }

    /// Store `value` under `key` in the current namespace.
    pub fn write(&mut self, key: &str, value: &NvsValue) -> Result<(), NvsError> {
        let ns = self
            .current_ns
            .ok_or_else(|| NvsError::NoNamespace(key.to_string()))?;
        check_key(key)?;
        if self.keys.contains(&(ns, key.to_string())) {
            return Err(NvsError::DuplicateKey {
                namespace: self.namespaces[ns as usize - 1].clone(),
                key: key.to_string(),
            });
        }

        match value {
            NvsValue::Str(text) => {
                let mut payload = Vec::with_capacity(text.len() + 1);
                payload.extend_from_slice(text.as_bytes());
                payload.push(0);
                let max = match self.version {
                    Version::V1 => MAX_BLOB_SIZE_V1,
                    Version::V2 => MAX_STRING_SIZE_V2,
                };
                check_len(key, payload.len(), max)?;
                self.write_single(ns, ItemType::Sz, key, &payload)?;
            }
            NvsValue::Blob(data) => match self.version {
                Version::V1 => {
                    check_len(key, data.len(), MAX_BLOB_SIZE_V1)?;
                    self.write_single(ns, ItemType::Blob, key, data)?;
                }
                Version::V2 => self.write_chunked(ns, key, data)?,
            },
            primitive => {
                let (item_type, bytes) = primitive
                    .primitive_bytes()
                    .ok_or_else(|| NvsError::UnsupportedEncoding(key.to_string()))?;
                self.reserve(1)?;
                self.page()
                    .push_entry(&Entry::primitive(ns, item_type, key, &bytes));
            }
        }

        self.keys.insert((ns, key.to_string()));
        Ok(())
    }

    /// Close the image: pad with empty pages, mark them full and append the
    /// reserved page.
    pub fn finish(mut self) -> Vec<u8> {
        while self.pages.len() < self.data_pages {
            self.push_page();
        }
        if let Some(last) = self.pages.last_mut() {
            last.mark_full();
        }
        self.pages.push(Page::reserved());

        let mut image = Vec::with_capacity(self.size);
        for page in self.pages {
            image.extend_from_slice(page.as_bytes());
        }
        image
    }

    /// Header plus payload on a single page.
    fn write_single(
        &mut self,
        ns: u8,
        item_type: ItemType,
        key: &str,
        payload: &[u8],
    ) -> Result<(), NvsError> {
        let span = 1 + payload.len().div_ceil(ENTRY_SIZE);
        if span > ENTRIES_PER_PAGE {
            return Err(NvsError::ValueTooLarge {
                key: key.to_string(),
                len: payload.len(),
                max: (ENTRIES_PER_PAGE - 1) * ENTRY_SIZE,
            });
        }

        self.reserve(span)?;
        let page = self.page();
        page.push_entry(&Entry::variable(ns, item_type, key, payload, CHUNK_ANY));
        page.push_data(payload);
        Ok(())
    }

    /// Version 2 blob: chunks filling each page's tailroom, then the index.
    fn write_chunked(&mut self, ns: u8, key: &str, data: &[u8]) -> Result<(), NvsError> {
        let too_large = || NvsError::ValueTooLarge {
            key: key.to_string(),
            len: data.len(),
            max: u32::MAX as usize,
        };
        let total = u32::try_from(data.len()).map_err(|_| too_large())?;

        let mut offset = 0;
        let mut chunks = 0usize;
        loop {
            if self.page().free_entries() <= 1 {
                self.new_page()?;
            }
            if chunks >= MAX_BLOB_CHUNKS {
                return Err(too_large());
            }

            let tailroom = self.page().tailroom();
            let len = tailroom.min(data.len() - offset);
            let chunk = &data[offset..offset + len];

            let page = self.page();
            page.push_entry(&Entry::variable(ns, ItemType::BlobData, key, chunk, chunks as u8));
            page.push_data(chunk);
            chunks += 1;
            offset += len;

            let remaining = data.len() - offset;
            if remaining > 0 || tailroom - len < ENTRY_SIZE {
                self.new_page()?;
            }
            if remaining == 0 {
                self.page()
                    .push_entry(&Entry::blob_index(ns, key, total, chunks as u8, 0));
                return Ok(());
            }
        }
    }

    /// Make sure `entries` slots are free, moving to a new page if not.
    fn reserve(&mut self, entries: usize) -> Result<(), NvsError> {
        if self.page().free_entries() < entries {
            self.new_page()?;
        }
        Ok(())
    }

    fn new_page(&mut self) -> Result<(), NvsError> {
        if self.pages.len() >= self.data_pages {
            return Err(NvsError::InsufficientSize);
        }
        self.push_page();
        Ok(())
    }

    fn push_page(&mut self) {
        if let Some(last) = self.pages.last_mut() {
            last.mark_full();
        }
        let seq = self.pages.len() as u32;
        self.pages.push(Page::new(seq, self.version));
    }

    fn page(&mut self) -> &mut Page {
        // `pages` starts with one page and never shrinks.
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }
}

fn check_len(key: &str, len: usize, max: usize) -> Result<(), NvsError> {
    if len > max {
        return Err(NvsError::ValueTooLarge {
            key: key.to_string(),
            len,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvs::page::PageState;

    fn page_state(image: &[u8], index: usize) -> PageState {
        let offset = index * PAGE_SIZE;
        PageState::from_word(u32::from_le_bytes([
            image[offset],
            image[offset + 1],
            image[offset + 2],
            image[offset + 3],
        ]))
    }

    #[test]
    fn test_size_validation() {
        assert!(matches!(
            PartitionWriter::new(0x4001, Version::V2),
            Err(NvsError::SizeNotAligned(0x4001))
        ));
        assert!(matches!(
            PartitionWriter::new(0x2000, Version::V2),
            Err(NvsError::SizeTooSmall(0x2000))
        ));
        assert!(PartitionWriter::new(0x3000, Version::V2).is_ok());
    }

    #[test]
    fn test_value_requires_namespace() {
        let mut writer = PartitionWriter::new(0x3000, Version::V2).unwrap();
        let err = writer.write("key", &NvsValue::U8(1)).unwrap_err();
        assert!(matches!(err, NvsError::NoNamespace(_)));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut writer = PartitionWriter::new(0x3000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        writer.write("count", &NvsValue::U32(1)).unwrap();

        let err = writer.write("count", &NvsValue::U32(2)).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate key `count` in namespace `app`");

        // Same key in another namespace is fine.
        writer.namespace("other").unwrap();
        writer.write("count", &NvsValue::U32(2)).unwrap();
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let mut writer = PartitionWriter::new(0x3000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        assert!(matches!(
            writer.namespace("app"),
            Err(NvsError::DuplicateNamespace(_))
        ));
    }

    #[test]
    fn test_key_length_limit() {
        let mut writer = PartitionWriter::new(0x3000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        writer.write("fifteen_chars__", &NvsValue::U8(1)).unwrap();
        let err = writer.write("sixteen_chars___", &NvsValue::U8(1)).unwrap_err();
        assert!(matches!(err, NvsError::KeyTooLong(_)));
    }

    #[test]
    fn test_primitives_roll_over_to_next_page() {
        let mut writer = PartitionWriter::new(0x4000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        for i in 0..125 {
            writer.write(&format!("k{i}"), &NvsValue::U8(i as u8)).unwrap();
        }
        assert_eq!(writer.pages.len(), 1);
        assert_eq!(writer.pages[0].free_entries(), 0);

        writer.write("k125", &NvsValue::U8(0)).unwrap();
        assert_eq!(writer.pages.len(), 2);
        assert_eq!(writer.pages[1].used_entries(), 1);
    }

    #[test]
    fn test_string_limits() {
        let mut writer = PartitionWriter::new(0x3000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        writer.write("max", &NvsValue::Str("x".repeat(3999))).unwrap();
        let err = writer
            .write("over", &NvsValue::Str("x".repeat(4000)))
            .unwrap_err();
        assert!(matches!(err, NvsError::ValueTooLarge { len: 4001, max: 4000, .. }));

        let mut v1 = PartitionWriter::new(0x3000, Version::V1).unwrap();
        v1.namespace("app").unwrap();
        let err = v1.write("s", &NvsValue::Str("x".repeat(1984))).unwrap_err();
        assert!(matches!(err, NvsError::ValueTooLarge { max: 1984, .. }));
    }

    #[test]
    fn test_v1_blob_limit() {
        let mut writer = PartitionWriter::new(0x3000, Version::V1).unwrap();
        writer.namespace("app").unwrap();
        writer.write("ok", &NvsValue::Blob(vec![0; 1984])).unwrap();
        assert!(writer.write("big", &NvsValue::Blob(vec![0; 1985])).is_err());
    }

    #[test]
    fn test_insufficient_size() {
        let mut writer = PartitionWriter::new(0x3000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        writer.write("a", &NvsValue::Blob(vec![1; 4000])).unwrap();
        let err = writer.write("b", &NvsValue::Blob(vec![2; 4000])).unwrap_err();
        assert!(matches!(err, NvsError::InsufficientSize));
    }

    #[test]
    fn test_finish_layout() {
        let mut writer = PartitionWriter::new(0x5000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        writer.write("on", &NvsValue::U8(1)).unwrap();
        assert_eq!(writer.used_pages(), 1);

        let image = writer.finish();
        assert_eq!(image.len(), 0x5000);
        for index in 0..4 {
            assert_eq!(page_state(&image, index), PageState::Full);
            let seq = &image[index * PAGE_SIZE + 4..index * PAGE_SIZE + 8];
            assert_eq!(seq, &(index as u32).to_le_bytes());
        }
        assert!(image[4 * PAGE_SIZE..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_string_moves_to_fresh_page() {
        let mut writer = PartitionWriter::new(0x4000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        for i in 0..120 {
            writer.write(&format!("k{i}"), &NvsValue::U8(0)).unwrap();
        }
        // 121 slots used: a 3 slot string still fits, leaving 2 for a 5 slot one.
        writer.write("short", &NvsValue::Str("a".repeat(60))).unwrap();
        assert_eq!(writer.pages.len(), 1);
        writer.write("long", &NvsValue::Str("b".repeat(100))).unwrap();
        assert_eq!(writer.pages.len(), 2);
        assert_eq!(writer.pages[1].used_entries(), 5);
    }

    #[test]
    fn test_string_fills_page_exactly() {
        let mut writer = PartitionWriter::new(0x4000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        for i in 0..122 {
            writer.write(&format!("k{i}"), &NvsValue::U8(0)).unwrap();
        }
        // 63 chars plus NUL is 64 bytes: a 3 slot item into the last 3 slots.
        writer.write("last", &NvsValue::Str("a".repeat(63))).unwrap();
        assert_eq!(writer.pages.len(), 1);
        assert_eq!(writer.pages[0].used_entries(), 126);
        assert_eq!(writer.pages[0].free_entries(), 0);
    }

    #[test]
    fn test_blob_skips_page_with_one_free_slot() {
        let mut writer = PartitionWriter::new(0x4000, Version::V2).unwrap();
        writer.namespace("app").unwrap();
        for i in 0..124 {
            writer.write(&format!("k{i}"), &NvsValue::U8(0)).unwrap();
        }
        let blob = vec![0x5a; 10];
        writer.write("blob", &NvsValue::Blob(blob.clone())).unwrap();

        // One chunk (2 slots) and its index on the next page.
        assert_eq!(writer.pages.len(), 2);
        assert_eq!(writer.pages[0].used_entries(), 125);
        assert_eq!(writer.pages[1].used_entries(), 3);

        let partition = crate::nvs::read_partition(&writer.finish()).unwrap();
        assert_eq!(partition.get("app", "blob"), Some(&NvsValue::Blob(blob)));
    }
}
