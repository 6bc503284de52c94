//! Partition image reader.
//!
//! Walks an image page by page and rebuilds the stored items. Every CRC
//! (page header, entry, payload) is checked, which makes the reader a
//! verifier for images produced by [`PartitionWriter`](super::PartitionWriter)
//! or the IDF tool.

use std::collections::HashMap;

use serde::Serialize;

use super::crc;
use super::entry::{Entry, ItemType};
use super::page::{entry_state, EntryState, PageState, FIRST_ENTRY_OFFSET};
use super::{Version, ENTRIES_PER_PAGE, ENTRY_SIZE, PAGE_SIZE};
use crate::error::NvsError;
use crate::value::NvsValue;

/// A stored key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub namespace: String,
    pub key: String,
    pub value: NvsValue,
}

/// Summary of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub index: usize,
    pub state: PageState,
    /// `None` for uninitialized pages.
    pub seq: Option<u32>,
    pub version: Option<Version>,
    /// Slots that are written or erased.
    pub used_entries: usize,
}

/// Decoded partition.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub pages: Vec<PageInfo>,
    pub items: Vec<Item>,
}

impl Partition {
    /// Look up a value by namespace and key.
    pub fn get(&self, namespace: &str, key: &str) -> Option<&NvsValue> {
        self.items
            .iter()
            .find(|item| item.namespace == namespace && item.key == key)
            .map(|item| &item.value)
    }

    /// Namespace names in the order they appear.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for item in &self.items {
            if !names.contains(&item.namespace.as_str()) {
                names.push(&item.namespace);
            }
        }
        names
    }
}

/// Item before its namespace index is resolved.
struct Pending {
    page: usize,
    entry: usize,
    ns: u8,
    key: String,
    value: NvsValue,
}

/// Decode and verify an NVS partition image.
pub fn read_partition(image: &[u8]) -> Result<Partition, NvsError> {
    if image.is_empty() || image.len() % PAGE_SIZE != 0 {
        return Err(NvsError::SizeNotAligned(image.len()));
    }

    let mut partition = Partition::default();
    let mut namespaces: HashMap<u8, String> = HashMap::new();
    let mut pending: Vec<Pending> = Vec::new();
    let mut chunks: HashMap<(u8, String, u8), Vec<u8>> = HashMap::new();

    for (index, page) in image.chunks_exact(PAGE_SIZE).enumerate() {
        let state = PageState::from_word(read_u32(page, 0));
        match state {
            PageState::Uninitialized => {
                partition.pages.push(PageInfo {
                    index,
                    state,
                    seq: None,
                    version: None,
                    used_entries: 0,
                });
                continue;
            }
            PageState::Invalid(word) => {
                return Err(NvsError::CorruptPage {
                    page: index,
                    reason: format!("invalid state word {word:#010x}"),
                });
            }
            _ => {}
        }

        if crc::header_crc(page) != read_u32(page, 28) {
            return Err(NvsError::CorruptPage {
                page: index,
                reason: "header CRC mismatch".to_string(),
            });
        }
        let version = Version::from_byte(page[8]).ok_or_else(|| NvsError::CorruptPage {
            page: index,
            reason: format!("unknown format version {:#04x}", page[8]),
        })?;

        let mut slot = 0;
        while slot < ENTRIES_PER_PAGE {
            if entry_state(page, slot) != EntryState::Written {
                slot += 1;
                continue;
            }

            let corrupt = |reason: &str| NvsError::CorruptItem {
                page: index,
                entry: slot,
                reason: reason.to_string(),
            };

            let offset = FIRST_ENTRY_OFFSET + slot * ENTRY_SIZE;
            let mut raw = [0u8; ENTRY_SIZE];
            raw.copy_from_slice(&page[offset..offset + ENTRY_SIZE]);
            let entry = Entry::decode(&raw).ok_or_else(|| corrupt("unknown item type"))?;
            if !entry.crc_valid() {
                return Err(corrupt("entry CRC mismatch"));
            }
            let span = entry.span as usize;
            if span == 0 || slot + span > ENTRIES_PER_PAGE {
                return Err(corrupt("span runs past the end of the page"));
            }

            let key = entry.key_str();
            match entry.item_type {
                ItemType::U8 if entry.ns == 0 => {
                    namespaces.insert(entry.data[0], key);
                }
                ItemType::Sz | ItemType::Blob | ItemType::BlobData => {
                    let size = entry.payload_size();
                    if size > (span - 1) * ENTRY_SIZE {
                        return Err(corrupt("payload larger than its span"));
                    }
                    let start = offset + ENTRY_SIZE;
                    let payload = &page[start..start + size];
                    if crc::checksum(payload) != entry.payload_crc() {
                        return Err(corrupt("data CRC mismatch"));
                    }

                    match entry.item_type {
                        ItemType::Sz => {
                            let text = payload.strip_suffix(&[0u8]).unwrap_or(payload);
                            let text = String::from_utf8(text.to_vec())
                                .map_err(|_| corrupt("string is not valid UTF-8"))?;
                            pending.push(Pending {
                                page: index,
                                entry: slot,
                                ns: entry.ns,
                                key,
                                value: NvsValue::Str(text),
                            });
                        }
                        ItemType::Blob => pending.push(Pending {
                            page: index,
                            entry: slot,
                            ns: entry.ns,
                            key,
                            value: NvsValue::Blob(payload.to_vec()),
                        }),
                        _ => {
                            chunks.insert((entry.ns, key, entry.chunk_index), payload.to_vec());
                        }
                    }
                }
                ItemType::BlobIndex => {
                    let total = read_u32(&entry.data, 0) as usize;
                    let count = entry.data[4];
                    let start = entry.data[5];

                    let mut data = Vec::new();
                    for chunk in start..start.saturating_add(count) {
                        let part = chunks
                            .remove(&(entry.ns, key.clone(), chunk))
                            .ok_or_else(|| corrupt("missing blob chunk"))?;
                        data.extend_from_slice(&part);
                    }
                    if data.len() != total {
                        return Err(corrupt("blob size does not match its index"));
                    }
                    pending.push(Pending {
                        page: index,
                        entry: slot,
                        ns: entry.ns,
                        key,
                        value: NvsValue::Blob(data),
                    });
                }
                ItemType::Any => return Err(corrupt("item type 0xff on a written entry")),
                primitive => {
                    let value = NvsValue::from_primitive(primitive, &entry.data)
                        .ok_or_else(|| corrupt("unexpected item type"))?;
                    pending.push(Pending {
                        page: index,
                        entry: slot,
                        ns: entry.ns,
                        key,
                        value,
                    });
                }
            }

            slot += span;
        }

        let used_entries = (0..ENTRIES_PER_PAGE)
            .filter(|&slot| entry_state(page, slot) != EntryState::Empty)
            .count();
        partition.pages.push(PageInfo {
            index,
            state,
            seq: Some(read_u32(page, 4)),
            version: Some(version),
            used_entries,
        });
    }

    for item in pending {
        let namespace = namespaces
            .get(&item.ns)
            .cloned()
            .ok_or_else(|| NvsError::CorruptItem {
                page: item.page,
                entry: item.entry,
                reason: format!("unknown namespace index {}", item.ns),
            })?;
        partition.items.push(Item {
            namespace,
            key: item.key,
            value: item.value,
        });
    }

    Ok(partition)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvs::PartitionWriter;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<u8> {
        let mut writer = PartitionWriter::new(0x4000, Version::V2).unwrap();
        writer.namespace("bonicbot").unwrap();
        writer
            .write("device_id", &NvsValue::Str("BB-0001".to_string()))
            .unwrap();
        writer.write("boots", &NvsValue::U32(7)).unwrap();
        writer.finish()
    }

    #[test]
    fn test_reads_generated_items() {
        let partition = read_partition(&sample()).unwrap();
        assert_eq!(
            partition.get("bonicbot", "device_id"),
            Some(&NvsValue::Str("BB-0001".to_string()))
        );
        assert_eq!(partition.get("bonicbot", "boots"), Some(&NvsValue::U32(7)));
        assert_eq!(partition.namespaces(), vec!["bonicbot"]);

        assert_eq!(partition.pages.len(), 4);
        assert_eq!(partition.pages[0].used_entries, 4);
        assert_eq!(partition.pages[0].state, PageState::Full);
        assert_eq!(partition.pages[3].state, PageState::Uninitialized);
    }

    #[test]
    fn test_detects_payload_corruption() {
        let mut image = sample();
        // First payload byte of the string, right after its header in slot 1.
        image[FIRST_ENTRY_OFFSET + 2 * ENTRY_SIZE] ^= 0xff;
        let err = read_partition(&image).unwrap_err();
        assert_eq!(err.to_string(), "page 0, entry 1: data CRC mismatch");
    }

    #[test]
    fn test_detects_header_corruption() {
        let mut image = sample();
        image[PAGE_SIZE + 4] = 9;
        assert!(matches!(
            read_partition(&image),
            Err(NvsError::CorruptPage { page: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_unaligned_image() {
        assert!(read_partition(&[0xff; 100]).is_err());
        assert!(read_partition(&[]).is_err());
    }
}
