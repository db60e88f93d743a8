use std::collections::BTreeMap;

use thiserror::Error;

use crate::disk::{HEADER_SIZE, REGISTRY_OFFSET};
use crate::PageId;

/// Longest file name accepted by the registry, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 64;

const COUNT_SIZE: usize = 2;
const ENTRY_OVERHEAD: usize = 1 + 8; // name length byte + page id
const REGISTRY_CAPACITY: usize = HEADER_SIZE - REGISTRY_OFFSET;

/// Errors returned by the file name registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("file name must be 1..={max} bytes, got {len}", max = MAX_FILE_NAME_LEN)]
    InvalidName { len: usize },
    #[error("file entry already exists: {0}")]
    DuplicateEntry(String),
    #[error("file entry not found: {0}")]
    EntryNotFound(String),
    #[error("file registry is full")]
    RegistryFull,
    #[error("file registry corrupted: {0}")]
    Corrupt(String),
    #[error("registry io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name to page id mapping stored in the disk header after the allocation
/// fields.
///
/// Layout: entry count (u16), then per entry a name length byte, the UTF-8
/// name, and the page id (u64), all little endian.
#[derive(Debug, Clone, Default)]
pub(crate) struct FileRegistry {
    entries: BTreeMap<String, PageId>,
}

impl FileRegistry {
    fn encoded_len(&self) -> usize {
        COUNT_SIZE
            + self
                .entries
                .keys()
                .map(|name| ENTRY_OVERHEAD + name.len())
                .sum::<usize>()
    }

    pub(crate) fn add(&mut self, name: &str, page_id: PageId) -> Result<(), RegistryError> {
        if name.is_empty() || name.len() > MAX_FILE_NAME_LEN {
            return Err(RegistryError::InvalidName { len: name.len() });
        }
        if self.entries.contains_key(name) {
            return Err(RegistryError::DuplicateEntry(name.to_string()));
        }
        if self.encoded_len() + ENTRY_OVERHEAD + name.len() > REGISTRY_CAPACITY {
            return Err(RegistryError::RegistryFull);
        }
        self.entries.insert(name.to_string(), page_id);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<PageId> {
        self.entries.get(name).copied()
    }

    pub(crate) fn remove(&mut self, name: &str) -> Result<PageId, RegistryError> {
        self.entries
            .remove(name)
            .ok_or_else(|| RegistryError::EntryNotFound(name.to_string()))
    }

    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        buf[..COUNT_SIZE].copy_from_slice(&(self.entries.len() as u16).to_le_bytes());
        let mut offset = COUNT_SIZE;
        for (name, page_id) in &self.entries {
            buf[offset] = name.len() as u8;
            offset += 1;
            buf[offset..offset + name.len()].copy_from_slice(name.as_bytes());
            offset += name.len();
            buf[offset..offset + 8].copy_from_slice(&page_id.to_le_bytes());
            offset += 8;
        }
    }

    pub(crate) fn read_from(buf: &[u8]) -> Result<Self, RegistryError> {
        let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut entries = BTreeMap::new();
        let mut offset = COUNT_SIZE;
        for _ in 0..count {
            let len = *buf
                .get(offset)
                .ok_or_else(|| RegistryError::Corrupt("truncated entry".to_string()))?
                as usize;
            offset += 1;
            let end = offset + len + 8;
            if end > buf.len() {
                return Err(RegistryError::Corrupt("truncated entry".to_string()));
            }
            let name = std::str::from_utf8(&buf[offset..offset + len])
                .map_err(|_| RegistryError::Corrupt("invalid utf8 name".to_string()))?
                .to_string();
            offset += len;
            let mut id = [0u8; 8];
            id.copy_from_slice(&buf[offset..offset + 8]);
            offset += 8;
            entries.insert(name, u64::from_le_bytes(id));
        }
        Ok(Self { entries })
    }
}
