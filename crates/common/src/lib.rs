//! Value types shared by the heap layer and the access methods built on it.

use std::fmt;

use storage::PageId;

/// Addresses one record in a heap file: the page holding it and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_id: u32,
}

impl Rid {
    /// Bytes a RID occupies on disk: page id (u64) then slot (u32).
    pub const ENCODED_SIZE: usize = 12;

    pub fn new(page_id: PageId, slot_id: u32) -> Self {
        Self { page_id, slot_id }
    }

    pub fn to_bytes(self) -> [u8; Self::ENCODED_SIZE] {
        let mut buf = [0u8; Self::ENCODED_SIZE];
        buf[..8].copy_from_slice(&self.page_id.to_le_bytes());
        buf[8..].copy_from_slice(&self.slot_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_SIZE {
            return None;
        }
        let mut page_id = [0u8; 8];
        page_id.copy_from_slice(&bytes[..8]);
        let mut slot_id = [0u8; 4];
        slot_id.copy_from_slice(&bytes[8..]);
        Some(Self {
            page_id: u64::from_le_bytes(page_id),
            slot_id: u32::from_le_bytes(slot_id),
        })
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_id)
    }
}
