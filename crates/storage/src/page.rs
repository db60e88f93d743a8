use crate::{PAGE_SIZE, PageId};

/// In-memory page container with metadata for buffer management.
#[derive(Debug, Clone)]
pub struct Page {
    pub(crate) data: [u8; PAGE_SIZE],
    pub(crate) page_id: Option<PageId>,
    pub(crate) is_dirty: bool,
    pub(crate) pin_count: u32,
}

impl Page {
    /// Creates a zeroed page with no identity.
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
            page_id: None,
            is_dirty: false,
            pin_count: 0,
        }
    }

    /// Returns the page identifier, if assigned.
    pub fn page_id(&self) -> Option<PageId> {
        self.page_id
    }

    /// Returns whether the page has been modified.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    /// Returns the entire page data.
    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Returns a mutable reference to the entire page data.
    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Reads a slice of bytes from the page.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        if offset.checked_add(len)? > PAGE_SIZE {
            return None;
        }
        Some(&self.data[offset..offset + len])
    }

    /// Writes bytes into the page at the given offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> bool {
        if offset + bytes.len() > PAGE_SIZE {
            return false;
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        true
    }

    /// Moves `len` bytes from `src` to `dst` inside the page; ranges may overlap.
    pub fn move_bytes(&mut self, src: usize, dst: usize, len: usize) -> bool {
        if src.saturating_add(len) > PAGE_SIZE || dst.saturating_add(len) > PAGE_SIZE {
            return false;
        }
        self.data.copy_within(src..src + len, dst);
        true
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.read_bytes(offset, 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.read_bytes(offset, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&self, offset: usize) -> Option<u64> {
        let bytes = self.read_bytes(offset, 8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Some(u64::from_le_bytes(array))
    }

    /// Resets all data and metadata to defaults.
    pub fn reset_memory(&mut self) {
        self.data.fill(0);
        self.page_id = None;
        self.is_dirty = false;
        self.pin_count = 0;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
