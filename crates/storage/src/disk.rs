//! DiskManager: page allocation/storage for the hash index engine.
//!
//! Invariants:
//! - Page 0 is a reserved header: next_page_id (bytes 0..8), free list head
//!   (bytes 8..16), then the serialized file registry.
//! - Freed pages form a singly linked list through their first 8 bytes and
//!   are handed out again before the file grows.
//! - Every allocation, deallocation, and registry change persists the header.
//! - On open, header is loaded (created if absent).

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind, Result};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::registry::{FileRegistry, RegistryError};

pub type PageId = u64;
pub const PAGE_SIZE: usize = 4096;
pub const HEADER_SIZE: usize = PAGE_SIZE; // header occupies page 0

/// Page 0 is never handed out, so it doubles as the "no page" marker.
pub const INVALID_PAGE_ID: PageId = 0;

const NEXT_PAGE_OFFSET: usize = 0;
const FREE_HEAD_OFFSET: usize = 8;
pub(crate) const REGISTRY_OFFSET: usize = 16;

struct Header {
    next_page_id: u64, // one past the highest page ever allocated
    free_head: PageId, // INVALID_PAGE_ID when the free list is empty
    registry: FileRegistry,
}

impl Header {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 8]
            .copy_from_slice(&self.next_page_id.to_le_bytes());
        buf[FREE_HEAD_OFFSET..FREE_HEAD_OFFSET + 8].copy_from_slice(&self.free_head.to_le_bytes());
        self.registry.write_to(&mut buf[REGISTRY_OFFSET..]);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let next_page_id = read_u64(buf, NEXT_PAGE_OFFSET);
        let free_head = read_u64(buf, FREE_HEAD_OFFSET);
        let registry = FileRegistry::read_from(&buf[REGISTRY_OFFSET..])
            .map_err(|err| Error::new(ErrorKind::InvalidData, err))?;
        Ok(Self {
            next_page_id,
            free_head,
            registry,
        })
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

pub struct DiskManager {
    file: File,
    header: Header, // in-memory header (synced on every change)
    free_pages: HashSet<PageId>,
    page_limit: Option<usize>, // cap on live pages, not persisted
    path: String,
}

impl DiskManager {
    /// Opens or creates the file; loads or initializes a valid header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut dm = DiskManager {
            file,
            header: Header {
                next_page_id: 1,
                free_head: INVALID_PAGE_ID,
                registry: FileRegistry::default(),
            },
            free_pages: HashSet::new(),
            page_limit: None,
            path: path.as_ref().to_string_lossy().into_owned(),
        };
        dm.header = dm.load_or_init_header()?;
        dm.free_pages = dm.load_free_pages()?;
        log::debug!(
            "opened {} (next page {}, {} free pages)",
            dm.path,
            dm.header.next_page_id,
            dm.free_pages.len()
        );
        Ok(dm)
    }

    /// Loads or initializes the header page (page 0)
    fn load_or_init_header(&mut self) -> Result<Header> {
        let meta = self.file.metadata()?;
        if meta.len() < HEADER_SIZE as u64 {
            // brand new file; initialize header (page 0)
            let header = Header {
                next_page_id: 1,
                free_head: INVALID_PAGE_ID,
                registry: FileRegistry::default(),
            };
            self.file.write_at(&header.to_bytes(), 0)?;
            Ok(header)
        } else {
            // load header from disk (always exactly one page)
            let mut buf = [0u8; HEADER_SIZE];
            self.file.read_at(&mut buf, 0)?;
            Header::from_bytes(&buf)
        }
    }

    /// Walks the persisted free list so double frees can be rejected.
    fn load_free_pages(&self) -> Result<HashSet<PageId>> {
        let mut free_pages = HashSet::new();
        let mut page_id = self.header.free_head;
        let mut link = [0u8; 8];
        while page_id != INVALID_PAGE_ID {
            if page_id >= self.header.next_page_id || !free_pages.insert(page_id) {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("free list corrupted at page {}", page_id),
                ));
            }
            self.file.read_at(&mut link, page_id * PAGE_SIZE as u64)?;
            page_id = u64::from_le_bytes(link);
        }
        Ok(free_pages)
    }

    fn persist_header(&mut self) -> Result<()> {
        let header_bytes = self.header.to_bytes();
        self.file.write_at(&header_bytes, 0)?;
        self.file.sync_data()
    }

    fn check_live(&self, page_id: PageId) -> Result<()> {
        if page_id == INVALID_PAGE_ID || page_id >= self.header.next_page_id {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("page {} is not allocated", page_id),
            ));
        }
        Ok(())
    }

    /// Read a page at page_id into buf
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        if buf.len() != PAGE_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "buf wrong size"));
        }
        self.check_live(page_id)?;
        let offset = page_id * PAGE_SIZE as u64;
        self.file.read_at(buf, offset)?;
        Ok(())
    }

    /// Write a page at page_id from buf
    pub fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        if buf.len() != PAGE_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "buf wrong size"));
        }
        self.check_live(page_id)?;
        let offset = page_id * PAGE_SIZE as u64;
        self.file.write_at(buf, offset)?;
        Ok(())
    }

    /// Forces buffered data to disk.
    pub fn sync_data(&self) -> Result<()> {
        self.file.sync_data()
    }

    /// Allocates a zeroed page, reusing the free list before extending the file.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if let Some(limit) = self.page_limit
            && self.live_page_count() >= limit
        {
            return Err(Error::other(format!("page limit of {} reached", limit)));
        }
        let zero_buf = [0u8; PAGE_SIZE];
        let page_id = if self.header.free_head != INVALID_PAGE_ID {
            let page_id = self.header.free_head;
            let mut link = [0u8; 8];
            self.file.read_at(&mut link, page_id * PAGE_SIZE as u64)?;
            self.header.free_head = u64::from_le_bytes(link);
            self.free_pages.remove(&page_id);
            page_id
        } else {
            let page_id = self.header.next_page_id;
            self.header.next_page_id += 1;
            page_id
        };
        // Data first, header after
        self.file.write_at(&zero_buf, page_id * PAGE_SIZE as u64)?;
        self.persist_header()?;
        Ok(page_id)
    }

    /// Returns a page to the free list.
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.check_live(page_id)?;
        if self.free_pages.contains(&page_id) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("page {} is already free", page_id),
            ));
        }
        let mut buf = [0u8; PAGE_SIZE];
        buf[..8].copy_from_slice(&self.header.free_head.to_le_bytes());
        self.file.write_at(&buf, page_id * PAGE_SIZE as u64)?;
        self.header.free_head = page_id;
        self.free_pages.insert(page_id);
        self.persist_header()
    }

    /// Registers `name` as pointing at `page_id`.
    pub fn add_file_entry(
        &mut self,
        name: &str,
        page_id: PageId,
    ) -> std::result::Result<(), RegistryError> {
        self.header.registry.add(name, page_id)?;
        self.persist_header()?;
        Ok(())
    }

    /// Looks up the page registered under `name`.
    pub fn get_file_entry(&self, name: &str) -> Option<PageId> {
        self.header.registry.get(name)
    }

    /// Removes the registration for `name`.
    pub fn delete_file_entry(&mut self, name: &str) -> std::result::Result<PageId, RegistryError> {
        let page_id = self.header.registry.remove(name)?;
        self.persist_header()?;
        Ok(page_id)
    }

    /// For tests: returns current next_page_id
    pub fn get_next_page_id(&self) -> PageId {
        self.header.next_page_id
    }

    /// Number of pages that are allocated and not on the free list.
    pub fn live_page_count(&self) -> usize {
        (self.header.next_page_id as usize - 1) - self.free_pages.len()
    }

    /// Caps the number of live pages; `None` removes the cap. Applies to
    /// this handle only.
    pub fn set_page_limit(&mut self, limit: Option<usize>) {
        self.page_limit = limit;
    }

    /// Path this manager was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }
}
