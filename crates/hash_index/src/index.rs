use common::Rid;
use storage::{BufferPoolManager, PageId};

use crate::bucket;
use crate::directory::{release_pages, Directory};
use crate::error::{IndexError, IndexResult};
use crate::key::{hash_bytes, SearchKey};
use crate::options::HashIndexOptions;
use crate::scan::HashScan;
use crate::summary::IndexSummary;

/// Where an insert attempt along a chain ended up.
enum ChainInsert {
    Inserted,
    Full {
        tail: PageId,
        overflow_pages: usize,
        local_depth: u8,
    },
}

/// Extendible hash index stored in buffer pool pages.
///
/// A named index is registered in the disk header under its name and
/// survives reopening the database. A temporary index has no name and its
/// pages are freed when it is dropped.
pub struct HashIndex {
    buffer_pool: BufferPoolManager,
    directory: Directory,
    name: Option<String>,
    options: HashIndexOptions,
    released: bool,
}

impl HashIndex {
    /// Creates an unnamed index with default options.
    pub fn temporary(buffer_pool: BufferPoolManager) -> IndexResult<Self> {
        Self::with_options(buffer_pool, None, HashIndexOptions::default())
    }

    /// Opens the index registered as `name`, creating it if absent.
    pub fn open(buffer_pool: BufferPoolManager, name: &str) -> IndexResult<Self> {
        Self::with_options(buffer_pool, Some(name), HashIndexOptions::default())
    }

    pub fn new(buffer_pool: BufferPoolManager, name: Option<&str>) -> IndexResult<Self> {
        Self::with_options(buffer_pool, name, HashIndexOptions::default())
    }

    /// Like [`new`](Self::new) with an explicit growth policy. When `name`
    /// is already registered the stored policy wins and `options` is ignored.
    pub fn with_options(
        buffer_pool: BufferPoolManager,
        name: Option<&str>,
        options: HashIndexOptions,
    ) -> IndexResult<Self> {
        let Some(name) = name else {
            let directory = Directory::create(buffer_pool.clone(), options)?;
            log::info!(
                "created temporary hash index at page {}",
                directory.header_page_id()
            );
            return Ok(Self::from_parts(buffer_pool, directory, None, options));
        };

        if let Some(header_page_id) = buffer_pool.get_file_entry(name)? {
            let directory = Directory::open(buffer_pool.clone(), header_page_id).map_err(|err| {
                IndexError::NamedResource(format!("cannot reopen index '{}': {}", name, err))
            })?;
            let info = directory.header()?;
            log::info!(
                "reopened hash index '{}' at page {} ({} entries)",
                name,
                header_page_id,
                info.entry_count
            );
            return Ok(Self::from_parts(
                buffer_pool,
                directory,
                Some(name.to_string()),
                info.options,
            ));
        }

        let directory = Directory::create(buffer_pool.clone(), options)?;
        if let Err(err) = buffer_pool.add_file_entry(name, directory.header_page_id()) {
            if let Err(cleanup) = directory.free_all() {
                log::warn!("failed to release pages of unregistered index '{}': {}", name, cleanup);
            }
            return Err(IndexError::NamedResource(format!(
                "cannot register index '{}': {}",
                name, err
            )));
        }
        log::info!(
            "created hash index '{}' at page {}",
            name,
            directory.header_page_id()
        );
        Ok(Self::from_parts(
            buffer_pool,
            directory,
            Some(name.to_string()),
            options,
        ))
    }

    fn from_parts(
        buffer_pool: BufferPoolManager,
        directory: Directory,
        name: Option<String>,
        options: HashIndexOptions,
    ) -> Self {
        Self {
            buffer_pool,
            directory,
            name,
            options,
            released: false,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.directory.header_page_id()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_temporary(&self) -> bool {
        self.name.is_none()
    }

    /// Growth policy the index runs with. For a reopened index the initial
    /// depth reads back as the current depth.
    pub fn options(&self) -> HashIndexOptions {
        self.options
    }

    /// Number of stored entries.
    pub fn len(&self) -> IndexResult<u64> {
        Ok(self.directory.header()?.entry_count)
    }

    pub fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn global_depth(&self) -> IndexResult<u8> {
        Ok(self.directory.header()?.global_depth)
    }

    pub fn summary(&self) -> IndexResult<IndexSummary> {
        IndexSummary::collect(&self.directory, self.name.as_deref())
    }

    pub fn print_summary(&self) -> IndexResult<()> {
        println!("{}", self.summary()?);
        Ok(())
    }

    /// Unregisters a named index and frees all of its pages.
    pub fn delete_file(mut self) -> IndexResult<()> {
        let Some(name) = self.name.clone() else {
            return Err(IndexError::NamedResource(
                "temporary index has no file entry".to_string(),
            ));
        };
        match self.buffer_pool.get_file_entry(&name)? {
            Some(page_id) if page_id == self.header_page_id() => {}
            Some(page_id) => {
                return Err(IndexError::NamedResource(format!(
                    "'{}' is registered to page {}, not {}",
                    name,
                    page_id,
                    self.header_page_id()
                )))
            }
            None => {
                return Err(IndexError::NamedResource(format!(
                    "'{}' is not registered",
                    name
                )))
            }
        }
        self.directory.header().map_err(|err| {
            IndexError::NamedResource(format!("header of '{}' is unreadable: {}", name, err))
        })?;
        self.buffer_pool
            .delete_file_entry(&name)
            .map_err(|err| IndexError::NamedResource(err.to_string()))?;
        self.released = true;
        let freed = self.directory.free_all()?;
        log::info!("deleted hash index '{}' ({} pages freed)", name, freed);
        Ok(())
    }

    /// Frees every page of the index; a named index is also unregistered.
    pub fn destroy(mut self) -> IndexResult<()> {
        if self.name.is_some() {
            return self.delete_file();
        }
        self.released = true;
        let freed = self.directory.free_all()?;
        log::debug!("destroyed temporary hash index ({} pages freed)", freed);
        Ok(())
    }

    fn insert_into_chain(&self, primary: PageId, key: &[u8], rid: Rid) -> IndexResult<ChainInsert> {
        let needed = key.len() + Rid::ENCODED_SIZE;
        let mut page_id = primary;
        let mut overflow_pages = 0;
        let mut local_depth = None;
        loop {
            let header = self.buffer_pool.read_page(page_id, bucket::read_header)??;
            let depth = *local_depth.get_or_insert(header.local_depth);
            if header.free_space() >= needed {
                let inserted = self
                    .buffer_pool
                    .write_page(page_id, |page| bucket::insert(page, key, rid))??;
                if inserted {
                    return Ok(ChainInsert::Inserted);
                }
                return Err(IndexError::Corrupt(format!(
                    "bucket {} reported free space it does not have",
                    page_id
                )));
            }
            match header.next {
                Some(next) => {
                    page_id = next;
                    overflow_pages += 1;
                }
                None => {
                    return Ok(ChainInsert::Full {
                        tail: page_id,
                        overflow_pages,
                        local_depth: depth,
                    })
                }
            }
        }
    }

    /// Links a new overflow page holding the entry after `tail`.
    fn append_overflow(
        &self,
        tail: PageId,
        local_depth: u8,
        key: &[u8],
        rid: Rid,
    ) -> IndexResult<()> {
        let page_id = self.buffer_pool.allocate_page()?;
        let written = self
            .buffer_pool
            .write_page(page_id, |page| -> IndexResult<bool> {
                bucket::init_bucket(page, local_depth, None)?;
                bucket::insert(page, key, rid)
            })
            .map_err(IndexError::from)
            .and_then(|inserted| inserted);
        match written {
            Ok(true) => {}
            Ok(false) => {
                release_pages(&self.buffer_pool, &[page_id]);
                return Err(IndexError::Corrupt(
                    "entry does not fit an empty bucket".to_string(),
                ));
            }
            Err(err) => {
                release_pages(&self.buffer_pool, &[page_id]);
                return Err(err);
            }
        }
        self.buffer_pool
            .write_page(tail, |page| bucket::set_next(page, Some(page_id)))??;
        log::debug!("chained overflow page {} after {}", page_id, tail);
        Ok(())
    }
}

impl crate::Index for HashIndex {
    type Scan<'a> = HashScan<'a>;

    /// Adds `(key, rid)`. Duplicates, including exact duplicate pairs, are
    /// stored as separate entries.
    fn insert_entry(&self, key: &SearchKey, rid: Rid) -> IndexResult<()> {
        let encoded = key.encode()?;
        let hash = hash_bytes(&encoded);
        loop {
            let primary = self.directory.locate(hash)?;
            match self.insert_into_chain(primary, &encoded, rid)? {
                ChainInsert::Inserted => break,
                ChainInsert::Full {
                    tail,
                    overflow_pages,
                    local_depth,
                } => {
                    let max_overflow = self.directory.header()?.options.max_overflow_pages as usize;
                    if overflow_pages >= max_overflow
                        && self.directory.grow_on_overflow(primary, hash)?
                    {
                        continue;
                    }
                    self.append_overflow(tail, local_depth, &encoded, rid)?;
                    break;
                }
            }
        }
        self.directory.record_change(1, false)
    }

    /// Removes one entry equal to `(key, rid)`. Emptied overflow pages are
    /// unlinked and freed; a primary bucket stays even when empty.
    fn delete_entry(&self, key: &SearchKey, rid: Rid) -> IndexResult<()> {
        let encoded = key.encode()?;
        let primary = self.directory.locate(hash_bytes(&encoded))?;
        let mut previous = None;
        let mut page_id = primary;
        loop {
            let (offset, header) = self.buffer_pool.read_page(page_id, |page| -> IndexResult<_> {
                Ok((bucket::find(page, &encoded, rid)?, bucket::read_header(page)?))
            })??;
            if let Some(offset) = offset {
                let after = self
                    .buffer_pool
                    .write_page(page_id, |page| bucket::remove_at(page, offset))??;
                let unlinked = match previous {
                    Some(previous) if after.count == 0 => {
                        self.buffer_pool
                            .write_page(previous, |page| bucket::set_next(page, after.next))??;
                        self.buffer_pool.delete_page(page_id)?;
                        log::debug!("freed empty overflow page {}", page_id);
                        true
                    }
                    _ => false,
                };
                return self.directory.record_change(-1, unlinked);
            }
            match header.next {
                Some(next) => {
                    previous = Some(page_id);
                    page_id = next;
                }
                None => {
                    return Err(IndexError::EntryNotFound {
                        key: key.clone(),
                        rid,
                    })
                }
            }
        }
    }

    /// Starts an equality scan. Nothing is read until the first call to
    /// `has_next` or `get_next`.
    fn open_scan(&self, key: &SearchKey) -> HashScan<'_> {
        HashScan::new(&self.directory, key)
    }
}

impl Drop for HashIndex {
    fn drop(&mut self) {
        if self.released || self.name.is_some() {
            return;
        }
        if let Err(err) = self.directory.free_all() {
            log::warn!(
                "failed to free temporary hash index at page {}: {}",
                self.header_page_id(),
                err
            );
        }
    }
}
