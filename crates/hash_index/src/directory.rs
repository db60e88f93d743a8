use std::collections::HashSet;

use storage::{BufferPoolManager, Page, PageId, INVALID_PAGE_ID};

use crate::bucket::{self, BucketEntry, BucketHeader};
use crate::error::{IndexError, IndexResult};
use crate::key::hash_bytes;
use crate::options::HashIndexOptions;
use crate::page::{
    expect_page_type, read_u16, read_u64, read_u8, write_page_type, write_u16, write_u64,
    write_u8, PageType, DIRECTORY_SLOTS_OFFSET, HEADER_DEPTH_OFFSET, HEADER_DIR_COUNT_OFFSET,
    HEADER_DIR_PAGES_OFFSET, HEADER_ENTRY_COUNT_OFFSET, HEADER_MAX_DEPTH_OFFSET,
    HEADER_MAX_OVERFLOW_OFFSET, HEADER_SELF_OFFSET, HEADER_VERSION_OFFSET, MAX_DIRECTORY_PAGES,
    SLOTS_PER_DIRECTORY_PAGE,
};

/// Decoded contents of the index header page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderInfo {
    pub global_depth: u8,
    pub options: HashIndexOptions,
    pub entry_count: u64,
    /// Bumped whenever pages leave a chain or entries move between chains.
    pub version: u64,
    pub directory_pages: Vec<PageId>,
}

impl HeaderInfo {
    pub fn slot_count(&self) -> usize {
        1usize << self.global_depth
    }
}

/// One page of a bucket chain, read in full.
#[derive(Debug, Clone)]
pub(crate) struct ChainPage {
    pub page_id: PageId,
    pub header: BucketHeader,
    pub entries: Vec<BucketEntry>,
}

/// Routes hash values to primary bucket pages. Everything lives in pages:
/// the header page (global depth, counters, directory page list) and the
/// directory pages (one bucket page id per slot).
pub(crate) struct Directory {
    buffer_pool: BufferPoolManager,
    header_page_id: PageId,
}

pub(crate) fn slot_for(hash: u32, depth: u8) -> usize {
    (hash & ((1u32 << depth) - 1)) as usize
}

fn directory_pages_for(slot_count: usize) -> usize {
    slot_count.div_ceil(SLOTS_PER_DIRECTORY_PAGE)
}

impl Directory {
    /// Lays out a fresh index: header, directory pages, and one empty bucket
    /// per slot. On failure every page allocated so far is released.
    pub fn create(buffer_pool: BufferPoolManager, options: HashIndexOptions) -> IndexResult<Self> {
        options.validate()?;
        let depth = options.initial_global_depth;
        let slot_count = 1usize << depth;
        let dir_count = directory_pages_for(slot_count);

        let pages = allocate_pages(&buffer_pool, 1 + dir_count + slot_count)?;
        let header_page_id = pages[0];
        let directory_pages = pages[1..1 + dir_count].to_vec();
        let buckets = pages[1 + dir_count..].to_vec();
        let directory = Self {
            buffer_pool,
            header_page_id,
        };
        let info = HeaderInfo {
            global_depth: depth,
            options,
            entry_count: 0,
            version: 0,
            directory_pages,
        };

        let written = directory.initialize(&info, &buckets);
        if let Err(err) = written {
            release_pages(&directory.buffer_pool, &pages);
            return Err(err);
        }
        log::debug!(
            "created directory: header {}, depth {}, {} buckets",
            header_page_id,
            depth,
            buckets.len()
        );
        Ok(directory)
    }

    fn initialize(&self, info: &HeaderInfo, buckets: &[PageId]) -> IndexResult<()> {
        for &bucket_page_id in buckets {
            self.buffer_pool.write_page(bucket_page_id, |page| {
                bucket::init_bucket(page, info.global_depth, None)
            })??;
        }
        self.write_slots(&info.directory_pages, buckets, None)?;
        self.write_header(info)
    }

    /// Attaches to an existing header page, checking that it really is one.
    pub fn open(buffer_pool: BufferPoolManager, header_page_id: PageId) -> IndexResult<Self> {
        let directory = Self {
            buffer_pool,
            header_page_id,
        };
        directory.header()?;
        Ok(directory)
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    pub fn header(&self) -> IndexResult<HeaderInfo> {
        let header_page_id = self.header_page_id;
        self.buffer_pool
            .read_page(header_page_id, |page| read_header_info(page, header_page_id))?
    }

    fn write_header(&self, info: &HeaderInfo) -> IndexResult<()> {
        let header_page_id = self.header_page_id;
        self.buffer_pool
            .write_page(header_page_id, |page| write_header_info(page, header_page_id, info))?
    }

    pub fn version(&self) -> IndexResult<u64> {
        Ok(self.header()?.version)
    }

    /// Applies an entry count delta and optionally marks a structural change.
    pub fn record_change(&self, entry_delta: i64, structural: bool) -> IndexResult<()> {
        self.buffer_pool.write_page(self.header_page_id, |page| {
            expect_page_type(page, PageType::Header)?;
            let count = read_u64(page, HEADER_ENTRY_COUNT_OFFSET)?;
            let count = count
                .checked_add_signed(entry_delta)
                .ok_or_else(|| IndexError::Corrupt("entry count out of range".to_string()))?;
            write_u64(page, HEADER_ENTRY_COUNT_OFFSET, count)?;
            if structural {
                let version = read_u64(page, HEADER_VERSION_OFFSET)?;
                write_u64(page, HEADER_VERSION_OFFSET, version.wrapping_add(1))?;
            }
            Ok(())
        })?
    }

    /// Primary bucket page for `hash` under the current global depth.
    pub fn locate(&self, hash: u32) -> IndexResult<PageId> {
        let info = self.header()?;
        self.read_slot(&info, slot_for(hash, info.global_depth))
    }

    fn read_slot(&self, info: &HeaderInfo, slot: usize) -> IndexResult<PageId> {
        let dir_page_id = *info
            .directory_pages
            .get(slot / SLOTS_PER_DIRECTORY_PAGE)
            .ok_or_else(|| IndexError::Corrupt(format!("no directory page for slot {}", slot)))?;
        let offset = DIRECTORY_SLOTS_OFFSET + (slot % SLOTS_PER_DIRECTORY_PAGE) * 8;
        let bucket_page_id = self.buffer_pool.read_page(dir_page_id, |page| {
            expect_page_type(page, PageType::Directory)?;
            read_u64(page, offset)
        })??;
        if bucket_page_id == INVALID_PAGE_ID {
            return Err(IndexError::Corrupt(format!("directory slot {} is unmapped", slot)));
        }
        Ok(bucket_page_id)
    }

    /// Every slot of the directory, in slot order.
    pub fn all_slots(&self, info: &HeaderInfo) -> IndexResult<Vec<PageId>> {
        let slot_count = info.slot_count();
        let mut slots = Vec::with_capacity(slot_count);
        for (index, &dir_page_id) in info.directory_pages.iter().enumerate() {
            let first = index * SLOTS_PER_DIRECTORY_PAGE;
            let count = slot_count.saturating_sub(first).min(SLOTS_PER_DIRECTORY_PAGE);
            self.buffer_pool.read_page(dir_page_id, |page| -> IndexResult<()> {
                expect_page_type(page, PageType::Directory)?;
                for slot in 0..count {
                    slots.push(read_u64(page, DIRECTORY_SLOTS_OFFSET + slot * 8)?);
                }
                Ok(())
            })??;
        }
        if slots.len() != slot_count {
            return Err(IndexError::Corrupt(format!(
                "directory holds {} slots, depth {} needs {}",
                slots.len(),
                info.global_depth,
                slot_count
            )));
        }
        Ok(slots)
    }

    /// Writes `slots` across `directory_pages`, skipping pages whose slots
    /// match `previous`.
    fn write_slots(
        &self,
        directory_pages: &[PageId],
        slots: &[PageId],
        previous: Option<&[PageId]>,
    ) -> IndexResult<()> {
        for (index, &dir_page_id) in directory_pages.iter().enumerate() {
            let first = (index * SLOTS_PER_DIRECTORY_PAGE).min(slots.len());
            let last = (first + SLOTS_PER_DIRECTORY_PAGE).min(slots.len());
            let chunk = &slots[first..last];
            if previous.and_then(|previous| previous.get(first..last)) == Some(chunk) {
                continue;
            }
            self.buffer_pool.write_page(dir_page_id, |page| -> IndexResult<()> {
                page.data_mut().fill(0);
                write_page_type(page, PageType::Directory)?;
                for (slot, bucket_page_id) in chunk.iter().enumerate() {
                    write_u64(page, DIRECTORY_SLOTS_OFFSET + slot * 8, *bucket_page_id)?;
                }
                Ok(())
            })??;
        }
        Ok(())
    }

    /// Distinct primary bucket pages, in first-slot order.
    pub fn bucket_pages(&self, info: &HeaderInfo) -> IndexResult<Vec<PageId>> {
        let mut seen = HashSet::new();
        Ok(self
            .all_slots(info)?
            .into_iter()
            .filter(|page_id| seen.insert(*page_id))
            .collect())
    }

    /// Page ids and headers of a chain, primary first, without entries.
    pub fn chain_headers(&self, primary: PageId) -> IndexResult<Vec<(PageId, BucketHeader)>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(primary);
        while let Some(page_id) = next {
            if !visited.insert(page_id) {
                return Err(IndexError::Corrupt(format!(
                    "bucket chain from {} loops at {}",
                    primary, page_id
                )));
            }
            let header = self.buffer_pool.read_page(page_id, bucket::read_header)??;
            next = header.next;
            chain.push((page_id, header));
        }
        Ok(chain)
    }

    fn read_chain(&self, primary: PageId) -> IndexResult<Vec<ChainPage>> {
        let mut chain = Vec::new();
        for (page_id, header) in self.chain_headers(primary)? {
            let entries = self.buffer_pool.read_page(page_id, bucket::entries)??;
            chain.push(ChainPage {
                page_id,
                header,
                entries,
            });
        }
        Ok(chain)
    }

    /// Splits the chain rooted at `primary` into two chains one local depth
    /// deeper, doubling the directory if the chain was already at global
    /// depth. Returns `Ok(false)`, with nothing changed, when a split cannot
    /// separate the chain's entries from `incoming_hash` or the depth limit is
    /// reached; the caller then grows an overflow page instead.
    ///
    /// Both halves are written to freshly allocated pages and the old chain
    /// is only freed once the header points at the new layout. Any failure
    /// before that leaves the index as it was.
    pub fn grow_on_overflow(&self, primary: PageId, incoming_hash: u32) -> IndexResult<bool> {
        let info = self.header()?;
        let chain = self.read_chain(primary)?;
        let local_depth = chain[0].header.local_depth;
        let max_depth = info.options.max_global_depth;
        if local_depth >= max_depth || local_depth > info.global_depth {
            return Ok(false);
        }

        let separable_mask = (1u32 << max_depth) - 1;
        let entries: Vec<BucketEntry> = chain
            .iter()
            .flat_map(|page| page.entries.iter().cloned())
            .collect();
        let inseparable = entries
            .iter()
            .all(|entry| hash_bytes(&entry.key) & separable_mask == incoming_hash & separable_mask);
        if inseparable {
            return Ok(false);
        }

        let doubling = local_depth == info.global_depth;
        let new_global_depth = if doubling {
            info.global_depth + 1
        } else {
            info.global_depth
        };
        let dir_pages_needed = directory_pages_for(1usize << new_global_depth);
        if dir_pages_needed > MAX_DIRECTORY_PAGES {
            return Ok(false);
        }
        let extra_dir_pages = dir_pages_needed.saturating_sub(info.directory_pages.len());
        let previous = self.all_slots(&info)?;

        let split_bit = 1u32 << local_depth;
        let (moved, kept): (Vec<BucketEntry>, Vec<BucketEntry>) = entries
            .into_iter()
            .partition(|entry| hash_bytes(&entry.key) & split_bit != 0);
        let kept_runs = bucket::pack(kept);
        let moved_runs = bucket::pack(moved);
        let kept_pages = kept_runs.len().max(1);
        let moved_pages = moved_runs.len().max(1);

        let fresh = allocate_pages(
            &self.buffer_pool,
            extra_dir_pages + kept_pages + moved_pages,
        )?;
        let (new_dir_pages, rest) = fresh.split_at(extra_dir_pages);
        let (kept_chain, moved_chain) = rest.split_at(kept_pages);

        let mut slots = previous.clone();
        if doubling {
            slots.extend_from_within(..);
        }
        for (slot, target) in slots.iter_mut().enumerate() {
            if *target == primary {
                *target = if (slot as u32) & split_bit != 0 {
                    moved_chain[0]
                } else {
                    kept_chain[0]
                };
            }
        }
        let mut directory_pages = info.directory_pages.clone();
        directory_pages.extend_from_slice(new_dir_pages);
        let split_info = HeaderInfo {
            global_depth: new_global_depth,
            version: info.version.wrapping_add(1),
            directory_pages,
            ..info.clone()
        };

        let new_local_depth = local_depth + 1;
        let switched = self
            .write_chain(kept_chain, new_local_depth, &kept_runs)
            .and_then(|()| self.write_chain(moved_chain, new_local_depth, &moved_runs))
            .and_then(|()| {
                self.write_slots(&split_info.directory_pages, &slots, Some(&previous))
            })
            .and_then(|()| self.write_header(&split_info));
        if let Err(err) = switched {
            self.restore_layout(&info, &previous, &slots);
            release_pages(&self.buffer_pool, &fresh);
            return Err(err);
        }

        for page in &chain {
            self.buffer_pool.delete_page(page.page_id)?;
        }
        log::debug!(
            "split bucket {} at local depth {} into {} and {} (global depth {}{})",
            primary,
            local_depth,
            kept_chain[0],
            moved_chain[0],
            new_global_depth,
            if doubling { ", directory doubled" } else { "" }
        );
        Ok(true)
    }

    /// Puts back the directory slots and header of `info` after a split
    /// failed part way through switching to `attempted`.
    fn restore_layout(&self, info: &HeaderInfo, previous: &[PageId], attempted: &[PageId]) {
        let restored = self
            .write_slots(&info.directory_pages, previous, Some(attempted))
            .and_then(|()| self.write_header(info));
        if let Err(err) = restored {
            log::warn!(
                "failed to restore directory of index at page {} after a failed split: {}",
                self.header_page_id,
                err
            );
        }
    }

    /// Writes `runs` into the chain `pages`, linking each page to the next.
    /// An empty `runs` leaves a single empty bucket in `pages[0]`.
    fn write_chain(
        &self,
        pages: &[PageId],
        local_depth: u8,
        runs: &[Vec<BucketEntry>],
    ) -> IndexResult<()> {
        for (index, &page_id) in pages.iter().enumerate() {
            let next = pages.get(index + 1).copied();
            let entries = runs.get(index).map(Vec::as_slice).unwrap_or(&[]);
            self.buffer_pool.write_page(page_id, |page| {
                bucket::write_entries(page, local_depth, next, entries)
            })??;
        }
        Ok(())
    }

    /// Frees every page the index owns: bucket chains, directory pages, and
    /// the header. Returns the number of pages released.
    pub fn free_all(&self) -> IndexResult<usize> {
        let info = self.header()?;
        let mut pages = Vec::new();
        for primary in self.bucket_pages(&info)? {
            pages.extend(
                self.chain_headers(primary)?
                    .into_iter()
                    .map(|(page_id, _)| page_id),
            );
        }
        pages.extend_from_slice(&info.directory_pages);
        pages.push(self.header_page_id);
        for page_id in &pages {
            self.buffer_pool.delete_page(*page_id)?;
        }
        Ok(pages.len())
    }
}

/// Allocates `count` pages, handing back the ones already taken if any
/// allocation fails.
pub(crate) fn allocate_pages(
    buffer_pool: &BufferPoolManager,
    count: usize,
) -> IndexResult<Vec<PageId>> {
    let mut pages = Vec::with_capacity(count);
    for _ in 0..count {
        match buffer_pool.allocate_page() {
            Ok(page_id) => pages.push(page_id),
            Err(err) => {
                release_pages(buffer_pool, &pages);
                return Err(err.into());
            }
        }
    }
    Ok(pages)
}

pub(crate) fn release_pages(buffer_pool: &BufferPoolManager, pages: &[PageId]) {
    for page_id in pages {
        if let Err(err) = buffer_pool.delete_page(*page_id) {
            log::warn!("failed to release page {}: {}", page_id, err);
        }
    }
}

fn read_header_info(page: &Page, header_page_id: PageId) -> IndexResult<HeaderInfo> {
    expect_page_type(page, PageType::Header)?;
    let self_id = read_u64(page, HEADER_SELF_OFFSET)?;
    if self_id != header_page_id {
        return Err(IndexError::Corrupt(format!(
            "header page {} records itself as {}",
            header_page_id, self_id
        )));
    }
    let global_depth = read_u8(page, HEADER_DEPTH_OFFSET)?;
    let options = HashIndexOptions {
        initial_global_depth: global_depth,
        max_global_depth: read_u8(page, HEADER_MAX_DEPTH_OFFSET)?,
        max_overflow_pages: read_u8(page, HEADER_MAX_OVERFLOW_OFFSET)?,
    };
    options.validate().map_err(|err| IndexError::Corrupt(err.to_string()))?;
    let dir_count = read_u16(page, HEADER_DIR_COUNT_OFFSET)? as usize;
    if dir_count > MAX_DIRECTORY_PAGES || dir_count < directory_pages_for(1usize << global_depth) {
        return Err(IndexError::Corrupt(format!(
            "{} directory pages cannot hold depth {}",
            dir_count, global_depth
        )));
    }
    let mut directory_pages = Vec::with_capacity(dir_count);
    for index in 0..dir_count {
        directory_pages.push(read_u64(page, HEADER_DIR_PAGES_OFFSET + index * 8)?);
    }
    Ok(HeaderInfo {
        global_depth,
        options,
        entry_count: read_u64(page, HEADER_ENTRY_COUNT_OFFSET)?,
        version: read_u64(page, HEADER_VERSION_OFFSET)?,
        directory_pages,
    })
}

fn write_header_info(
    page: &mut Page,
    header_page_id: PageId,
    info: &HeaderInfo,
) -> IndexResult<()> {
    page.data_mut().fill(0);
    write_page_type(page, PageType::Header)?;
    write_u8(page, HEADER_DEPTH_OFFSET, info.global_depth)?;
    write_u8(page, HEADER_MAX_DEPTH_OFFSET, info.options.max_global_depth)?;
    write_u8(page, HEADER_MAX_OVERFLOW_OFFSET, info.options.max_overflow_pages)?;
    write_u16(page, HEADER_DIR_COUNT_OFFSET, info.directory_pages.len() as u16)?;
    write_u64(page, HEADER_ENTRY_COUNT_OFFSET, info.entry_count)?;
    write_u64(page, HEADER_SELF_OFFSET, header_page_id)?;
    write_u64(page, HEADER_VERSION_OFFSET, info.version)?;
    for (index, dir_page_id) in info.directory_pages.iter().enumerate() {
        write_u64(page, HEADER_DIR_PAGES_OFFSET + index * 8, *dir_page_id)?;
    }
    Ok(())
}
