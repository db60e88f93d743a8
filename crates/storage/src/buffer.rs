use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::page::Page;
use crate::registry::RegistryError;
use crate::replacer::{FrameId, LRUReplacer, Replacer};
use crate::{DiskManager, PageId};

/// Errors returned by the buffer pool manager.
#[derive(Debug, Error)]
pub enum BufferPoolError {
    /// The buffer pool lock was poisoned.
    #[error("buffer pool lock poisoned")]
    LockPoisoned,
    /// Every frame is pinned, nothing can be evicted.
    #[error("buffer pool has no free frames")]
    NoFreeFrames,
    /// The page still has outstanding pins and cannot be deleted.
    #[error("page {0} is still pinned")]
    PagePinned(PageId),
    /// The file name registry rejected the request.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The underlying disk manager failed.
    #[error("disk manager error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for buffer pool results.
pub type BufferPoolResult<T> = Result<T, BufferPoolError>;

/// I/O and pinning counters, cumulative since the pool was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub allocations: u64,
    pub deallocations: u64,
    pub pins: u64,
}

impl BufferPoolStats {
    /// Counter deltas between an earlier snapshot and this one.
    pub fn since(&self, earlier: &BufferPoolStats) -> BufferPoolStats {
        BufferPoolStats {
            disk_reads: self.disk_reads - earlier.disk_reads,
            disk_writes: self.disk_writes - earlier.disk_writes,
            allocations: self.allocations - earlier.allocations,
            deallocations: self.deallocations - earlier.deallocations,
            pins: self.pins - earlier.pins,
        }
    }
}

/// Guard that provides access to a pinned page while holding the pool lock.
pub struct PageGuard<'a> {
    state: MutexGuard<'a, BufferPoolState>,
    frame_id: FrameId,
}

impl<'a> PageGuard<'a> {
    /// Returns the frame id backing this guard.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.state.pages[self.frame_id]
    }
}

impl DerefMut for PageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state.pages[self.frame_id]
    }
}

struct BufferPoolState {
    disk_manager: DiskManager,
    replacer: LRUReplacer,
    pages: Vec<Page>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    stats: BufferPoolStats,
}

impl BufferPoolState {
    fn take_frame(&mut self) -> Option<FrameId> {
        self.free_list.pop().or_else(|| self.replacer.victim())
    }
}

/// Buffer pool manager for caching pages between disk and memory.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<Mutex<BufferPoolState>>,
}

impl BufferPoolManager {
    /// Creates a new buffer pool manager with a fixed number of frames.
    pub fn new(disk_manager: DiskManager, pool_size: usize) -> Self {
        let pages = vec![Page::new(); pool_size];
        let free_list = (0..pool_size).rev().collect();
        let state = BufferPoolState {
            disk_manager,
            replacer: LRUReplacer::new(pool_size),
            pages,
            page_table: HashMap::new(),
            free_list,
            stats: BufferPoolStats::default(),
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock_state(&self) -> BufferPoolResult<MutexGuard<'_, BufferPoolState>> {
        self.inner.lock().map_err(|_| BufferPoolError::LockPoisoned)
    }

    fn evict_if_needed(state: &mut BufferPoolState, frame_id: FrameId) -> BufferPoolResult<()> {
        let (disk_manager, pages, page_table, stats) = (
            &mut state.disk_manager,
            &mut state.pages,
            &mut state.page_table,
            &mut state.stats,
        );
        if let Some(old_page_id) = pages[frame_id].page_id {
            if pages[frame_id].is_dirty {
                let data = pages[frame_id].data();
                disk_manager.write_page(old_page_id, data)?;
                stats.disk_writes += 1;
            }
            page_table.remove(&old_page_id);
        }
        Ok(())
    }

    /// Allocates a new page on disk and pins it in the buffer pool.
    pub fn new_page(&self) -> BufferPoolResult<Option<PageId>> {
        let mut state = self.lock_state()?;
        let Some(frame_id) = state.take_frame() else {
            return Ok(None);
        };

        if let Err(err) = Self::evict_if_needed(&mut state, frame_id) {
            state.free_list.push(frame_id);
            return Err(err);
        }
        state.pages[frame_id].reset_memory();

        let page_id = match state.disk_manager.allocate_page() {
            Ok(page_id) => page_id,
            Err(err) => {
                state.free_list.push(frame_id);
                return Err(err.into());
            }
        };
        {
            let page = &mut state.pages[frame_id];
            page.page_id = Some(page_id);
            page.pin_count = 1;
        }
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        state.stats.allocations += 1;
        state.stats.pins += 1;
        log::trace!("allocated page {} in frame {}", page_id, frame_id);
        Ok(Some(page_id))
    }

    /// Allocates a new page and releases the pin taken by `new_page`.
    pub fn allocate_page(&self) -> BufferPoolResult<PageId> {
        let page_id = self.new_page()?.ok_or(BufferPoolError::NoFreeFrames)?;
        self.unpin_page(page_id, false)?;
        Ok(page_id)
    }

    /// Fetches a page into memory and pins it, returning a guarded reference.
    pub fn fetch_page(&self, page_id: PageId) -> BufferPoolResult<Option<PageGuard<'_>>> {
        let mut state = self.lock_state()?;
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = &mut state.pages[frame_id];
            page.pin_count += 1;
            state.replacer.pin(frame_id);
            state.stats.pins += 1;
            return Ok(Some(PageGuard { state, frame_id }));
        }

        let Some(frame_id) = state.take_frame() else {
            return Ok(None);
        };

        if let Err(err) = Self::evict_if_needed(&mut state, frame_id) {
            state.free_list.push(frame_id);
            return Err(err);
        }
        {
            let state = &mut *state;
            let (disk_manager, pages) = (&mut state.disk_manager, &mut state.pages);
            let page = &mut pages[frame_id];
            page.reset_memory();
            if let Err(err) = disk_manager.read_page(page_id, page.data_mut()) {
                state.free_list.push(frame_id);
                return Err(err.into());
            }
            page.page_id = Some(page_id);
            page.pin_count = 1;
        }
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        state.stats.disk_reads += 1;
        state.stats.pins += 1;
        Ok(Some(PageGuard { state, frame_id }))
    }

    /// Unpins a page and optionally marks it dirty.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> BufferPoolResult<bool> {
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = &mut state.pages[frame_id];
        if page.pin_count == 0 {
            return Ok(false);
        }
        if is_dirty {
            page.is_dirty = true;
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(true)
    }

    /// Pins `page_id`, hands it to `read`, and unpins it again whatever the
    /// closure returns.
    pub fn read_page<R>(
        &self,
        page_id: PageId,
        read: impl FnOnce(&Page) -> R,
    ) -> BufferPoolResult<R> {
        let result = {
            let guard = self
                .fetch_page(page_id)?
                .ok_or(BufferPoolError::NoFreeFrames)?;
            read(&guard)
        };
        self.unpin_page(page_id, false)?;
        Ok(result)
    }

    /// Like [`read_page`](Self::read_page) but the page is unpinned dirty.
    pub fn write_page<R>(
        &self,
        page_id: PageId,
        write: impl FnOnce(&mut Page) -> R,
    ) -> BufferPoolResult<R> {
        let result = {
            let mut guard = self
                .fetch_page(page_id)?
                .ok_or(BufferPoolError::NoFreeFrames)?;
            write(&mut guard)
        };
        self.unpin_page(page_id, true)?;
        Ok(result)
    }

    /// Drops a page from the pool and returns it to the disk free list.
    pub fn delete_page(&self, page_id: PageId) -> BufferPoolResult<()> {
        let mut state = self.lock_state()?;
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            if state.pages[frame_id].pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }
            state.page_table.remove(&page_id);
            state.pages[frame_id].reset_memory();
            state.replacer.remove(frame_id);
            state.free_list.push(frame_id);
        }
        state.disk_manager.deallocate_page(page_id)?;
        state.stats.deallocations += 1;
        log::trace!("deallocated page {}", page_id);
        Ok(())
    }

    /// Flushes a page to disk, if present.
    pub fn flush_page(&self, page_id: PageId) -> BufferPoolResult<bool> {
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let state = &mut *state;
        let (disk_manager, pages) = (&mut state.disk_manager, &mut state.pages);
        let page = &mut pages[frame_id];
        disk_manager.write_page(page_id, page.data())?;
        page.is_dirty = false;
        state.stats.disk_writes += 1;
        Ok(true)
    }

    /// Flushes all dirty pages to disk.
    pub fn flush_all_pages(&self) -> BufferPoolResult<()> {
        let mut state = self.lock_state()?;
        let state = &mut *state;
        let (disk_manager, pages, stats) =
            (&mut state.disk_manager, &mut state.pages, &mut state.stats);
        for page in pages.iter_mut() {
            if let Some(page_id) = page.page_id
                && page.is_dirty
            {
                disk_manager.write_page(page_id, page.data())?;
                page.is_dirty = false;
                stats.disk_writes += 1;
            }
        }
        disk_manager.sync_data()?;
        Ok(())
    }

    /// Registers a named file whose entry point is `page_id`.
    pub fn add_file_entry(&self, name: &str, page_id: PageId) -> BufferPoolResult<()> {
        let mut state = self.lock_state()?;
        state.disk_manager.add_file_entry(name, page_id)?;
        Ok(())
    }

    /// Looks up the entry page of a named file.
    pub fn get_file_entry(&self, name: &str) -> BufferPoolResult<Option<PageId>> {
        let state = self.lock_state()?;
        Ok(state.disk_manager.get_file_entry(name))
    }

    /// Removes a named file entry, returning the page it pointed at.
    pub fn delete_file_entry(&self, name: &str) -> BufferPoolResult<PageId> {
        let mut state = self.lock_state()?;
        Ok(state.disk_manager.delete_file_entry(name)?)
    }

    /// Snapshot of the cumulative counters.
    pub fn stats(&self) -> BufferPoolResult<BufferPoolStats> {
        Ok(self.lock_state()?.stats)
    }

    /// Number of frames currently holding at least one pin.
    pub fn pinned_frames(&self) -> BufferPoolResult<usize> {
        let state = self.lock_state()?;
        Ok(state.pages.iter().filter(|page| page.pin_count > 0).count())
    }

    /// Caps the number of live pages in the underlying file.
    pub fn set_page_limit(&self, limit: Option<usize>) -> BufferPoolResult<()> {
        self.lock_state()?.disk_manager.set_page_limit(limit);
        Ok(())
    }

    /// Number of allocated pages in the underlying file, excluding the header.
    pub fn live_page_count(&self) -> BufferPoolResult<usize> {
        Ok(self.lock_state()?.disk_manager.live_page_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PAGE_SIZE;
    use std::fs;
    use std::path::PathBuf;

    struct TestContext {
        path: PathBuf,
    }

    impl TestContext {
        fn new(test_name: &str) -> Self {
            let path = std::env::temp_dir().join(format!("hashix_bpm_{}.db", test_name));
            if path.exists() {
                let _ = fs::remove_file(&path);
            }
            Self { path }
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn setup_bpm(test_name: &str, pool_size: usize) -> (TestContext, BufferPoolManager) {
        let ctx = TestContext::new(test_name);
        let disk_manager = DiskManager::open(ctx.path.to_str().unwrap()).unwrap();
        let bpm = BufferPoolManager::new(disk_manager, pool_size);
        (ctx, bpm)
    }

    #[test]
    fn test_new_page() {
        let (_ctx, bpm) = setup_bpm("new_page", 2);
        let page_id = bpm.new_page().unwrap().expect("expected new page");

        let state = bpm.inner.lock().unwrap();
        let frame_id = *state.page_table.get(&page_id).expect("missing mapping");
        let page = &state.pages[frame_id];

        assert_eq!(page.page_id, Some(page_id));
        assert_eq!(page.pin_count, 1);
        assert!(!page.is_dirty);
    }

    #[test]
    fn test_new_page_without_free_frame() {
        let (_ctx, bpm) = setup_bpm("no_frames", 1);
        let pinned = bpm.new_page().unwrap().unwrap();
        assert!(bpm.new_page().unwrap().is_none());
        assert!(matches!(bpm.allocate_page(), Err(BufferPoolError::NoFreeFrames)));
        assert!(bpm.unpin_page(pinned, false).unwrap());
        assert!(bpm.allocate_page().is_ok());
    }

    #[test]
    fn test_page_limit_surfaces_as_io_error() {
        let (_ctx, bpm) = setup_bpm("page_limit", 4);
        bpm.allocate_page().unwrap();
        bpm.set_page_limit(Some(1)).unwrap();
        assert!(matches!(bpm.allocate_page(), Err(BufferPoolError::Io(_))));
        assert_eq!(bpm.pinned_frames().unwrap(), 0);
        assert_eq!(bpm.live_page_count().unwrap(), 1);

        bpm.set_page_limit(None).unwrap();
        assert!(bpm.allocate_page().is_ok());
    }

    #[test]
    fn test_scoped_access_releases_pins() {
        let (_ctx, bpm) = setup_bpm("scoped", 2);
        let page_id = bpm.allocate_page().unwrap();
        assert_eq!(bpm.pinned_frames().unwrap(), 0);

        let written = bpm
            .write_page(page_id, |page| page.write_bytes(0, b"bucket"))
            .unwrap();
        assert!(written);
        assert_eq!(bpm.pinned_frames().unwrap(), 0);

        let failed: Result<(), &str> = bpm.read_page(page_id, |_| Err("reader failed")).unwrap();
        assert!(failed.is_err());
        assert_eq!(bpm.pinned_frames().unwrap(), 0);

        let bytes = bpm
            .read_page(page_id, |page| page.read_bytes(0, 6).unwrap().to_vec())
            .unwrap();
        assert_eq!(bytes, b"bucket");
    }

    #[test]
    fn test_binary_data_survives_eviction() {
        let (_ctx, bpm) = setup_bpm("binary_data", 2);
        let page_id = bpm.allocate_page().unwrap();

        let mut payload = [0u8; PAGE_SIZE];
        payload[0] = 0xAB;
        payload[PAGE_SIZE - 1] = 0xCD;
        bpm.write_page(page_id, |page| page.data_mut().copy_from_slice(&payload))
            .unwrap();

        // Push the page out of the two-frame pool
        for _ in 0..3 {
            bpm.allocate_page().unwrap();
        }

        let data = bpm.read_page(page_id, |page| *page.data()).unwrap();
        assert_eq!(data, payload);
        let stats = bpm.stats().unwrap();
        assert!(stats.disk_writes >= 1);
        assert!(stats.disk_reads >= 1);
    }

    #[test]
    fn test_delete_page_requires_unpinned() {
        let (_ctx, bpm) = setup_bpm("delete_page", 4);
        let page_id = bpm.new_page().unwrap().unwrap();
        assert!(matches!(
            bpm.delete_page(page_id),
            Err(BufferPoolError::PagePinned(id)) if id == page_id
        ));
        assert!(bpm.unpin_page(page_id, false).unwrap());
        bpm.delete_page(page_id).unwrap();
        assert_eq!(bpm.live_page_count().unwrap(), 0);

        let reused = bpm.allocate_page().unwrap();
        assert_eq!(reused, page_id);
        let stats = bpm.stats().unwrap();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.deallocations, 1);
    }

    #[test]
    fn test_buffer_exhaustion() {
        let (_ctx, bpm) = setup_bpm("buffer_exhaustion", 5);
        let mut page_ids = Vec::new();

        for idx in 0u8..10u8 {
            let page_id = bpm.allocate_page().unwrap();
            bpm.write_page(page_id, |page| page.data_mut().fill(idx))
                .unwrap();
            page_ids.push(page_id);
        }

        bpm.flush_all_pages().unwrap();

        for (idx, page_id) in page_ids.iter().enumerate() {
            let first = bpm.read_page(*page_id, |page| page.data()[0]).unwrap();
            assert_eq!(first, idx as u8);
        }
        assert_eq!(bpm.pinned_frames().unwrap(), 0);
    }

    #[test]
    fn test_file_entries_round_trip_through_pool() {
        let (_ctx, bpm) = setup_bpm("file_entries", 2);
        bpm.add_file_entry("IX_Test", 42).unwrap();
        assert_eq!(bpm.get_file_entry("IX_Test").unwrap(), Some(42));
        assert!(matches!(
            bpm.add_file_entry("IX_Test", 43),
            Err(BufferPoolError::Registry(RegistryError::DuplicateEntry(_)))
        ));
        assert_eq!(bpm.delete_file_entry("IX_Test").unwrap(), 42);
        assert_eq!(bpm.get_file_entry("IX_Test").unwrap(), None);
    }
}
