use std::collections::{HashMap, VecDeque};

use common::Rid;
use storage::PageId;

use crate::bucket;
use crate::directory::Directory;
use crate::error::{IndexError, IndexResult};
use crate::key::{hash_bytes, SearchKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    NotStarted,
    At(PageId),
    Done,
    Closed,
}

/// Equality scan over one key's bucket chain.
///
/// The scan holds no page pins between calls: each step reads a single chain
/// page and buffers that page's matches. If the chain is split or loses an
/// overflow page while the scan is open, it restarts from the key's new
/// primary bucket and skips the RIDs it already produced, so every match
/// present for the whole scan is returned exactly once.
///
/// A scan borrows its index, so the index cannot be dropped or deleted
/// while the scan is alive:
///
/// ```
/// use hash_index::{HashIndex, Index, IndexResult, SearchKey};
/// use storage::BufferPoolManager;
///
/// fn scan_then_drop(pool: BufferPoolManager) -> IndexResult<()> {
///     let index = HashIndex::temporary(pool)?;
///     let scan = index.open_scan(&SearchKey::Integer(42));
///     for rid in scan {
///         rid?;
///     }
///     drop(index);
///     Ok(())
/// }
/// ```
///
/// ```compile_fail
/// use hash_index::{HashIndex, Index, IndexResult, SearchKey};
/// use storage::BufferPoolManager;
///
/// fn drop_then_scan(pool: BufferPoolManager) -> IndexResult<()> {
///     let index = HashIndex::temporary(pool)?;
///     let scan = index.open_scan(&SearchKey::Integer(42));
///     drop(index);
///     for rid in scan {
///         rid?;
///     }
///     Ok(())
/// }
/// ```
///
/// ```compile_fail
/// use hash_index::{HashIndex, Index, IndexResult, SearchKey};
/// use storage::BufferPoolManager;
///
/// fn delete_then_scan(pool: BufferPoolManager) -> IndexResult<()> {
///     let index = HashIndex::open(pool, "IX_Scanned")?;
///     let mut scan = index.open_scan(&SearchKey::Integer(42));
///     index.delete_file()?;
///     scan.has_next()?;
///     Ok(())
/// }
/// ```
pub struct HashScan<'a> {
    directory: &'a Directory,
    key: Option<Vec<u8>>,
    hash: u32,
    state: ScanState,
    version: u64,
    pending: VecDeque<Rid>,
    returned: HashMap<Rid, usize>,
    skip: HashMap<Rid, usize>,
}

impl<'a> HashScan<'a> {
    pub(crate) fn new(directory: &'a Directory, key: &SearchKey) -> Self {
        // A key too large to store can never match.
        let key = key.encode().ok();
        let hash = key.as_deref().map(hash_bytes).unwrap_or_default();
        let state = if key.is_some() {
            ScanState::NotStarted
        } else {
            ScanState::Done
        };
        Self {
            directory,
            key,
            hash,
            state,
            version: 0,
            pending: VecDeque::new(),
            returned: HashMap::new(),
            skip: HashMap::new(),
        }
    }

    /// Whether another matching RID remains. Idempotent; `false` once the
    /// chain is exhausted or the scan is closed.
    pub fn has_next(&mut self) -> IndexResult<bool> {
        loop {
            if !self.pending.is_empty() {
                return Ok(true);
            }
            match self.state {
                ScanState::Done | ScanState::Closed => return Ok(false),
                ScanState::NotStarted => {
                    self.version = self.directory.version()?;
                    self.state = ScanState::At(self.directory.locate(self.hash)?);
                }
                ScanState::At(page_id) => {
                    let version = self.directory.version()?;
                    if version != self.version {
                        log::debug!("chain changed under scan, restarting at version {}", version);
                        self.skip = self.returned.clone();
                        self.state = ScanState::NotStarted;
                        continue;
                    }
                    self.read_page(page_id)?;
                }
            }
        }
    }

    fn read_page(&mut self, page_id: PageId) -> IndexResult<()> {
        let Some(key) = self.key.as_deref() else {
            self.state = ScanState::Done;
            return Ok(());
        };
        let (rids, next) = self
            .directory
            .buffer_pool()
            .read_page(page_id, |page| bucket::matching_rids(page, key))??;
        for rid in rids {
            match self.skip.get_mut(&rid) {
                Some(count) if *count > 0 => *count -= 1,
                _ => self.pending.push_back(rid),
            }
        }
        self.state = next.map_or(ScanState::Done, ScanState::At);
        Ok(())
    }

    /// Next matching RID, or `ScanExhausted` when none remain.
    pub fn get_next(&mut self) -> IndexResult<Rid> {
        if !self.has_next()? {
            return Err(IndexError::ScanExhausted);
        }
        let rid = self.pending.pop_front().ok_or(IndexError::ScanExhausted)?;
        *self.returned.entry(rid).or_default() += 1;
        Ok(rid)
    }

    /// Ends the scan. Safe to call more than once.
    pub fn close(&mut self) {
        self.state = ScanState::Closed;
        self.pending.clear();
        self.returned.clear();
        self.skip.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state == ScanState::Closed
    }
}

impl Iterator for HashScan<'_> {
    type Item = IndexResult<Rid>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.get_next()),
            Ok(false) => None,
            Err(err) => {
                self.close();
                Some(Err(err))
            }
        }
    }
}

impl Drop for HashScan<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
