//! Disk-backed extendible hash index mapping search keys to record ids.
//!
//! Keys are 32-bit integers, 32-bit floats, or strings. All index state
//! lives in pages owned by a [`storage::BufferPoolManager`], so a named index
//! can be reopened from the same database file.

mod bucket;
mod directory;
mod error;
mod index;
pub mod key;
mod options;
mod page;
mod scan;
mod summary;

pub use common::Rid;
pub use error::{IndexError, IndexResult};
pub use index::HashIndex;
pub use key::{KeyType, SearchKey};
pub use options::{
    HashIndexOptions, DEFAULT_INITIAL_GLOBAL_DEPTH, DEFAULT_MAX_GLOBAL_DEPTH,
    DEFAULT_MAX_OVERFLOW_PAGES,
};
pub use page::{BUCKET_CAPACITY, BUCKET_HEADER_SIZE, MAX_SUPPORTED_DEPTH, RID_SIZE};
pub use scan::HashScan;
pub use summary::IndexSummary;

pub trait Index {
    type Scan<'a>: Iterator<Item = IndexResult<Rid>>
    where
        Self: 'a;

    fn insert_entry(&self, key: &SearchKey, rid: Rid) -> IndexResult<()>;
    fn delete_entry(&self, key: &SearchKey, rid: Rid) -> IndexResult<()>;
    fn open_scan(&self, key: &SearchKey) -> Self::Scan<'_>;
}
