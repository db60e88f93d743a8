// MODULE DECLARATIONS
// These files exist internally but we decide what to expose below.
mod buffer;
mod disk;
mod page;
mod registry;
mod replacer;

// PUBLIC API EXPORTS
// Users of this crate (the index layer and the driver) access these directly.
pub use buffer::{BufferPoolError, BufferPoolManager, BufferPoolResult, BufferPoolStats, PageGuard};
pub use disk::{DiskManager, INVALID_PAGE_ID, PAGE_SIZE, PageId};
pub use page::Page;
pub use registry::{MAX_FILE_NAME_LEN, RegistryError};
pub use replacer::{FrameId, LRUReplacer, Replacer};
