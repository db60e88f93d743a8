use common::Rid;
use storage::BufferPoolError;
use thiserror::Error;

use crate::key::SearchKey;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid key: encoded size {size} exceeds maximum {max}")]
    InvalidKey { size: usize, max: usize },
    #[error("entry not found: key {key} with rid {rid}")]
    EntryNotFound { key: SearchKey, rid: Rid },
    #[error("scan exhausted")]
    ScanExhausted,
    #[error("named resource error: {0}")]
    NamedResource(String),
    #[error("invalid index options: {0}")]
    InvalidOptions(String),
    #[error("malformed key bytes: {0}")]
    MalformedKey(String),
    #[error("index corrupted: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Storage(#[from] BufferPoolError),
}

impl IndexError {
    /// Caller supplied an argument the index cannot accept: an oversized key
    /// or a (key, rid) pair that was never indexed.
    pub fn is_illegal_argument(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidKey { .. } | IndexError::EntryNotFound { .. }
        )
    }

    /// Caller used an object in a state that does not allow the call.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, IndexError::ScanExhausted)
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
