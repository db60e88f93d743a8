use crate::error::{IndexError, IndexResult};
use crate::page::MAX_SUPPORTED_DEPTH;

pub const DEFAULT_INITIAL_GLOBAL_DEPTH: u8 = 2;
pub const DEFAULT_MAX_GLOBAL_DEPTH: u8 = 16;
pub const DEFAULT_MAX_OVERFLOW_PAGES: u8 = 1;

/// Growth policy of a hash index. Persisted in the header page, so a
/// reopened index keeps the policy it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashIndexOptions {
    /// Directory depth of a freshly created index (2^depth buckets).
    pub initial_global_depth: u8,
    /// The directory never doubles past this depth; full chains grow
    /// overflow pages instead.
    pub max_global_depth: u8,
    /// Overflow pages a chain may hold before a full chain is split
    /// rather than extended.
    pub max_overflow_pages: u8,
}

impl Default for HashIndexOptions {
    fn default() -> Self {
        Self {
            initial_global_depth: DEFAULT_INITIAL_GLOBAL_DEPTH,
            max_global_depth: DEFAULT_MAX_GLOBAL_DEPTH,
            max_overflow_pages: DEFAULT_MAX_OVERFLOW_PAGES,
        }
    }
}

impl HashIndexOptions {
    pub fn validate(&self) -> IndexResult<()> {
        if self.max_global_depth > MAX_SUPPORTED_DEPTH {
            return Err(IndexError::InvalidOptions(format!(
                "max global depth {} exceeds supported {}",
                self.max_global_depth, MAX_SUPPORTED_DEPTH
            )));
        }
        if self.initial_global_depth > self.max_global_depth {
            return Err(IndexError::InvalidOptions(format!(
                "initial global depth {} exceeds max global depth {}",
                self.initial_global_depth, self.max_global_depth
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        HashIndexOptions::default().validate().unwrap();
    }

    #[test]
    fn depth_bounds_are_enforced() {
        let too_deep = HashIndexOptions {
            max_global_depth: MAX_SUPPORTED_DEPTH + 1,
            ..HashIndexOptions::default()
        };
        assert!(matches!(
            too_deep.validate(),
            Err(IndexError::InvalidOptions(_))
        ));

        let inverted = HashIndexOptions {
            initial_global_depth: 5,
            max_global_depth: 4,
            max_overflow_pages: 0,
        };
        assert!(inverted.validate().is_err());
    }
}
