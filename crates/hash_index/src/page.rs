//! On-page layout shared by the header, directory, and bucket pages.
//!
//! ```text
//! header     | type | depth | max depth | max overflow | dir pages (u16) | entries (u64) @8
//!            | self page id (u64) @16 | structure version (u64) @24 | dir page ids @32..
//! directory  | type | pad @1..8 | bucket page ids (u64) @8..
//! bucket     | type | local depth | entry count (u16) @2 | used bytes (u16) @4
//!            | overflow page id (u64) @8 | packed (key, rid) entries @16..
//! ```

use common::Rid;
use storage::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

use crate::error::{IndexError, IndexResult};

pub(crate) const PAGE_TYPE_OFFSET: usize = 0;

const PAGE_TYPE_HEADER: u8 = 0x48;
const PAGE_TYPE_DIRECTORY: u8 = 0x44;
const PAGE_TYPE_BUCKET: u8 = 0x42;

pub(crate) const HEADER_DEPTH_OFFSET: usize = 1;
pub(crate) const HEADER_MAX_DEPTH_OFFSET: usize = 2;
pub(crate) const HEADER_MAX_OVERFLOW_OFFSET: usize = 3;
pub(crate) const HEADER_DIR_COUNT_OFFSET: usize = 4;
pub(crate) const HEADER_ENTRY_COUNT_OFFSET: usize = 8;
pub(crate) const HEADER_SELF_OFFSET: usize = 16;
pub(crate) const HEADER_VERSION_OFFSET: usize = 24;
pub(crate) const HEADER_DIR_PAGES_OFFSET: usize = 32;
pub(crate) const MAX_DIRECTORY_PAGES: usize = (PAGE_SIZE - HEADER_DIR_PAGES_OFFSET) / 8;

pub(crate) const DIRECTORY_SLOTS_OFFSET: usize = 8;
pub(crate) const SLOTS_PER_DIRECTORY_PAGE: usize = (PAGE_SIZE - DIRECTORY_SLOTS_OFFSET) / 8;

/// Deepest directory whose slots still fit in `MAX_DIRECTORY_PAGES`.
pub const MAX_SUPPORTED_DEPTH: u8 = 17;

pub(crate) const BUCKET_LOCAL_DEPTH_OFFSET: usize = 1;
pub(crate) const BUCKET_COUNT_OFFSET: usize = 2;
pub(crate) const BUCKET_USED_OFFSET: usize = 4;
pub(crate) const BUCKET_NEXT_OFFSET: usize = 8;
pub const BUCKET_HEADER_SIZE: usize = 16;
pub const BUCKET_CAPACITY: usize = PAGE_SIZE - BUCKET_HEADER_SIZE;
pub const RID_SIZE: usize = Rid::ENCODED_SIZE;

const _: () =
    assert!((1usize << MAX_SUPPORTED_DEPTH) <= MAX_DIRECTORY_PAGES * SLOTS_PER_DIRECTORY_PAGE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageType {
    Header,
    Directory,
    Bucket,
}

impl PageType {
    fn as_byte(self) -> u8 {
        match self {
            PageType::Header => PAGE_TYPE_HEADER,
            PageType::Directory => PAGE_TYPE_DIRECTORY,
            PageType::Bucket => PAGE_TYPE_BUCKET,
        }
    }

    fn from_byte(value: u8) -> Option<Self> {
        match value {
            PAGE_TYPE_HEADER => Some(PageType::Header),
            PAGE_TYPE_DIRECTORY => Some(PageType::Directory),
            PAGE_TYPE_BUCKET => Some(PageType::Bucket),
            _ => None,
        }
    }
}

pub(crate) fn write_page_type(page: &mut Page, page_type: PageType) -> IndexResult<()> {
    write_u8(page, PAGE_TYPE_OFFSET, page_type.as_byte())
}

/// Fails with `Corrupt` unless `page` carries the `expected` type tag.
pub(crate) fn expect_page_type(page: &Page, expected: PageType) -> IndexResult<()> {
    let value = read_u8(page, PAGE_TYPE_OFFSET)?;
    match PageType::from_byte(value) {
        Some(found) if found == expected => Ok(()),
        found => Err(IndexError::Corrupt(format!(
            "page {:?}: expected {:?} page, found {:?} (tag {:#04x})",
            page.page_id(),
            expected,
            found,
            value
        ))),
    }
}

pub(crate) fn page_id_to_option(value: u64) -> Option<PageId> {
    if value == INVALID_PAGE_ID {
        None
    } else {
        Some(value)
    }
}

pub(crate) fn read_u8(page: &Page, offset: usize) -> IndexResult<u8> {
    page.read_u8(offset).ok_or_else(out_of_bounds)
}

pub(crate) fn write_u8(page: &mut Page, offset: usize, value: u8) -> IndexResult<()> {
    write_bytes(page, offset, &[value])
}

pub(crate) fn read_u16(page: &Page, offset: usize) -> IndexResult<u16> {
    page.read_u16(offset).ok_or_else(out_of_bounds)
}

pub(crate) fn write_u16(page: &mut Page, offset: usize, value: u16) -> IndexResult<()> {
    write_bytes(page, offset, &value.to_le_bytes())
}

pub(crate) fn read_u64(page: &Page, offset: usize) -> IndexResult<u64> {
    page.read_u64(offset).ok_or_else(out_of_bounds)
}

pub(crate) fn write_u64(page: &mut Page, offset: usize, value: u64) -> IndexResult<()> {
    write_bytes(page, offset, &value.to_le_bytes())
}

pub(crate) fn read_bytes(page: &Page, offset: usize, len: usize) -> IndexResult<&[u8]> {
    page.read_bytes(offset, len).ok_or_else(out_of_bounds)
}

pub(crate) fn write_bytes(page: &mut Page, offset: usize, bytes: &[u8]) -> IndexResult<()> {
    if page.write_bytes(offset, bytes) {
        Ok(())
    } else {
        Err(out_of_bounds())
    }
}

fn out_of_bounds() -> IndexError {
    IndexError::Corrupt("page access out of bounds".to_string())
}
