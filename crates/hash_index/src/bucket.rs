//! Bucket pages: a packed run of (encoded key, RID) entries behind a small
//! header, plus the link to the next overflow page of the same chain.

use common::Rid;
use storage::{Page, PageId, INVALID_PAGE_ID};

use crate::error::{IndexError, IndexResult};
use crate::key::encoded_len_at;
use crate::page::{
    expect_page_type, page_id_to_option, read_bytes, read_u16, read_u64, read_u8, write_bytes,
    write_page_type, write_u16, write_u64, write_u8, PageType, BUCKET_CAPACITY,
    BUCKET_COUNT_OFFSET, BUCKET_HEADER_SIZE, BUCKET_LOCAL_DEPTH_OFFSET, BUCKET_NEXT_OFFSET,
    BUCKET_USED_OFFSET, RID_SIZE,
};

/// One stored entry, key still in canonical encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BucketEntry {
    pub key: Vec<u8>,
    pub rid: Rid,
}

impl BucketEntry {
    pub fn stored_len(&self) -> usize {
        self.key.len() + RID_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BucketHeader {
    pub local_depth: u8,
    pub count: u16,
    pub used: u16,
    pub next: Option<PageId>,
}

impl BucketHeader {
    pub fn free_space(&self) -> usize {
        BUCKET_CAPACITY - self.used as usize
    }
}

pub(crate) fn init_bucket(
    page: &mut Page,
    local_depth: u8,
    next: Option<PageId>,
) -> IndexResult<()> {
    page.data_mut().fill(0);
    write_page_type(page, PageType::Bucket)?;
    write_u8(page, BUCKET_LOCAL_DEPTH_OFFSET, local_depth)?;
    write_u16(page, BUCKET_COUNT_OFFSET, 0)?;
    write_u16(page, BUCKET_USED_OFFSET, 0)?;
    set_next(page, next)
}

pub(crate) fn read_header(page: &Page) -> IndexResult<BucketHeader> {
    expect_page_type(page, PageType::Bucket)?;
    let header = BucketHeader {
        local_depth: read_u8(page, BUCKET_LOCAL_DEPTH_OFFSET)?,
        count: read_u16(page, BUCKET_COUNT_OFFSET)?,
        used: read_u16(page, BUCKET_USED_OFFSET)?,
        next: page_id_to_option(read_u64(page, BUCKET_NEXT_OFFSET)?),
    };
    if header.used as usize > BUCKET_CAPACITY {
        return Err(IndexError::Corrupt(format!(
            "bucket {:?} claims {} used bytes",
            page.page_id(),
            header.used
        )));
    }
    Ok(header)
}

pub(crate) fn set_next(page: &mut Page, next: Option<PageId>) -> IndexResult<()> {
    write_u64(page, BUCKET_NEXT_OFFSET, next.unwrap_or(INVALID_PAGE_ID))
}

/// Appends an entry if the page has room. `Ok(false)` means the page is full
/// and was left untouched.
pub(crate) fn insert(page: &mut Page, key: &[u8], rid: Rid) -> IndexResult<bool> {
    let header = read_header(page)?;
    let needed = key.len() + RID_SIZE;
    if needed > header.free_space() {
        return Ok(false);
    }
    let offset = BUCKET_HEADER_SIZE + header.used as usize;
    write_bytes(page, offset, key)?;
    write_bytes(page, offset + key.len(), &rid.to_bytes())?;
    write_u16(page, BUCKET_COUNT_OFFSET, header.count + 1)?;
    write_u16(page, BUCKET_USED_OFFSET, header.used + needed as u16)?;
    Ok(true)
}

/// Byte offset of the first entry matching both `key` and `rid`.
pub(crate) fn find(page: &Page, key: &[u8], rid: Rid) -> IndexResult<Option<usize>> {
    let mut found = None;
    visit_entries(page, |offset, entry_key, entry_rid| {
        if entry_key == key && entry_rid == rid {
            found = Some(offset);
            return false;
        }
        true
    })?;
    Ok(found)
}

/// Removes the entry stored at `offset` and closes the gap it leaves.
/// Returns the header as it reads after the removal.
pub(crate) fn remove_at(page: &mut Page, offset: usize) -> IndexResult<BucketHeader> {
    let header = read_header(page)?;
    let end = BUCKET_HEADER_SIZE + header.used as usize;
    if offset < BUCKET_HEADER_SIZE || offset >= end {
        return Err(IndexError::Corrupt(format!(
            "entry offset {} outside bucket data",
            offset
        )));
    }
    let key_len = encoded_len_at(read_bytes(page, offset, end - offset)?)?;
    let entry_len = key_len + RID_SIZE;
    if !page.move_bytes(offset + entry_len, offset, end - offset - entry_len) {
        return Err(IndexError::Corrupt("bucket compaction out of bounds".to_string()));
    }
    write_bytes(page, end - entry_len, &vec![0u8; entry_len])?;
    let updated = BucketHeader {
        count: header.count - 1,
        used: header.used - entry_len as u16,
        ..header
    };
    write_u16(page, BUCKET_COUNT_OFFSET, updated.count)?;
    write_u16(page, BUCKET_USED_OFFSET, updated.used)?;
    Ok(updated)
}

/// All live entries on this page, in storage order.
pub(crate) fn entries(page: &Page) -> IndexResult<Vec<BucketEntry>> {
    let mut entries = Vec::new();
    visit_entries(page, |_, key, rid| {
        entries.push(BucketEntry {
            key: key.to_vec(),
            rid,
        });
        true
    })?;
    Ok(entries)
}

/// RIDs of every entry whose key equals `key`, plus the overflow link.
pub(crate) fn matching_rids(page: &Page, key: &[u8]) -> IndexResult<(Vec<Rid>, Option<PageId>)> {
    let header = read_header(page)?;
    let mut rids = Vec::new();
    visit_entries(page, |_, entry_key, rid| {
        if entry_key == key {
            rids.push(rid);
        }
        true
    })?;
    Ok((rids, header.next))
}

/// Rewrites the page to hold exactly `entries`.
pub(crate) fn write_entries(
    page: &mut Page,
    local_depth: u8,
    next: Option<PageId>,
    entries: &[BucketEntry],
) -> IndexResult<()> {
    init_bucket(page, local_depth, next)?;
    for entry in entries {
        if !insert(page, &entry.key, entry.rid)? {
            return Err(IndexError::Corrupt(
                "bucket rewrite overflowed its page".to_string(),
            ));
        }
    }
    Ok(())
}

/// Groups `entries` into consecutive page-sized runs, preserving order.
pub(crate) fn pack(entries: Vec<BucketEntry>) -> Vec<Vec<BucketEntry>> {
    let mut pages: Vec<Vec<BucketEntry>> = Vec::new();
    let mut used = 0;
    for entry in entries {
        let len = entry.stored_len();
        match pages.last_mut() {
            Some(current) if used + len <= BUCKET_CAPACITY => {
                used += len;
                current.push(entry);
            }
            _ => {
                used = len;
                pages.push(vec![entry]);
            }
        }
    }
    pages
}

/// Calls `visit(offset, key, rid)` per entry until it returns `false`.
fn visit_entries(
    page: &Page,
    mut visit: impl FnMut(usize, &[u8], Rid) -> bool,
) -> IndexResult<()> {
    let header = read_header(page)?;
    let end = BUCKET_HEADER_SIZE + header.used as usize;
    let mut offset = BUCKET_HEADER_SIZE;
    for _ in 0..header.count {
        let key_len = encoded_len_at(read_bytes(page, offset, end.saturating_sub(offset))?)?;
        let key = read_bytes(page, offset, key_len)?;
        let rid_bytes = read_bytes(page, offset + key_len, RID_SIZE)?;
        let rid = Rid::from_bytes(rid_bytes)
            .ok_or_else(|| IndexError::Corrupt("truncated rid".to_string()))?;
        if offset + key_len + RID_SIZE > end {
            return Err(IndexError::Corrupt(format!(
                "bucket {:?} entry runs past used space",
                page.page_id()
            )));
        }
        if !visit(offset, key, rid) {
            break;
        }
        offset += key_len + RID_SIZE;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{max_encoded_size, SearchKey};

    fn delete(page: &mut Page, key: &[u8], rid: Rid) -> bool {
        match find(page, key, rid).unwrap() {
            Some(offset) => {
                remove_at(page, offset).unwrap();
                true
            }
            None => false,
        }
    }

    fn empty_bucket() -> Page {
        let mut page = Page::new();
        init_bucket(&mut page, 3, None).unwrap();
        page
    }

    fn encoded(key: impl Into<SearchKey>) -> Vec<u8> {
        key.into().encode().unwrap()
    }

    #[test]
    fn insert_then_list_in_storage_order() {
        let mut page = empty_bucket();
        assert!(insert(&mut page, &encoded(7), Rid::new(1, 0)).unwrap());
        assert!(insert(&mut page, &encoded("seven"), Rid::new(2, 1)).unwrap());
        assert!(insert(&mut page, &encoded(7), Rid::new(3, 0)).unwrap());

        let listed = entries(&page).unwrap();
        let rids: Vec<Rid> = listed.iter().map(|entry| entry.rid).collect();
        assert_eq!(rids, vec![Rid::new(1, 0), Rid::new(2, 1), Rid::new(3, 0)]);

        let header = read_header(&page).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.local_depth, 3);
        assert_eq!(header.used as usize, 5 + 12 + 8 + 12 + 5 + 12);
    }

    #[test]
    fn full_page_rejects_without_mutation() {
        let mut page = empty_bucket();
        let mut inserted = 0;
        while insert(&mut page, &encoded(inserted), Rid::new(inserted as u64, 0)).unwrap() {
            inserted += 1;
        }
        assert_eq!(inserted as usize, BUCKET_CAPACITY / (5 + RID_SIZE));
        let before = *page.data();
        assert!(!insert(&mut page, &encoded(-1), Rid::new(9, 9)).unwrap());
        assert_eq!(*page.data(), before);
    }

    #[test]
    fn largest_key_fills_exactly_one_page() {
        let mut page = empty_bucket();
        let key = vec![3u8]
            .into_iter()
            .chain(((max_encoded_size() - 3) as u16).to_le_bytes())
            .chain(std::iter::repeat(b'x').take(max_encoded_size() - 3))
            .collect::<Vec<u8>>();
        assert!(insert(&mut page, &key, Rid::new(1, 1)).unwrap());
        assert_eq!(read_header(&page).unwrap().free_space(), 0);
        assert!(!insert(&mut page, &encoded(1), Rid::new(1, 2)).unwrap());
    }

    #[test]
    fn delete_removes_first_exact_match_and_compacts() {
        let mut page = empty_bucket();
        insert(&mut page, &encoded("a"), Rid::new(1, 0)).unwrap();
        insert(&mut page, &encoded("b"), Rid::new(2, 0)).unwrap();
        insert(&mut page, &encoded("a"), Rid::new(1, 0)).unwrap();
        insert(&mut page, &encoded("c"), Rid::new(3, 0)).unwrap();

        assert!(!delete(&mut page, &encoded("a"), Rid::new(2, 0)));
        assert!(delete(&mut page, &encoded("a"), Rid::new(1, 0)));

        let listed = entries(&page).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].key, encoded("b"));
        assert_eq!(listed[1].key, encoded("a"));
        assert_eq!(listed[2].key, encoded("c"));

        let (rids, next) = matching_rids(&page, &encoded("a")).unwrap();
        assert_eq!(rids, vec![Rid::new(1, 0)]);
        assert_eq!(next, None);
    }

    #[test]
    fn deleting_everything_leaves_an_empty_zeroed_page() {
        let mut page = empty_bucket();
        set_next(&mut page, Some(44)).unwrap();
        insert(&mut page, &encoded(1.5f32), Rid::new(1, 0)).unwrap();
        insert(&mut page, &encoded(2.5f32), Rid::new(2, 0)).unwrap();
        assert!(delete(&mut page, &encoded(2.5f32), Rid::new(2, 0)));
        assert!(delete(&mut page, &encoded(1.5f32), Rid::new(1, 0)));

        let header = read_header(&page).unwrap();
        assert_eq!((header.count, header.used), (0, 0));
        assert_eq!(header.next, Some(44));
        assert!(page.data()[BUCKET_HEADER_SIZE..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn pack_splits_into_page_sized_runs() {
        let entries: Vec<BucketEntry> = (0..600)
            .map(|value| BucketEntry {
                key: encoded(value),
                rid: Rid::new(value as u64, 0),
            })
            .collect();
        let per_page = BUCKET_CAPACITY / (5 + RID_SIZE);
        let pages = pack(entries);
        assert_eq!(pages.len(), 600_usize.div_ceil(per_page));
        assert_eq!(pages[0].len(), per_page);
        assert_eq!(pages.iter().map(Vec::len).sum::<usize>(), 600);
        assert!(pack(Vec::new()).is_empty());
    }

    #[test]
    fn non_bucket_page_is_corrupt() {
        let page = Page::new();
        assert!(matches!(read_header(&page), Err(IndexError::Corrupt(_))));
    }
}
