mod common;

use common::{distinct_emails, distinct_floats, distinct_ints, seeded_rng, temp_buffer_pool};
use hash_index::key::{max_encoded_size, max_string_len};
use hash_index::{HashIndex, Index, IndexError, IndexResult, Rid, SearchKey};

fn scan_sorted(index: &HashIndex, key: &SearchKey) -> IndexResult<Vec<Rid>> {
    let mut rids = index.open_scan(key).collect::<IndexResult<Vec<_>>>()?;
    rids.sort();
    Ok(rids)
}

#[test]
fn ten_integer_keys_in_a_temporary_index() -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(32);
    let index = HashIndex::new(bpm, None)?;
    for i in 0..10 {
        index.insert_entry(&SearchKey::Integer(i), Rid::new(i as u64, 0))?;
    }
    for i in 0..10 {
        let mut scan = index.open_scan(&SearchKey::Integer(i));
        assert!(scan.has_next()?);
        assert_eq!(scan.get_next()?, Rid::new(i as u64, 0));
        assert!(!scan.has_next()?);
        scan.close();
    }
    Ok(())
}

#[test]
fn ix_test_string_keys_survive_reopen_by_name() -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(32);
    let mut rng = seeded_rng();
    let keys = distinct_emails(&mut rng, 3000);
    {
        let index = HashIndex::open(bpm.clone(), "IX_Test")?;
        for (slot, key) in keys.iter().enumerate() {
            index.insert_entry(&SearchKey::from(key.as_str()), Rid::new(7, slot as u32))?;
        }
        assert_eq!(index.len()?, 3000);
    }

    let index = HashIndex::open(bpm.clone(), "IX_Test")?;
    assert_eq!(index.len()?, 3000);
    for (slot, key) in keys.iter().enumerate() {
        assert_eq!(
            scan_sorted(&index, &SearchKey::from(key.as_str()))?,
            vec![Rid::new(7, slot as u32)]
        );
    }
    index.delete_file()?;
    assert!(bpm.get_file_entry("IX_Test")?.is_none());
    assert_eq!(bpm.pinned_frames()?, 0);
    Ok(())
}

#[test]
fn scan_on_empty_index_is_exhausted() -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(32);
    let index = HashIndex::temporary(bpm)?;
    let mut scan = index.open_scan(&SearchKey::from("nobody@nowhere.org"));
    assert!(!scan.has_next()?);
    assert!(matches!(scan.get_next(), Err(IndexError::ScanExhausted)));
    Ok(())
}

#[test]
fn keys_at_the_size_bound() -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(32);
    let index = HashIndex::temporary(bpm)?;
    let exact = SearchKey::String("e".repeat(max_string_len()));
    assert_eq!(exact.encoded_len(), max_encoded_size());
    index.insert_entry(&exact, Rid::new(1, 1))?;
    assert_eq!(scan_sorted(&index, &exact)?, vec![Rid::new(1, 1)]);

    let over = SearchKey::String("e".repeat(max_string_len() + 1));
    let err = index.insert_entry(&over, Rid::new(1, 2)).unwrap_err();
    assert!(matches!(err, IndexError::InvalidKey { .. }));
    assert_eq!(index.len()?, 1);
    Ok(())
}

#[test]
fn delete_then_scan_keeps_other_rids_of_the_key() -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(32);
    let index = HashIndex::temporary(bpm)?;
    for i in 0..500 {
        let key = SearchKey::Integer(i);
        index.insert_entry(&key, Rid::new(1, i as u32))?;
        index.insert_entry(&key, Rid::new(2, i as u32))?;
    }
    for i in 0..500 {
        index.delete_entry(&SearchKey::Integer(i), Rid::new(1, i as u32))?;
    }
    for i in 0..500 {
        assert_eq!(
            scan_sorted(&index, &SearchKey::Integer(i))?,
            vec![Rid::new(2, i as u32)]
        );
    }
    assert_eq!(index.len()?, 500);
    Ok(())
}

#[test]
fn insert_delete_cycles_do_not_leak_pages() -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(16);
    let baseline = bpm.live_page_count()?;
    let index = HashIndex::temporary(bpm.clone())?;
    let mut rng = seeded_rng();
    let keys = distinct_ints(&mut rng, 1500);
    for _ in 0..3 {
        for (slot, key) in keys.iter().enumerate() {
            index.insert_entry(&SearchKey::Integer(*key), Rid::new(3, slot as u32))?;
        }
        for (slot, key) in keys.iter().enumerate() {
            index.delete_entry(&SearchKey::Integer(*key), Rid::new(3, slot as u32))?;
        }
        let summary = index.summary()?;
        assert_eq!(summary.entries, 0);
        assert_eq!(summary.overflow_pages, 0);
        assert_eq!(bpm.live_page_count()?, baseline + summary.total_pages());
        assert_eq!(bpm.pinned_frames()?, 0);
    }
    drop(index);
    assert_eq!(bpm.live_page_count()?, baseline);
    Ok(())
}

/// Builds the index, scans every other key, deletes every other key, and
/// checks that exactly the survivors remain.
fn every_other_workload(keys: Vec<SearchKey>) -> IndexResult<()> {
    let (_dir, bpm) = temp_buffer_pool(32);
    let index = HashIndex::temporary(bpm.clone())?;
    for (slot, key) in keys.iter().enumerate() {
        index.insert_entry(key, Rid::new(11, slot as u32))?;
    }
    for (slot, key) in keys.iter().enumerate().step_by(2) {
        assert_eq!(scan_sorted(&index, key)?, vec![Rid::new(11, slot as u32)]);
    }
    for (slot, key) in keys.iter().enumerate().step_by(2) {
        index.delete_entry(key, Rid::new(11, slot as u32))?;
    }
    for (slot, key) in keys.iter().enumerate() {
        let rids = scan_sorted(&index, key)?;
        if slot % 2 == 0 {
            assert!(rids.is_empty(), "deleted key {} still found", key);
        } else {
            assert_eq!(rids, vec![Rid::new(11, slot as u32)]);
        }
    }
    assert_eq!(index.len()?, (keys.len() / 2) as u64);
    assert_eq!(bpm.pinned_frames()?, 0);
    Ok(())
}

#[test]
fn every_other_workload_with_integer_keys() -> IndexResult<()> {
    let keys = distinct_ints(&mut seeded_rng(), 3000);
    every_other_workload(keys.into_iter().map(SearchKey::from).collect())
}

#[test]
fn every_other_workload_with_float_keys() -> IndexResult<()> {
    let keys = distinct_floats(&mut seeded_rng(), 3000);
    every_other_workload(keys.into_iter().map(SearchKey::from).collect())
}

#[test]
fn every_other_workload_with_string_keys() -> IndexResult<()> {
    let keys = distinct_emails(&mut seeded_rng(), 3000);
    every_other_workload(keys.into_iter().map(SearchKey::from).collect())
}
