use db::keys::{KeyGenerator, KeyKind};
use hash_index::{HashIndex, Index, Rid, SearchKey};
use storage::{BufferPoolManager, DiskManager};
use tempfile::TempDir;

fn open_pool(path: &std::path::Path) -> BufferPoolManager {
    let disk_manager = DiskManager::open(path).unwrap();
    BufferPoolManager::new(disk_manager, 32)
}

#[test]
fn test_named_index_survives_reopening_the_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let mut keys = KeyGenerator::new(11);
    let inserted: Vec<_> = (0..1000).map(|_| keys.next_key(KeyKind::String)).collect();

    {
        let pool = open_pool(&db_path);
        let index = HashIndex::open(pool.clone(), "IX_Test").unwrap();
        for (i, key) in inserted.iter().enumerate() {
            index.insert_entry(key, Rid::new(i as u64, 0)).unwrap();
        }
        drop(index);
        pool.flush_all_pages().unwrap();
    }

    let pool = open_pool(&db_path);
    let index = HashIndex::open(pool.clone(), "IX_Test").unwrap();
    assert_eq!(index.len().unwrap(), 1000);
    for (i, key) in inserted.iter().enumerate() {
        let rids = index
            .open_scan(key)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(
            rids.contains(&Rid::new(i as u64, 0)),
            "rid {} missing for key {}",
            i,
            key
        );
    }
}

#[test]
fn test_deleted_index_leaves_no_pages_behind() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let pool = open_pool(&db_path);
        let index = HashIndex::open(pool.clone(), "IX_Gone").unwrap();
        let mut keys = KeyGenerator::new(5);
        for i in 0..2000 {
            index
                .insert_entry(&keys.next_key(KeyKind::Integer), Rid::new(i, 0))
                .unwrap();
        }
        index.delete_file().unwrap();
        pool.flush_all_pages().unwrap();
    }

    let pool = open_pool(&db_path);
    assert!(pool.get_file_entry("IX_Gone").unwrap().is_none());
    assert_eq!(pool.live_page_count().unwrap(), 0);

    // Freed pages are reused before the file grows.
    let pages_before = DiskManager::open(&db_path).unwrap().get_next_page_id();
    let index = HashIndex::temporary(pool.clone()).unwrap();
    drop(index);
    pool.flush_all_pages().unwrap();
    drop(pool);
    assert_eq!(
        DiskManager::open(&db_path).unwrap().get_next_page_id(),
        pages_before
    );
}

#[test]
fn test_two_indexes_share_one_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let pool = open_pool(&db_path);
        let ints = HashIndex::open(pool.clone(), "IX_Ints").unwrap();
        let floats = HashIndex::open(pool.clone(), "IX_Floats").unwrap();
        for i in 0..300 {
            ints.insert_entry(&(i as i32).into(), Rid::new(1, i)).unwrap();
            floats
                .insert_entry(&(i as f32 / 300.0).into(), Rid::new(2, i))
                .unwrap();
        }
        drop((ints, floats));
        pool.flush_all_pages().unwrap();
    }

    let pool = open_pool(&db_path);
    let ints = HashIndex::open(pool.clone(), "IX_Ints").unwrap();
    let floats = HashIndex::open(pool.clone(), "IX_Floats").unwrap();
    assert_ne!(ints.header_page_id(), floats.header_page_id());
    let rids = ints
        .open_scan(&SearchKey::Integer(42))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rids, vec![Rid::new(1, 42)]);
    let rids = floats
        .open_scan(&SearchKey::Float(42.0 / 300.0))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rids, vec![Rid::new(2, 42)]);
}
