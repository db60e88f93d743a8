#![allow(dead_code)]

use std::collections::HashSet;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storage::{BufferPoolManager, DiskManager};
use tempfile::TempDir;

pub const SEED: u64 = 0x5eed_2024;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Buffer pool over a fresh file. Keep the `TempDir` alive for the test.
pub fn temp_buffer_pool(pool_size: usize) -> (TempDir, BufferPoolManager) {
    init_logging();
    let dir = TempDir::new().expect("temp dir create failed");
    let path = dir.path().join("index.db");
    let disk_manager = DiskManager::open(&path).expect("open disk manager");
    (dir, BufferPoolManager::new(disk_manager, pool_size))
}

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

/// Email-looking key: letters, a silly middle, a digit run, and a `.edu`
/// domain. Same format as `db::keys::KeyGenerator::email`; `db` depends on
/// this crate, so the generator is kept here for the index tests.
pub fn rand_email(rng: &mut StdRng) -> String {
    let mut email = letters(rng, 4..=8);
    email.push_str(["kid", "grrl", "pie", "izzle"][rng.gen_range(0..4)]);
    for _ in 0..rng.gen_range(2..=5) {
        email.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    email.push('@');
    email.push_str(&letters(rng, 4..=19));
    email.push_str(".edu");
    email
}

fn letters(rng: &mut StdRng, len: RangeInclusive<usize>) -> String {
    let len = rng.gen_range(len);
    (0..len)
        .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
        .collect()
}

pub fn distinct_emails(rng: &mut StdRng, count: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = rand_email(rng);
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

pub fn distinct_ints(rng: &mut StdRng, count: usize) -> Vec<i32> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = rng.gen_range(i32::MIN..=i32::MAX);
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}

/// Floats in [0, 1), distinct by bit pattern.
pub fn distinct_floats(rng: &mut StdRng, count: usize) -> Vec<f32> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = rng.gen_range(0.0f32..1.0);
        if seen.insert(key.to_bits()) {
            keys.push(key);
        }
    }
    keys
}
