//! The build / scan / delete / drop exercise run by the `hashix` binary.

use std::io::Write;

use anyhow::{Context, Result, bail, ensure};
use hash_index::{HashIndex, Index, IndexError, Rid, SearchKey};
use storage::{BufferPoolManager, BufferPoolStats, PAGE_SIZE};

use crate::keys::{KeyGenerator, KeyKind};

const TEMP_INDEX_ENTRIES: usize = 10;

/// Buffer pool counter deltas for one named phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub label: String,
    pub stats: BufferPoolStats,
}

struct PhaseRecorder<'a> {
    pool: &'a BufferPoolManager,
    mark: BufferPoolStats,
    reports: Vec<PhaseReport>,
}

impl<'a> PhaseRecorder<'a> {
    fn new(pool: &'a BufferPoolManager) -> Result<Self> {
        Ok(Self {
            pool,
            mark: pool.stats()?,
            reports: Vec::new(),
        })
    }

    fn finish(&mut self, label: impl Into<String>) -> Result<()> {
        let now = self.pool.stats()?;
        self.reports.push(PhaseReport {
            label: label.into(),
            stats: now.since(&self.mark),
        });
        self.mark = now;
        Ok(())
    }

    fn into_reports(self) -> Vec<PhaseReport> {
        self.reports
    }
}

fn rid_for(i: usize) -> Rid {
    Rid::new(i as u64, 0)
}

fn scan_contains(index: &HashIndex, key: &SearchKey, rid: Rid) -> Result<bool> {
    let mut scan = index.open_scan(key);
    let mut found = false;
    while scan.has_next()? {
        if scan.get_next()? == rid {
            found = true;
        }
    }
    scan.close();
    Ok(found)
}

fn ensure_no_pins(pool: &BufferPoolManager) -> Result<()> {
    let pinned = pool.pinned_frames()?;
    ensure!(pinned == 0, "{} frames still pinned", pinned);
    Ok(())
}

/// Small temporary index: ten integer keys, a scan per key, then drop.
pub fn run_temp(
    pool: &BufferPoolManager,
    seed: u64,
    out: &mut dyn Write,
) -> Result<Vec<PhaseReport>> {
    let mut recorder = PhaseRecorder::new(pool)?;

    writeln!(out, "  ~> creating temp index...")?;
    let index = HashIndex::temporary(pool.clone()).context("create temporary index")?;
    let mut keys = KeyGenerator::new(seed);
    for i in 0..TEMP_INDEX_ENTRIES {
        index.insert_entry(&keys.next_key(KeyKind::Integer), rid_for(i))?;
    }
    recorder.finish("create")?;

    writeln!(out, "  ~> scanning temp index...")?;
    let mut keys = KeyGenerator::new(seed);
    for i in 0..TEMP_INDEX_ENTRIES {
        let key = keys.next_key(KeyKind::Integer);
        // Left open on purpose: dropping a scan must not leak a pin.
        let scan = index.open_scan(&key);
        let mut found = false;
        for rid in scan {
            found |= rid? == rid_for(i);
        }
        ensure!(found, "key {} not found in scan", key);
    }
    recorder.finish("scan")?;

    writeln!(out, "  ~> deleting temp index...")?;
    drop(index);
    recorder.finish("delete")?;
    ensure_no_pins(pool)?;
    Ok(recorder.into_reports())
}

pub fn index_name(kind: KeyKind) -> String {
    let suffix = match kind {
        KeyKind::Integer => 1,
        KeyKind::Float => 2,
        KeyKind::String => 3,
    };
    format!("IX_Customers{}", suffix)
}

/// Persistent index over `entries` random keys: build, scan every other
/// entry, delete every other entry, then reopen by name and delete the file.
pub fn run_build(
    pool: &BufferPoolManager,
    kind: KeyKind,
    entries: usize,
    seed: u64,
    out: &mut dyn Write,
) -> Result<Vec<PhaseReport>> {
    let name = index_name(kind);
    if pool.get_file_entry(&name)?.is_some() {
        log::warn!("removing leftover index '{}'", name);
        HashIndex::open(pool.clone(), &name)?.delete_file()?;
    }
    let mut recorder = PhaseRecorder::new(pool)?;

    writeln!(out, "  ~> building an index of {} {}s...", entries, kind)?;
    let index = HashIndex::open(pool.clone(), &name).with_context(|| format!("open {}", name))?;
    let mut keys = KeyGenerator::new(seed);
    for i in 0..entries {
        index.insert_entry(&keys.next_key(kind), rid_for(i))?;
    }
    recorder.finish(format!("ins{}", kind))?;
    writeln!(out, "{}", index.summary()?)?;

    writeln!(out, "  ~> scanning every other entry...")?;
    let mut keys = KeyGenerator::new(seed);
    for i in (0..entries).step_by(2) {
        let key = keys.next_key(kind);
        keys.next_key(kind);
        ensure!(
            scan_contains(&index, &key, rid_for(i))?,
            "key {} with rid {} not found in scan",
            key,
            rid_for(i)
        );
    }
    recorder.finish(format!("scan{}", kind))?;

    writeln!(out, "  ~> deleting every other entry...")?;
    let mut keys = KeyGenerator::new(seed);
    for i in (0..entries).step_by(2) {
        let key = keys.next_key(kind);
        keys.next_key(kind);
        index.delete_entry(&key, rid_for(i))?;
    }
    recorder.finish(format!("del{}", kind))?;
    writeln!(out, "{}", index.summary()?)?;
    drop(index);

    writeln!(out, "  ~> deleting the index file...")?;
    let byebye = HashIndex::open(pool.clone(), &name)?;
    byebye.delete_file()?;
    recorder.finish(format!("drop{}", kind))?;
    ensure_no_pins(pool)?;
    Ok(recorder.into_reports())
}

/// Misuse that must be rejected without touching the index.
pub fn run_errors(
    pool: &BufferPoolManager,
    seed: u64,
    out: &mut dyn Write,
) -> Result<Vec<PhaseReport>> {
    let mut recorder = PhaseRecorder::new(pool)?;

    writeln!(out, "  ~> creating temporary index...")?;
    let index = HashIndex::temporary(pool.clone())?;
    recorder.finish("create")?;

    writeln!(out, "  ~> inserting invalid entry...")?;
    let oversized = SearchKey::String("\0".repeat(PAGE_SIZE));
    expect_failure(
        index.insert_entry(&oversized, Rid::default()),
        IndexError::is_illegal_argument,
        out,
    )?;

    writeln!(out, "  ~> deleting invalid entry...")?;
    let key = KeyGenerator::new(seed).next_key(KeyKind::Integer);
    expect_failure(
        index.delete_entry(&key, Rid::default()),
        IndexError::is_illegal_argument,
        out,
    )?;

    writeln!(out, "  ~> next in completed scan...")?;
    let mut scan = index.open_scan(&key);
    scan.has_next()?;
    expect_failure(scan.get_next(), IndexError::is_illegal_state, out)?;
    recorder.finish("errors")?;

    writeln!(out, "  ~> printing empty index...")?;
    writeln!(out, "{}", index.summary()?)?;
    recorder.finish("print")?;

    writeln!(out, "  ~> deleting empty index...")?;
    drop(scan);
    drop(index);
    recorder.finish("delete")?;
    ensure_no_pins(pool)?;
    Ok(recorder.into_reports())
}

fn expect_failure<T>(
    result: Result<T, IndexError>,
    expected: fn(&IndexError) -> bool,
    out: &mut dyn Write,
) -> Result<()> {
    match result {
        Ok(_) => bail!("operation succeeded but should have failed"),
        Err(err) if expected(&err) => {
            writeln!(out, "     *** failed as expected: {}", err)?;
            Ok(())
        }
        Err(err) => Err(err).context("failed with the wrong kind of error"),
    }
}
