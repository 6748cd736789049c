use crate::{Store, StoreOptions};
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a store with test-sized thresholds.
pub fn open_store(root: &Path, memtable_bytes: usize, fanout: usize) -> anyhow::Result<Store> {
    Ok(Store::open_with(
        root,
        StoreOptions {
            memtable_bytes,
            fanout_threshold: fanout,
            wal_sync: false,
        },
    )?)
}

/// Polls until `cond` holds; panics after a generous timeout. Background
/// flushes and compactions finish on their own schedule, so assertions on
/// tier shape go through here.
pub fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// First-tier run count, zero when no tier exists yet.
pub fn tier1_runs(store: &Store) -> usize {
    store.run_counts().first().copied().unwrap_or(0)
}
