use super::helpers::{open_store, tier1_runs, wait_for};
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Explicit flush ---------------------

#[test]
fn flush_creates_a_tier1_run() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir.path().join("db"), 1 << 20, 10)?;

    store.put(b"a", b"1")?;
    store.flush()?;

    assert_eq!(store.run_counts(), vec![1]);
    assert_eq!(store.mem_entries(), 0);
    Ok(())
}

#[test]
fn flush_of_empty_store_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir.path().join("db"), 1 << 20, 10)?;

    store.flush()?;
    assert_eq!(store.tier_count(), 0);
    assert!(store.run_counts().is_empty());
    Ok(())
}

#[test]
fn each_flush_adds_a_run() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir.path().join("db"), 1 << 20, 10)?;

    for round in 0..3u32 {
        store.put(format!("k{round}").as_bytes(), b"v")?;
        store.flush()?;
    }

    assert_eq!(store.run_counts(), vec![3]);
    for round in 0..3u32 {
        assert!(store.get(format!("k{round}").as_bytes())?.is_some());
    }
    Ok(())
}

#[test]
fn flush_rotates_the_wal() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir.path().join("db"), 1 << 20, 10)?;

    store.put(b"k", b"v")?;
    let before = std::fs::metadata(store.root().join("WAL.bin"))?.len();
    assert!(before > 0);

    store.flush()?;

    // Fresh empty log, no staging leftovers.
    assert_eq!(std::fs::metadata(store.root().join("WAL.bin"))?.len(), 0);
    assert!(!store.root().join("WAL_temp.bin").exists());
    Ok(())
}

#[test]
fn run_files_use_the_tier_naming_scheme() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir.path().join("db"), 1 << 20, 10)?;

    store.put(b"a", b"1")?;
    store.flush()?;
    store.put(b"b", b"2")?;
    store.flush()?;

    let tier1 = store.root().join("Tier_1");
    for name in ["1.bin", "metadata1.bin", "2.bin", "metadata2.bin"] {
        assert!(tier1.join(name).exists(), "{name} missing");
    }
    assert!(!tier1.join("temp.bin").exists());
    assert!(!tier1.join("temp1.bin").exists());
    Ok(())
}

// --------------------- Threshold-driven flush ---------------------

#[test]
fn crossing_the_threshold_flushes_in_the_background() -> Result<()> {
    let dir = tempdir()?;
    // ~1 KiB threshold, 100-byte values: a handful of puts per flush.
    let store = open_store(&dir.path().join("db"), 1024, 100)?;

    for i in 0..60u32 {
        let key = format!("key{:04}", i).into_bytes();
        store.put(&key, &vec![b'v'; 100])?;
    }

    wait_for(|| tier1_runs(&store) >= 2, "two background flushes");

    // Every key is still readable, wherever it landed.
    for i in 0..60u32 {
        let key = format!("key{:04}", i).into_bytes();
        assert!(store.get(&key)?.is_some(), "key{:04} lost", i);
    }
    Ok(())
}

#[test]
fn flush_crossing_preserves_latest_values() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(&dir.path().join("db"), 512, 100)?;

    for i in 0..40u32 {
        let key = format!("k{:02}", i % 10).into_bytes();
        let val = format!("v{}", i).into_bytes();
        store.put(&key, &val)?;
    }
    store.flush()?;

    // Only the newest write of each key is visible.
    for i in 0..10u32 {
        let key = format!("k{:02}", i).into_bytes();
        let expect = format!("v{}", 30 + i).into_bytes();
        assert_eq!(store.get(&key)?, Some(expect));
    }
    Ok(())
}
