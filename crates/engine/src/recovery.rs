//! Cold-start recovery.
//!
//! Three phases, run from `Store::open_with` before any worker exists:
//!
//! 1. [`load_tiers`] — walk `Tier_1, Tier_2, …`, reopen every sequence-
//!    numbered run pair, rebuild each membership filter by scanning the
//!    files, and sweep leftover temp files from interrupted flushes or
//!    compactions.
//! 2. [`startup_compactions`] — deepest tier first, re-run any compaction
//!    whose fan-out threshold is already met (a crash can leave a tier full
//!    with its merge never committed).
//! 3. [`replay_wal`] — replay the staged WAL(s) and then the active one
//!    into a fresh buffer, rewrite the surviving records into a fresh WAL,
//!    and only then delete the staged files, so a crash straight after
//!    recovery still loses nothing.
//!
//! Corruption anywhere here is fatal: a store that cannot reconstruct its
//! state must not serve traffic.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use buffer::WriteBuffer;
use filter::KeyFilter;
use run::SortedRun;
use wal::{WalReader, WalWriter};

use crate::tier::Tier;
use crate::{
    compaction, tier, Result, Shared, StoreError, StoreOptions, Tier0, WAL_FILE, WAL_STAGED,
    WAL_STAGED1,
};

/// Reopens every tier directory under `root`, in tier order.
pub(crate) fn load_tiers(root: &Path) -> Result<Vec<Arc<Tier>>> {
    let mut tiers = Vec::new();
    let mut id = 1;
    loop {
        let dir = root.join(format!("Tier_{id}"));
        if !dir.is_dir() {
            break;
        }

        let tier = Tier::new(id, dir);
        {
            let mut state = tier.state.write().map_err(|_| StoreError::Poisoned)?;
            let mut seq = 1;
            loop {
                let (data, index) = tier.run_paths(seq);
                if !(data.exists() && index.exists()) {
                    break;
                }
                let run = SortedRun::open(&data, &index).map_err(StoreError::Run)?;
                let filter = run.rebuild_filter().map_err(StoreError::Run)?;
                state.runs.push(run);
                state.filters.push(filter);
                seq += 1;
            }
            log::debug!("loaded Tier_{id}: {} runs", state.runs.len());
        }

        // A crash can strand an uncommitted temp pair; it was never
        // visible, so it is safe to sweep.
        let (temp_data, temp_index) = tier.temp_paths();
        let _ = fs::remove_file(temp_data);
        let _ = fs::remove_file(temp_index);

        tiers.push(Arc::new(tier));
        id += 1;
    }
    Ok(tiers)
}

/// Re-runs, deepest first, every compaction whose threshold is already met.
pub(crate) fn startup_compactions(shared: &Shared) -> Result<()> {
    let count = shared.tier_count();
    for i in (1..=count).rev() {
        let tier = tier::get_tier(shared, i)?;
        let full = {
            let state = tier.state.read().map_err(|_| StoreError::Poisoned)?;
            state.runs.len() >= shared.opts.fanout_threshold
        };
        if full {
            log::info!("startup compaction of Tier_{i}");
            tier.merge.acquire();
            compaction::compact_tier(shared, i)?;
        }
    }
    Ok(())
}

/// Replays surviving WALs into a fresh Tier 0 and rewrites them into a
/// fresh active log.
///
/// If a staged `WAL_temp.bin` exists alongside an active `WAL.bin`, the
/// crash happened between a buffer swap and the staged log's deletion: the
/// staged records are older, so they replay first and the active log
/// (renamed to `WAL_temp1.bin`) replays over them.
pub(crate) fn replay_wal(root: &Path, opts: &StoreOptions) -> Result<Tier0> {
    let active = root.join(WAL_FILE);
    let staged = root.join(WAL_STAGED);
    let staged1 = root.join(WAL_STAGED1);

    if active.exists() {
        fs::rename(&active, &staged1)?;
    }

    let mut buffer = WriteBuffer::new();
    let mut filter = KeyFilter::new();
    let mut replayed = 0usize;
    for path in [&staged, &staged1] {
        if !path.exists() {
            continue;
        }
        let mut reader = WalReader::open(path)?;
        reader.replay(|key, value| {
            filter.add(&key);
            buffer.insert(key, value);
            replayed += 1;
        })?;
    }

    // Rewrite the survivors into a fresh log before dropping the staged
    // files; a crash right here still finds a complete WAL either way.
    let mut wal = WalWriter::create(&active, opts.wal_sync)?;
    for (key, value) in buffer.iter() {
        wal.append(key, value)?;
    }
    if !buffer.is_empty() {
        wal.sync_to_disk()?;
        log::info!(
            "replayed {} WAL records into {} live keys",
            replayed,
            buffer.len()
        );
    }
    let _ = fs::remove_file(&staged);
    let _ = fs::remove_file(&staged1);

    Ok(Tier0 {
        buffer,
        filter,
        wal,
    })
}
