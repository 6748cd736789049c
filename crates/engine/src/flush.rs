//! Flusher: turns the frozen buffer into a Tier-1 run.
//!
//! A single long-lived worker parked on a counted signal. Each cycle:
//!
//! 1. Under the Tier-0 write lock: swap the active buffer and filter out as
//!    the frozen pair, rotate the WAL to its staging name, open a fresh
//!    WAL, publish the frozen pair for readers, clear the swap barrier.
//! 2. With no Tier-0 lock held: stream the frozen buffer in key order into
//!    a temp run in `Tier_1/`.
//! 3. Under Tier 1's merge token and write lock, rename the temp pair to
//!    the next sequence number and append it to the run list; then clear
//!    the frozen buffer and delete the staged WAL. If the install pushes
//!    the tier to the fan-out threshold, keep the merge token held and
//!    signal the Compactor, which inherits and releases it.

use std::fs;
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use run::RunWriter;
use wal::WalWriter;

use crate::{tier, Frozen, Result, Shared, StoreError, WAL_FILE, WAL_STAGED};

pub(crate) fn flusher_loop(shared: Arc<Shared>) {
    loop {
        shared.flush_wake.wait();
        if shared.destroy.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = flush_cycle(&shared) {
            // A failed flush means partial durability; the worker cannot
            // safely continue.
            log::error!("flush failed, worker stopping: {e}");
            return;
        }
    }
}

/// One complete flush cycle. Also called synchronously from recovery when a
/// replayed WAL is already over threshold (no workers are running then).
pub(crate) fn flush_cycle(shared: &Shared) -> Result<()> {
    // Phase 1: swap, under the Tier-0 write lock.
    {
        let mut tier0 = shared.tier0.write().map_err(|_| StoreError::Poisoned)?;
        if tier0.buffer.is_empty() {
            // Spurious wake (e.g. an explicit flush of an empty store).
            shared.flush_gate.clear();
            shared.flush_done.bump();
            return Ok(());
        }

        let buffer = mem::take(&mut tier0.buffer);
        let filter = mem::take(&mut tier0.filter);

        let active = shared.root.join(WAL_FILE);
        let staged = shared.root.join(WAL_STAGED);
        fs::rename(&active, &staged)?;
        tier0.wal = WalWriter::create(&active, shared.opts.wal_sync)?;

        let mut frozen = shared.frozen.write().map_err(|_| StoreError::Poisoned)?;
        *frozen = Some(Frozen { buffer, filter });
        shared.flush_gate.clear();
    }

    // Phase 2: write the frozen buffer out, Tier-0 unlocked so readers and
    // writers proceed. Readers see the frozen pair under its read lock.
    let tier1 = tier::ensure_tier(shared, 1)?;
    let (temp_data, temp_index) = tier1.temp_paths();
    let (records, filter) = {
        let frozen = shared.frozen.read().map_err(|_| StoreError::Poisoned)?;
        let Some(fz) = frozen.as_ref() else {
            // Nothing frozen: the cycle has nothing left to do.
            shared.flush_done.bump();
            return Ok(());
        };
        let mut writer = RunWriter::create(&temp_data, &temp_index).map_err(StoreError::Run)?;
        for (key, value) in fz.buffer.iter() {
            writer.append(key, value).map_err(StoreError::Run)?;
        }
        let records = writer.count();
        let filter = writer.finish().map_err(StoreError::Run)?;
        (records, filter)
    };

    // Phase 3: make the run visible in Tier 1, and only then retire the
    // frozen buffer and its staged WAL. A reader always finds the records
    // in the frozen buffer or in the installed run — never in neither.
    tier1.merge.acquire();
    let count = {
        let mut state = tier1.state.write().map_err(|_| StoreError::Poisoned)?;
        tier1.install_run(&mut state, filter)?;
        state.runs.len()
    };

    {
        let mut frozen = shared.frozen.write().map_err(|_| StoreError::Poisoned)?;
        *frozen = None;
        let _ = fs::remove_file(shared.root.join(WAL_STAGED));
    }
    log::debug!("flushed {records} records into Tier_1 ({count} runs)");

    if count >= shared.opts.fanout_threshold {
        // Hand Tier 1's merge token to the Compactor.
        shared.compact_wake.notify();
    } else {
        tier1.merge.release();
    }

    shared.flush_done.bump();
    Ok(())
}
