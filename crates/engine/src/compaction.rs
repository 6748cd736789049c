//! Compactor: drains a full tier into the next one.
//!
//! A single long-lived worker parked on a counted signal. A wake-up always
//! starts at Tier 1 (only flushes fill it) and cascades deeper for as long
//! as the freshly installed run pushes a tier to the fan-out threshold.
//!
//! The caller of [`compact_tier`] holds the source tier's merge token —
//! either the Flusher handed it over (Tier 1) or the previous cascade step
//! did (`i -> i+1` recursion) — which is what serializes structural changes
//! to a tier without blocking its readers during the merge itself.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use run::{merge_runs, RunCursor, RunWriter};

use crate::{tier, Result, Shared, StoreError};

pub(crate) fn compactor_loop(shared: Arc<Shared>) {
    loop {
        shared.compact_wake.wait();
        if shared.destroy.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = compact_tier(&shared, 1) {
            // Tier state may be half-merged on disk; recovery sorts that
            // out on the next open, but this process must stop compacting.
            log::error!("compaction failed, worker stopping: {e}");
            return;
        }
    }
}

/// Merges all runs of tier `i` into a single new run of tier `i+1`.
///
/// The caller must hold tier `i`'s merge token; it is released once tier
/// `i` has been drained. Tombstones are dropped iff tier `i` is currently
/// the deepest — the target is then freshly created and empty, so a
/// tombstone has nothing older left to mask.
pub(crate) fn compact_tier(shared: &Shared, i: usize) -> Result<()> {
    let source = tier::get_tier(shared, i)?;

    // Open streaming cursors under the read lock; lookups continue while
    // the merge runs. The merge token keeps the run list stable after the
    // lock drops.
    let cursors = {
        let state = source.state.read().map_err(|_| StoreError::Poisoned)?;
        state
            .runs
            .iter()
            .map(|r| RunCursor::open(r.data_path(), r.index_path()))
            .collect::<anyhow::Result<Vec<RunCursor>>>()
            .map_err(StoreError::Run)?
    };
    if cursors.is_empty() {
        source.merge.release();
        return Ok(());
    }
    let inputs = cursors.len();

    // Decided before the target exists: tier `i` being the deepest means
    // the target is about to be created empty.
    let gc_tombstones = i == shared.tier_count();
    let target = tier::ensure_tier(shared, i + 1)?;

    let (temp_data, temp_index) = target.temp_paths();
    let mut writer = RunWriter::create(&temp_data, &temp_index).map_err(StoreError::Run)?;
    let emitted = merge_runs(cursors, &mut writer, gc_tombstones).map_err(StoreError::Run)?;
    let filter = writer.finish().map_err(StoreError::Run)?;

    // Swap point: drain the source tier and commit the merged run, holding
    // the source write lock across the hand-off so the newest-first search
    // order never observes the records in neither tier.
    let mut source_state = source.state.write().map_err(|_| StoreError::Poisoned)?;
    let (old_runs, _old_filters) = tier::Tier::drain(&mut source_state);
    for run in &old_runs {
        run.remove_files().map_err(StoreError::Run)?;
    }

    target.merge.acquire();
    let target_count = {
        let mut state = target.state.write().map_err(|_| StoreError::Poisoned)?;
        target.install_run(&mut state, filter)?;
        state.runs.len()
    };

    source.merge.release();
    drop(source_state);

    log::debug!(
        "compacted Tier_{i} ({inputs} runs, {emitted} records) into Tier_{} ({target_count} runs)",
        i + 1
    );

    if target_count >= shared.opts.fanout_threshold {
        // Cascade with the target's merge token still held.
        return compact_tier(shared, i + 1);
    }
    target.merge.release();
    Ok(())
}
