//! K-way merge over sorted runs.
//!
//! Streams the records of N input runs into one output run in ascending key
//! order. When the same key appears in several inputs, the run with the
//! **highest index wins** — callers pass runs in creation order, so within a
//! tier the newest run is authoritative. Every cursor positioned on the
//! emitted key is advanced, so older duplicates are consumed rather than
//! resurfacing on a later step.
//!
//! This is the whole of compaction's data path: drain the runs of one tier
//! through here into a temp run for the next.

use anyhow::{anyhow, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{RunCursor, RunWriter, TOMBSTONE};

/// One pending key from one input run. Values stay with the cursors; the
/// heap only orders keys.
struct HeapEntry {
    key: Vec<u8>,
    /// Index into the cursor array; higher = newer run.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison so the
        // smallest key pops first. Among equal keys the higher-indexed
        // (newer) source pops first and wins.
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges `cursors` (ordered oldest to newest) into `dest`.
///
/// With `drop_tombstones` set, records whose value is [`TOMBSTONE`] are
/// discarded instead of emitted — only valid when the destination tier has
/// nothing older the tombstone could be masking.
///
/// Returns the number of records emitted.
pub fn merge_runs(
    mut cursors: Vec<RunCursor>,
    dest: &mut RunWriter,
    drop_tombstones: bool,
) -> Result<u64> {
    let mut current: Vec<Option<(Vec<u8>, Vec<u8>)>> = Vec::with_capacity(cursors.len());
    let mut heap = BinaryHeap::new();

    for (i, cursor) in cursors.iter_mut().enumerate() {
        let record = cursor.next_record()?;
        if let Some((key, _)) = &record {
            heap.push(HeapEntry {
                key: key.clone(),
                source: i,
            });
        }
        current.push(record);
    }

    let mut emitted = 0u64;

    while let Some(top) = heap.pop() {
        // Equal keys pop newest-first, so `top` is the winner for this key.
        let (key, value) = current[top.source]
            .take()
            .ok_or_else(|| anyhow!("merge cursor out of sync with heap"))?;
        advance(&mut cursors, &mut current, &mut heap, top.source)?;

        // Consume the older duplicates of this key so they can't resurface.
        loop {
            match heap.peek() {
                Some(peek) if peek.key == key => {}
                _ => break,
            }
            let dup = heap.pop().ok_or_else(|| anyhow!("heap peek/pop mismatch"))?;
            current[dup.source].take();
            advance(&mut cursors, &mut current, &mut heap, dup.source)?;
        }

        if drop_tombstones && value == TOMBSTONE {
            continue;
        }
        dest.append(&key, &value)?;
        emitted += 1;
    }

    Ok(emitted)
}

fn advance(
    cursors: &mut [RunCursor],
    current: &mut [Option<(Vec<u8>, Vec<u8>)>],
    heap: &mut BinaryHeap<HeapEntry>,
    source: usize,
) -> Result<()> {
    let record = cursors[source].next_record()?;
    if let Some((key, _)) = &record {
        heap.push(HeapEntry {
            key: key.clone(),
            source,
        });
    }
    current[source] = record;
    Ok(())
}
