//! # Sorted runs
//!
//! Immutable on-disk storage for the tiered store. A run is a pair of files
//! produced by flushing a write buffer or by compacting a tier:
//!
//! ```text
//! DATA  (j.bin)          key0 value0 key1 value1 ...   (pure concatenation)
//!
//! INDEX (metadataj.bin)  [off: u64] x (2n + 1)  [count: u64]
//! ```
//!
//! The index is a stream of byte offsets into the data file: entry `2i` is
//! the start of key `i`, entry `2i+1` is the start of value `i` (= end of
//! key `i`), and entry `2i+2` is the end of value `i` (= start of key
//! `i+1`). The final `u64` is the record count. Record `i` can therefore be
//! decoded from three consecutive offsets at index position `2i`.
//!
//! All offsets are **host-endian**; the files are not portable across
//! endianness. Keys within a run are strictly increasing, which makes the
//! index binary-searchable with one key probe per step.
//!
//! Runs are write-once: [`RunWriter`] emits to temporary names, the engine
//! renames the pair into its sequence-numbered slot under the tier's locks,
//! and the files are only ever deleted after a compaction has consumed them.

mod cursor;
mod merge;
mod reader;
mod writer;

pub use cursor::RunCursor;
pub use merge::merge_runs;
pub use reader::SortedRun;
pub use writer::RunWriter;

/// Reserved value marking a deleted key.
///
/// Deletions are ordinary records carrying this sentinel, so every layer
/// (WAL, buffer, run, merge) moves them around like data. Lookups translate
/// the sentinel into "definitively absent", and the engine rejects user
/// writes that collide with it. Compaction into a freshly created deepest
/// tier garbage-collects these records — there is nothing older left for
/// them to mask.
pub const TOMBSTONE: &[u8] = b"\r\n";

#[cfg(test)]
mod tests;
