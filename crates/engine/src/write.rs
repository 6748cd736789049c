//! Write path: `put()` and `delete()`.
//!
//! A deletion is a put of the tombstone sentinel; both funnel through the
//! same record path. Under the Tier-0 write lock the record is appended to
//! the WAL, inserted into the active buffer and added to the Tier-0 filter.
//! Crossing the memtable threshold raises the swap barrier and wakes the
//! Flusher; subsequent writers block at the barrier until the buffers have
//! been swapped.

use crate::{Result, Store, StoreError, MAX_RECORD_BYTES, TOMBSTONE};

impl Store {
    /// Inserts or overwrites a key.
    ///
    /// # Errors
    ///
    /// * [`StoreError::RecordTooLarge`] if `|key| + |value|` reaches
    ///   [`MAX_RECORD_BYTES`].
    /// * [`StoreError::ReservedValue`] if the value equals the tombstone
    ///   sentinel — accepting it would let clients forge deletions.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if value == TOMBSTONE {
            return Err(StoreError::ReservedValue);
        }
        self.write_record(key, value)
    }

    /// Deletes a key by writing a tombstone record.
    ///
    /// Equivalent to a `put` of the sentinel: the tombstone shadows older
    /// values in the frozen buffer and on disk, and is garbage-collected
    /// once a compaction carries it into a fresh deepest tier.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.write_record(key, TOMBSTONE)
    }

    fn write_record(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let size = key.len() + value.len();
        if size >= MAX_RECORD_BYTES {
            return Err(StoreError::RecordTooLarge { size });
        }

        let shared = &self.shared;
        let mut tier0 = shared.tier0.write().map_err(|_| StoreError::Poisoned)?;
        // Swap barrier: a pending flush owns the buffers until it has
        // swapped them. Drop the lock while parked so the Flusher can work.
        while shared.flush_gate.is_raised() {
            drop(tier0);
            shared.flush_gate.wait_clear();
            tier0 = shared.tier0.write().map_err(|_| StoreError::Poisoned)?;
        }

        tier0.wal.append(key, value)?;
        tier0.buffer.insert(key.to_vec(), value.to_vec());
        tier0.filter.add(key);

        if tier0.buffer.mem_size() >= shared.opts.memtable_bytes {
            shared.flush_gate.raise();
            shared.flush_wake.notify();
        }

        Ok(())
    }
}
