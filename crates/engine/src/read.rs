//! Read path: `get()`.
//!
//! Monotone newest-first search order: active buffer, frozen buffer, then
//! each on-disk tier's runs newest to oldest. The first hit wins; a
//! tombstone anywhere along the way means "definitively deleted" and the
//! search does not fall through to older layers.

use crate::{Result, Store, StoreError, TOMBSTONE};

impl Store {
    /// Looks up a key, returning `None` for both absent and deleted keys.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let shared = &self.shared;

        {
            let tier0 = shared.tier0.read().map_err(|_| StoreError::Poisoned)?;
            if tier0.filter.contains(key) {
                if let Some(value) = tier0.buffer.get(key) {
                    return Ok(live(value));
                }
            }
        }

        {
            let frozen = shared.frozen.read().map_err(|_| StoreError::Poisoned)?;
            if let Some(fz) = frozen.as_ref() {
                if fz.filter.contains(key) {
                    if let Some(value) = fz.buffer.get(key) {
                        return Ok(live(value));
                    }
                }
            }
        }

        for tier in shared.snapshot_tiers()? {
            if let Some(value) = tier.lookup(key)? {
                return Ok(live(&value));
            }
        }

        Ok(None)
    }
}

/// Translates a stored value into the public result: the tombstone sentinel
/// reads as absent.
fn live(value: &[u8]) -> Option<Vec<u8>> {
    if value == TOMBSTONE {
        None
    } else {
        Some(value.to_vec())
    }
}
