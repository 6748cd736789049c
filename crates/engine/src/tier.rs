//! The on-disk tier table.
//!
//! Tier `i` (`i >= 1`) is a directory `Tier_i/` holding sequence-numbered
//! run pairs `j.bin` + `metadataj.bin`, newest last. Each tier owns a
//! rwlock over its parallel run/filter lists and a merge [`Token`]; the
//! table itself only ever grows, so tiers are addressed by index and held
//! as `Arc`s rather than forming a pointer graph.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use filter::KeyFilter;
use run::SortedRun;

use crate::sync::Token;
use crate::{Result, Shared, StoreError};

/// In-progress run output, renamed to the next sequence number on commit.
const TEMP_DATA: &str = "temp.bin";
const TEMP_INDEX: &str = "temp1.bin";

/// Run list and filters of one tier, guarded by the tier's rwlock.
/// The two vectors are parallel: `filters[j]` belongs to `runs[j]`.
pub(crate) struct TierState {
    pub(crate) runs: Vec<SortedRun>,
    pub(crate) filters: Vec<KeyFilter>,
}

pub(crate) struct Tier {
    /// 1-based tier number (`Tier_{id}` on disk).
    pub(crate) id: usize,
    pub(crate) dir: PathBuf,
    pub(crate) state: RwLock<TierState>,
    /// Serializes flush-into-tier and compact-into-tier.
    pub(crate) merge: Token,
}

impl Tier {
    pub fn new(id: usize, dir: PathBuf) -> Self {
        Self {
            id,
            dir,
            state: RwLock::new(TierState {
                runs: Vec::new(),
                filters: Vec::new(),
            }),
            merge: Token::new(),
        }
    }

    /// File pair of run `seq` (1-based) in this tier.
    pub fn run_paths(&self, seq: usize) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{seq}.bin")),
            self.dir.join(format!("metadata{seq}.bin")),
        )
    }

    /// File pair a run is written to before it is committed.
    pub fn temp_paths(&self) -> (PathBuf, PathBuf) {
        (self.dir.join(TEMP_DATA), self.dir.join(TEMP_INDEX))
    }

    /// Searches this tier's runs newest to oldest, short-circuiting on the
    /// first hit. Returns the raw stored value — tombstones included.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        for (run, filter) in state.runs.iter().zip(state.filters.iter()).rev() {
            if !filter.contains(key) {
                continue;
            }
            if let Some(value) = run.find(key).map_err(StoreError::Run)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Commits the temp file pair as this tier's next run: renames it into
    /// the sequence-numbered slot, opens it, and appends run + filter to
    /// the lists. The caller holds the tier's merge token and write lock.
    pub fn install_run(&self, state: &mut TierState, filter: KeyFilter) -> Result<()> {
        let seq = state.runs.len() + 1;
        let (temp_data, temp_index) = self.temp_paths();
        let (data, index) = self.run_paths(seq);
        fs::rename(&temp_data, &data)?;
        fs::rename(&temp_index, &index)?;
        let run = SortedRun::open(&data, &index).map_err(StoreError::Run)?;
        state.runs.push(run);
        state.filters.push(filter);
        Ok(())
    }

    /// Takes every run and filter out of the tier, leaving it empty. The
    /// caller holds the tier's write lock.
    pub fn drain(state: &mut TierState) -> (Vec<SortedRun>, Vec<KeyFilter>) {
        (
            std::mem::take(&mut state.runs),
            std::mem::take(&mut state.filters),
        )
    }
}

/// Returns tier `id`, growing the table (and creating directories) up to
/// and including it.
pub(crate) fn ensure_tier(shared: &Shared, id: usize) -> Result<Arc<Tier>> {
    let mut tiers = shared.tiers.lock().map_err(|_| StoreError::Poisoned)?;
    while tiers.len() < id {
        let next_id = tiers.len() + 1;
        let dir = shared.root.join(format!("Tier_{next_id}"));
        fs::create_dir_all(&dir)?;
        tiers.push(Arc::new(Tier::new(next_id, dir)));
    }
    Ok(Arc::clone(&tiers[id - 1]))
}

/// Returns tier `id`, which must already exist.
pub(crate) fn get_tier(shared: &Shared, id: usize) -> Result<Arc<Tier>> {
    let tiers = shared.tiers.lock().map_err(|_| StoreError::Poisoned)?;
    tiers
        .get(id - 1)
        .cloned()
        .ok_or_else(|| StoreError::Run(anyhow::anyhow!("tier {id} does not exist")))
}
