//! # Engine — StrataKV storage engine
//!
//! The central orchestrator tying the [`buffer`], [`wal`], [`filter`] and
//! [`run`] crates into a tiered log-structured key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client threads
//!   |
//!   v
//! ┌─────────────────────────────────────────────────────┐
//! │                      STORE                          │
//! │                                                     │
//! │ put/delete → WAL append → active buffer insert      │
//! │                 |                                   │
//! │                 | (mem_size >= threshold?)          │
//! │                 v                                   │
//! │          Flusher thread: swap buffers, rotate WAL,  │
//! │          write frozen buffer → new Tier-1 run       │
//! │                 |                                   │
//! │                 | (tier run count >= fan-out?)      │
//! │                 v                                   │
//! │          Compactor thread: k-way merge Tier i       │
//! │          → single run in Tier i+1 (cascading)       │
//! │                                                     │
//! │ get → active buffer → frozen buffer                 │
//! │     → Tier 1 newest→oldest → Tier 2 … (first hit)   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module         | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | `lib.rs`       | `Store` handle, options, errors, `Debug`, `Drop`   |
//! | [`sync`]       | counted signal, merge token, swap gate             |
//! | [`tier`]       | on-disk tier table, run install/drain, lookups     |
//! | [`write`]      | `put()` / `delete()` via the Tier-0 write path     |
//! | [`read`]       | `get()` down the newest-first search order         |
//! | [`flush`]      | Flusher worker: buffer swap + run write-out        |
//! | [`compaction`] | Compactor worker: tier drain + cascading merge     |
//! | [`recovery`]   | startup: tier scan, startup compaction, WAL replay |
//!
//! ## Concurrency
//!
//! Tier 0 (the active buffer, its filter and the WAL) lives behind one
//! rwlock; the frozen buffer behind another. Each on-disk tier carries a
//! rwlock over its run list plus a binary *merge token* that serializes
//! flush-into-tier and compact-into-tier. Writers additionally pass a swap
//! barrier: once a flush is pending, `put` blocks until the Flusher has
//! swapped buffers and rotated the WAL. Background workers park on counted wake-up signals and exit
//! cooperatively when the destroy flag is raised.
//!
//! ## Crash safety
//!
//! Every write hits the WAL before the buffer. Runs become visible only by
//! being renamed from temp names while the owning tier's locks are held.
//! The staged WAL is deleted only after its buffer is safely inside a run.
//! Recovery replays whatever WALs survive, re-appends them to a fresh log,
//! and re-runs any compactions the crash interrupted.

mod compaction;
mod flush;
mod read;
mod recovery;
mod sync;
mod tier;
mod write;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use buffer::WriteBuffer;
use filter::KeyFilter;
use thiserror::Error;
use wal::WalWriter;

use sync::{Gate, Progress, Signal};
use tier::Tier;

pub use run::TOMBSTONE;

/// A record is rejected when `|key| + |value|` reaches this many bytes.
pub const MAX_RECORD_BYTES: usize = 4_000_000;

/// Default byte threshold at which the active buffer is frozen and flushed.
pub const MAX_MEMTABLE_BYTES: usize = 4_000_000;

/// Default fan-out: a tier is compacted into the next once it holds this
/// many runs.
pub const MIN_TH: usize = 4;

/// Reserved upper bound on the fan-out threshold.
pub const MAX_TH: usize = 12;

/// Active write-ahead log, rooted in the store directory.
const WAL_FILE: &str = "WAL.bin";
/// Staging name the active WAL is rotated to at the start of a flush.
const WAL_STAGED: &str = "WAL_temp.bin";
/// Second staging name used during recovery when both a staged and an
/// active WAL survived a crash.
const WAL_STAGED1: &str = "WAL_temp1.bin";

/// Errors surfaced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record exceeds the engine limit; nothing was written.
    #[error("record too large: {size} bytes (limit {})", MAX_RECORD_BYTES)]
    RecordTooLarge { size: usize },

    /// The value collides with the reserved deletion marker.
    #[error("value collides with the reserved deletion marker")]
    ReservedValue,

    /// The write-ahead log failed or is corrupt.
    #[error("write-ahead log: {0}")]
    Wal(#[from] wal::WalError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A sorted-run file failed validation or I/O.
    #[error("run storage: {0}")]
    Run(anyhow::Error),

    /// A lock was poisoned by a panicking thread.
    #[error("lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Tunables fixed at open time.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Byte threshold at which the active buffer is frozen and flushed.
    pub memtable_bytes: usize,
    /// Run count at which a tier is compacted into the next.
    pub fanout_threshold: usize,
    /// fsync the WAL after every append. Off by default: the baseline
    /// durability level is an application flush into the OS page cache.
    pub wal_sync: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            memtable_bytes: MAX_MEMTABLE_BYTES,
            fanout_threshold: MIN_TH,
            wal_sync: false,
        }
    }
}

/// Tier 0: the mutable head of the store. Guarded by one rwlock so a write
/// is atomic across all three members.
pub(crate) struct Tier0 {
    pub(crate) buffer: WriteBuffer,
    pub(crate) filter: KeyFilter,
    pub(crate) wal: WalWriter,
}

/// The frozen buffer and its filter, alive between a swap and the moment
/// its run becomes visible in Tier 1.
pub(crate) struct Frozen {
    pub(crate) buffer: WriteBuffer,
    pub(crate) filter: KeyFilter,
}

/// State shared between the public handle and the worker threads.
pub(crate) struct Shared {
    pub(crate) root: PathBuf,
    pub(crate) opts: StoreOptions,
    pub(crate) tier0: RwLock<Tier0>,
    pub(crate) frozen: RwLock<Option<Frozen>>,
    /// On-disk tier table; index `i` is `Tier_{i+1}`. Grows monotonically.
    pub(crate) tiers: Mutex<Vec<Arc<Tier>>>,
    pub(crate) flush_wake: Signal,
    pub(crate) compact_wake: Signal,
    /// Swap barrier: raised when a flush is pending, cleared once the
    /// Flusher has swapped buffers. Writers wait behind it.
    pub(crate) flush_gate: Gate,
    /// Completed flush-cycle counter, used by [`Store::flush`].
    pub(crate) flush_done: Progress,
    pub(crate) destroy: AtomicBool,
}

impl Shared {
    pub(crate) fn tier_count(&self) -> usize {
        self.tiers.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub(crate) fn snapshot_tiers(&self) -> Result<Vec<Arc<Tier>>> {
        Ok(self
            .tiers
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }
}

/// The storage engine handle.
///
/// Thread-safe: all operations take `&self`, so a `Store` can be shared
/// behind an `Arc` by any number of client threads. Dropping the handle
/// signals the background workers, joins them and closes the WAL; buffered
/// records survive in the log and are replayed on the next open.
pub struct Store {
    shared: Arc<Shared>,
    flusher: Option<thread::JoinHandle<()>>,
    compactor: Option<thread::JoinHandle<()>>,
}

impl Store {
    /// Opens (or creates) a store rooted at `root` with default options.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with(root, StoreOptions::default())
    }

    /// Opens (or creates) a store rooted at `root`.
    ///
    /// # Recovery steps
    ///
    /// 1. Ensure the root directory exists.
    /// 2. Enumerate `Tier_1, Tier_2, …`; reopen every run in sequence order
    ///    and rebuild its membership filter by scanning the files.
    /// 3. Re-run, deepest tier first, any compaction whose fan-out
    ///    threshold is already met.
    /// 4. Replay surviving WALs (staged first, then the renamed active log)
    ///    into a fresh buffer, rewrite them into a fresh WAL, and flush
    ///    synchronously if the replayed buffer is already over threshold.
    /// 5. Launch the Flusher and Compactor workers.
    pub fn open_with<P: AsRef<Path>>(root: P, opts: StoreOptions) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        log::info!("opening store at {}", root.display());

        let tiers = recovery::load_tiers(&root)?;
        let tier0 = recovery::replay_wal(&root, &opts)?;
        let replayed = tier0.buffer.len();

        let shared = Arc::new(Shared {
            root,
            opts,
            tier0: RwLock::new(tier0),
            frozen: RwLock::new(None),
            tiers: Mutex::new(tiers),
            flush_wake: Signal::new(),
            compact_wake: Signal::new(),
            flush_gate: Gate::new(),
            flush_done: Progress::new(),
            destroy: AtomicBool::new(false),
        });

        recovery::startup_compactions(&shared)?;

        // A replayed buffer can already be over threshold; persist it before
        // accepting traffic, on this thread since no workers run yet.
        let oversized = {
            let t0 = shared.tier0.read().map_err(|_| StoreError::Poisoned)?;
            t0.buffer.mem_size() >= shared.opts.memtable_bytes
        };
        if oversized {
            shared.flush_gate.raise();
            flush::flush_cycle(&shared)?;
        }

        log::info!(
            "store recovered: {} tiers, {} buffered records",
            shared.tier_count(),
            replayed
        );

        let flusher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("strata-flush".into())
                .spawn(move || flush::flusher_loop(shared))?
        };
        let compactor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("strata-compact".into())
                .spawn(move || compaction::compactor_loop(shared))?
        };

        Ok(Self {
            shared,
            flusher: Some(flusher),
            compactor: Some(compactor),
        })
    }

    /// Forces the buffered records to disk and waits for the cycle to
    /// complete.
    ///
    /// Raises the swap barrier, wakes the Flusher, and blocks until the
    /// active buffer is empty and the frozen buffer has drained into a
    /// visible Tier-1 run. A no-op when there is nothing buffered.
    pub fn flush(&self) -> Result<()> {
        loop {
            let buffered = {
                let t0 = self.shared.tier0.read().map_err(|_| StoreError::Poisoned)?;
                !t0.buffer.is_empty()
            };
            if buffered {
                self.shared.flush_gate.raise();
                self.shared.flush_wake.notify();
            } else {
                let drained = self
                    .shared
                    .frozen
                    .read()
                    .map_err(|_| StoreError::Poisoned)?
                    .is_none();
                if drained && !self.shared.flush_gate.is_raised() {
                    return Ok(());
                }
            }
            // Some cycle is pending or in flight; wait for it, then
            // re-evaluate.
            let target = self.shared.flush_done.current() + 1;
            self.shared.flush_done.wait_past(target);
        }
    }

    /// Per-tier run counts, `Tier_1` first. Empty until the first flush.
    #[must_use]
    pub fn run_counts(&self) -> Vec<usize> {
        let tiers = match self.shared.snapshot_tiers() {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };
        tiers
            .iter()
            .map(|t| t.state.read().map(|s| s.runs.len()).unwrap_or(0))
            .collect()
    }

    /// Number of on-disk tiers.
    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.shared.tier_count()
    }

    /// Records currently in the active buffer.
    #[must_use]
    pub fn mem_entries(&self) -> usize {
        self.shared
            .tier0
            .read()
            .map(|t0| t0.buffer.len())
            .unwrap_or(0)
    }

    /// Byte counter of the active buffer (an over-approximation, see
    /// [`buffer::WriteBuffer::insert`]).
    #[must_use]
    pub fn mem_size(&self) -> usize {
        self.shared
            .tier0
            .read()
            .map(|t0| t0.buffer.mem_size())
            .unwrap_or(0)
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.shared.root
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.shared.root)
            .field("memtable_bytes", &self.shared.opts.memtable_bytes)
            .field("fanout_threshold", &self.shared.opts.fanout_threshold)
            .field("wal_sync", &self.shared.opts.wal_sync)
            .field("mem_entries", &self.mem_entries())
            .field("mem_size", &self.mem_size())
            .field("run_counts", &self.run_counts())
            .finish()
    }
}

/// Cooperative shutdown: raise the destroy flag, nudge both workers awake,
/// join them. The WAL closes when the shared state drops; anything still
/// buffered is replayed from the log on the next open.
impl Drop for Store {
    fn drop(&mut self) {
        self.shared.destroy.store(true, Ordering::SeqCst);
        self.shared.flush_wake.notify();
        self.shared.compact_wake.notify();
        if let Some(handle) = self.flusher.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.compactor.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests;
