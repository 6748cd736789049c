use anyhow::{anyhow, bail, Context, Result};
use byteorder::{NativeEndian, ReadBytesExt};
use filter::KeyFilter;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::RunCursor;

/// Maximum key or value length we'll allocate during reads. Prevents OOM on
/// a corrupt index.
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Read handle for an immutable sorted run.
///
/// [`open`](SortedRun::open) validates the index geometry (offset count
/// against the trailing record count, final offset against the data file
/// length) and then keeps both file handles open for the lifetime of the
/// run, wrapped in a `Mutex` so `find` works through a shared reference.
///
/// A point lookup is a binary search over the index file: each step reads
/// the three offsets framing record `mid`, seeks the data file to the key
/// range, and compares. `O(log n)` seeks, one key read per probe, one value
/// read on a hit.
pub struct SortedRun {
    data_path: PathBuf,
    index_path: PathBuf,
    entries: u64,
    files: Mutex<RunFiles>,
}

struct RunFiles {
    data: File,
    index: File,
}

impl SortedRun {
    /// Opens a run, validating the index before any lookups are served.
    ///
    /// # Errors
    ///
    /// Fails if either file is missing, the index is misaligned or too
    /// small, the trailing count disagrees with the index length, or the
    /// final offset disagrees with the data file length.
    pub fn open(data_path: &Path, index_path: &Path) -> Result<Self> {
        let data = File::open(data_path)
            .with_context(|| format!("open run data {}", data_path.display()))?;
        let mut index = File::open(index_path)
            .with_context(|| format!("open run index {}", index_path.display()))?;

        let index_len = index.metadata()?.len();
        if index_len < 16 || index_len % 8 != 0 {
            bail!("run index malformed: {} bytes", index_len);
        }

        index.seek(SeekFrom::End(-8))?;
        let entries = index.read_u64::<NativeEndian>()?;

        // The index holds 2n + 1 offsets plus the trailing count.
        if index_len != (2 * entries + 2) * 8 {
            bail!(
                "run index inconsistent: {} entries but {} bytes",
                entries,
                index_len
            );
        }

        // The last offset is the end of the final value, i.e. the data size.
        index.seek(SeekFrom::Start(2 * entries * 8))?;
        let data_end = index.read_u64::<NativeEndian>()?;
        if data_end != data.metadata()?.len() {
            bail!(
                "run data length mismatch: index says {}, file is {}",
                data_end,
                data.metadata()?.len()
            );
        }

        Ok(Self {
            data_path: data_path.to_path_buf(),
            index_path: index_path.to_path_buf(),
            entries,
            files: Mutex::new(RunFiles { data, index }),
        })
    }

    /// Binary search for `key`. Returns the raw stored value — tombstone
    /// sentinels included; interpreting them is the caller's business.
    pub fn find(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.entries == 0 {
            return Ok(None);
        }

        let mut files = self
            .files
            .lock()
            .map_err(|_| anyhow!("run file lock poisoned"))?;

        let mut lo: i64 = 0;
        let mut hi: i64 = self.entries as i64 - 1;
        let mut probe = Vec::new();

        while lo <= hi {
            let mid = (lo + hi) / 2;
            let (key_start, val_start, val_end) = read_offsets(&mut files.index, mid as u64)?;

            let key_len = val_start
                .checked_sub(key_start)
                .ok_or_else(|| anyhow!("run index offsets not monotonic"))?;
            if key_len > MAX_ENTRY_BYTES {
                bail!("run key length {} exceeds maximum", key_len);
            }

            files.data.seek(SeekFrom::Start(key_start))?;
            probe.resize(key_len as usize, 0);
            files.data.read_exact(&mut probe)?;

            match key.cmp(probe.as_slice()) {
                std::cmp::Ordering::Less => hi = mid - 1,
                std::cmp::Ordering::Greater => lo = mid + 1,
                std::cmp::Ordering::Equal => {
                    let val_len = val_end
                        .checked_sub(val_start)
                        .ok_or_else(|| anyhow!("run index offsets not monotonic"))?;
                    if val_len > MAX_ENTRY_BYTES {
                        bail!("run value length {} exceeds maximum", val_len);
                    }
                    let mut value = vec![0u8; val_len as usize];
                    files.data.read_exact(&mut value)?;
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    /// Rebuilds the membership filter by scanning the run's keys.
    ///
    /// Filters are never persisted, so startup recovery walks each run once
    /// through a sequential cursor.
    pub fn rebuild_filter(&self) -> Result<KeyFilter> {
        let mut cursor = RunCursor::open(&self.data_path, &self.index_path)?;
        let mut filter = KeyFilter::new();
        while let Some((key, _)) = cursor.next_record()? {
            filter.add(&key);
        }
        Ok(filter)
    }

    /// Number of records in the run.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Deletes the backing file pair. The open handles stay valid until the
    /// run is dropped, so in-flight readers are unaffected.
    pub fn remove_files(&self) -> Result<()> {
        std::fs::remove_file(&self.data_path)
            .with_context(|| format!("remove {}", self.data_path.display()))?;
        std::fs::remove_file(&self.index_path)
            .with_context(|| format!("remove {}", self.index_path.display()))?;
        Ok(())
    }
}

impl std::fmt::Debug for SortedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedRun")
            .field("data", &self.data_path)
            .field("entries", &self.entries)
            .finish()
    }
}

/// Reads the three consecutive offsets framing record `mid`: key start,
/// value start, value end.
fn read_offsets(index: &mut File, mid: u64) -> Result<(u64, u64, u64)> {
    index.seek(SeekFrom::Start(2 * 8 * mid))?;
    let key_start = index.read_u64::<NativeEndian>()?;
    let val_start = index.read_u64::<NativeEndian>()?;
    let val_end = index.read_u64::<NativeEndian>()?;
    Ok((key_start, val_start, val_end))
}
