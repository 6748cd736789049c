use anyhow::{anyhow, Result};
use byteorder::{NativeEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Sequential reader over a run's records in key order.
///
/// Both files are read strictly forward (after one initial seek to the
/// trailing count), so compaction streams its inputs instead of paying a
/// seek per record the way point lookups do.
pub struct RunCursor {
    data: BufReader<File>,
    index: BufReader<File>,
    /// End offset of the previous record — the start of the next key.
    prev: u64,
    remaining: u64,
}

impl RunCursor {
    pub fn open(data_path: &Path, index_path: &Path) -> Result<Self> {
        let data = BufReader::new(File::open(data_path)?);

        let mut index_file = File::open(index_path)?;
        index_file.seek(SeekFrom::End(-8))?;
        let entries = index_file.read_u64::<NativeEndian>()?;
        index_file.seek(SeekFrom::Start(0))?;

        let mut index = BufReader::new(index_file);
        // Leading offset: the first key starts at zero.
        let prev = index.read_u64::<NativeEndian>()?;

        Ok(Self {
            data,
            index,
            prev,
            remaining: entries,
        })
    }

    /// Returns the next `(key, value)` record, or `None` when the run is
    /// exhausted.
    pub fn next_record(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let key_end = self.index.read_u64::<NativeEndian>()?;
        let val_end = self.index.read_u64::<NativeEndian>()?;

        let key_len = key_end
            .checked_sub(self.prev)
            .ok_or_else(|| anyhow!("run index offsets not monotonic"))?;
        let val_len = val_end
            .checked_sub(key_end)
            .ok_or_else(|| anyhow!("run index offsets not monotonic"))?;

        let mut key = vec![0u8; key_len as usize];
        self.data.read_exact(&mut key)?;
        let mut value = vec![0u8; val_len as usize];
        self.data.read_exact(&mut value)?;

        self.prev = val_end;
        self.remaining -= 1;
        Ok(Some((key, value)))
    }
}
