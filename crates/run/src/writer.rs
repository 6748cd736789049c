use anyhow::{ensure, Result};
use byteorder::{NativeEndian, WriteBytesExt};
use filter::KeyFilter;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Streaming writer for a sorted run.
///
/// Callers append records in strictly increasing key order; the writer
/// maintains the data/index file pair and builds the run's membership
/// filter as a side effect.
///
/// The caller is expected to point this at *temporary* paths and rename the
/// pair into place after [`finish`](RunWriter::finish) — a run must not
/// become visible before both files are complete and fsynced.
pub struct RunWriter {
    data: BufWriter<std::fs::File>,
    index: BufWriter<std::fs::File>,
    /// Running byte offset into the data file (the value of the next index
    /// entry to be written).
    written: u64,
    count: u64,
    filter: KeyFilter,
    last_key: Option<Vec<u8>>,
}

impl RunWriter {
    /// Creates (truncating) the data and index files.
    pub fn create(data_path: &Path, index_path: &Path) -> Result<Self> {
        let data = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(data_path)?,
        );
        let mut index = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(index_path)?,
        );

        // The first key starts at data offset zero.
        index.write_u64::<NativeEndian>(0)?;

        Ok(Self {
            data,
            index,
            written: 0,
            count: 0,
            filter: KeyFilter::new(),
            last_key: None,
        })
    }

    /// Appends one record. Keys must arrive in strictly increasing order.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            ensure!(
                key > last.as_slice(),
                "run keys must be strictly increasing"
            );
        }

        self.data.write_all(key)?;
        self.written += key.len() as u64;
        // End of key = start of value.
        self.index.write_u64::<NativeEndian>(self.written)?;

        self.data.write_all(value)?;
        self.written += value.len() as u64;
        // End of value = start of the next key.
        self.index.write_u64::<NativeEndian>(self.written)?;

        self.filter.add(key);
        self.count += 1;
        self.last_key = Some(key.to_vec());
        Ok(())
    }

    /// Number of records appended so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Writes the trailing record count, flushes and fsyncs both files, and
    /// returns the membership filter built over the appended keys.
    pub fn finish(mut self) -> Result<KeyFilter> {
        self.index.write_u64::<NativeEndian>(self.count)?;

        self.data.flush()?;
        self.data.get_ref().sync_all()?;
        self.index.flush()?;
        self.index.get_ref().sync_all()?;

        Ok(self.filter)
    }
}
