//! # WAL — Write-Ahead Log
//!
//! Crash recovery for the active write buffer.
//!
//! Every mutation is appended here **before** the in-memory insert. On
//! restart the log is replayed to reconstruct the buffer. Deletions are
//! ordinary records whose value is the engine's tombstone sentinel, so the
//! log needs no op codes.
//!
//! ## Binary record format
//!
//! ```text
//! [key_len: u64][key bytes][val_len: u64][value bytes]
//! ```
//!
//! Length fields are **host-endian**, matching the run index format; the
//! files are not portable across machines of different endianness.
//!
//! The writer flushes its stream after every append. fsync is opt-in via the
//! `sync` flag: with it off (the default) a power loss can drop records that
//! never left the OS page cache; with it on every append is durable before
//! the call returns.
//!
//! ## Rotation
//!
//! The engine rotates the log at every flush by renaming the active file to
//! a staging name and opening a fresh one. This crate only reads and writes
//! a single file; the rename dance lives in the engine's flush and recovery
//! paths.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Upper bound accepted for a single length field during replay. Anything
/// larger is treated as framing corruption rather than a legitimate record.
const MAX_FIELD_BYTES: u64 = 64 * 1024 * 1024;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A length field was implausibly large; the log is corrupt.
    #[error("corrupt record")]
    Corrupt,
}

/// Append-only WAL writer.
///
/// Each record is serialized into a reusable scratch buffer and written with
/// a single `write_all`, then the stream is flushed. When `sync` is `true`
/// the file is additionally fsynced so the record is durable before the
/// append returns.
pub struct WalWriter {
    file: File,
    sync: bool,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path for the WAL (created if it does not exist).
    /// * `sync` - if true, every `append` call is followed by `fsync`.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Appends one `(key, value)` record and flushes the stream.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        // Clear but keep the allocation.
        self.buf.clear();

        self.buf.write_u64::<NativeEndian>(key.len() as u64)?;
        self.buf.extend_from_slice(key);
        self.buf.write_u64::<NativeEndian>(value.len() as u64)?;
        self.buf.extend_from_slice(value);

        // Single write call for the entire record.
        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Forces all buffered data to disk via `sync_all()`.
    ///
    /// Useful when `sync` is `false` and the caller wants durability at a
    /// specific point (e.g. after rewriting the log during recovery).
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Sequential WAL reader.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers. A record cut short at the end of the stream (a crash mid-append)
/// is treated as a clean EOF — every complete record before it is still
/// yielded.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every complete record, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (stream ends at a record boundary) -> `Ok(())`.
    /// - **Truncated tail** (stream ends inside a record) -> `Ok(())` after
    ///   yielding all complete records before it.
    /// - **Implausible length field** -> `Err(WalError::Corrupt)`.
    /// - **Other I/O error** -> `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(Vec<u8>, Vec<u8>),
    {
        loop {
            let key_len = match self.rdr.read_u64::<NativeEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };
            if key_len > MAX_FIELD_BYTES {
                return Err(WalError::Corrupt);
            }

            let mut key = vec![0u8; key_len as usize];
            match self.rdr.read_exact(&mut key) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let val_len = match self.rdr.read_u64::<NativeEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };
            if val_len > MAX_FIELD_BYTES {
                return Err(WalError::Corrupt);
            }

            let mut value = vec![0u8; val_len as usize];
            match self.rdr.read_exact(&mut value) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            apply(key, value);
        }
    }
}
