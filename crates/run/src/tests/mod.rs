use crate::RunWriter;
use anyhow::Result;
use filter::KeyFilter;
use std::path::{Path, PathBuf};

mod reader_tests;

/// Writes a run named `<stem>.bin` / `metadata<stem>.bin` from pre-sorted
/// entries and returns the file pair plus the writer's filter.
pub fn write_run(
    dir: &Path,
    stem: &str,
    entries: &[(&[u8], &[u8])],
) -> Result<(PathBuf, PathBuf, KeyFilter)> {
    let data = dir.join(format!("{stem}.bin"));
    let index = dir.join(format!("metadata{stem}.bin"));
    let mut w = RunWriter::create(&data, &index)?;
    for (key, value) in entries {
        w.append(key, value)?;
    }
    let filter = w.finish()?;
    Ok((data, index, filter))
}
