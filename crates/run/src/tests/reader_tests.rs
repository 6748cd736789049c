use super::write_run;
use crate::{RunCursor, SortedRun};
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

// -------------------- Point lookups --------------------

#[test]
fn find_every_key() -> Result<()> {
    let dir = tempdir()?;
    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..100u32)
        .map(|i| {
            (
                format!("key{:04}", i).into_bytes(),
                format!("val{}", i).into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = entries
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    let (data, index, _) = write_run(dir.path(), "1", &borrowed)?;

    let run = SortedRun::open(&data, &index)?;
    assert_eq!(run.len(), 100);
    for (k, v) in &entries {
        assert_eq!(run.find(k)?.as_deref(), Some(v.as_slice()));
    }
    Ok(())
}

#[test]
fn find_missing_keys() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"b", b"2"), (b"d", b"4")])?;

    let run = SortedRun::open(&data, &index)?;
    assert_eq!(run.find(b"a")?, None); // before first
    assert_eq!(run.find(b"c")?, None); // between
    assert_eq!(run.find(b"e")?, None); // after last
    Ok(())
}

#[test]
fn find_on_empty_run() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[])?;

    let run = SortedRun::open(&data, &index)?;
    assert!(run.is_empty());
    assert_eq!(run.find(b"anything")?, None);
    Ok(())
}

#[test]
fn empty_value_and_tombstone_are_returned_verbatim() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"dead", b"\r\n"), (b"empty", b"")])?;

    let run = SortedRun::open(&data, &index)?;
    assert_eq!(run.find(b"dead")?.as_deref(), Some(&b"\r\n"[..]));
    assert_eq!(run.find(b"empty")?.as_deref(), Some(&b""[..]));
    Ok(())
}

#[test]
fn binary_keys_and_values() -> Result<()> {
    let dir = tempdir()?;
    let key = vec![0u8, 1, 2, 255];
    let val = vec![0xDEu8, 0xAD, 0, 0xEF];
    let (data, index, _) = write_run(dir.path(), "1", &[(key.as_slice(), val.as_slice())])?;

    let run = SortedRun::open(&data, &index)?;
    assert_eq!(run.find(&key)?, Some(val));
    Ok(())
}

// -------------------- Open-time validation --------------------

#[test]
fn open_rejects_missing_files() {
    let dir = tempdir().unwrap();
    let res = SortedRun::open(&dir.path().join("1.bin"), &dir.path().join("metadata1.bin"));
    assert!(res.is_err());
}

#[test]
fn open_rejects_truncated_index() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"a", b"1"), (b"b", b"2")])?;

    // Chop the trailing count off the index.
    let bytes = fs::read(&index)?;
    fs::write(&index, &bytes[..bytes.len() - 8])?;

    assert!(SortedRun::open(&data, &index).is_err());
    Ok(())
}

#[test]
fn open_rejects_count_mismatch() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"a", b"1")])?;

    // Overwrite the trailing count with a lie.
    let mut bytes = fs::read(&index)?;
    let n = bytes.len();
    bytes[n - 8..].copy_from_slice(&99u64.to_ne_bytes());
    fs::write(&index, &bytes)?;

    assert!(SortedRun::open(&data, &index).is_err());
    Ok(())
}

#[test]
fn open_rejects_short_data_file() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"a", b"12345")])?;

    fs::write(&data, b"a12")?;

    assert!(SortedRun::open(&data, &index).is_err());
    Ok(())
}

// -------------------- Sequential cursor --------------------

#[test]
fn cursor_yields_records_in_key_order() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(
        dir.path(),
        "1",
        &[(b"a", b"1"), (b"b", b"22"), (b"c", b"333")],
    )?;

    let mut cursor = RunCursor::open(&data, &index)?;
    assert_eq!(cursor.next_record()?, Some((b"a".to_vec(), b"1".to_vec())));
    assert_eq!(cursor.next_record()?, Some((b"b".to_vec(), b"22".to_vec())));
    assert_eq!(cursor.next_record()?, Some((b"c".to_vec(), b"333".to_vec())));
    assert_eq!(cursor.next_record()?, None);
    assert_eq!(cursor.next_record()?, None);
    Ok(())
}

#[test]
fn cursor_on_empty_run() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[])?;

    let mut cursor = RunCursor::open(&data, &index)?;
    assert_eq!(cursor.next_record()?, None);
    Ok(())
}

// -------------------- Filter rebuild --------------------

#[test]
fn rebuild_filter_covers_every_key() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"x", b"1"), (b"y", b"2")])?;

    let run = SortedRun::open(&data, &index)?;
    let filter = run.rebuild_filter()?;
    assert!(filter.contains(b"x"));
    assert!(filter.contains(b"y"));
    Ok(())
}

// -------------------- File removal --------------------

#[test]
fn remove_files_deletes_the_pair() -> Result<()> {
    let dir = tempdir()?;
    let (data, index, _) = write_run(dir.path(), "1", &[(b"a", b"1")])?;

    let run = SortedRun::open(&data, &index)?;
    run.remove_files()?;
    assert!(!data.exists());
    assert!(!index.exists());

    // Open handles keep serving reads after the unlink.
    assert_eq!(run.find(b"a")?.as_deref(), Some(&b"1"[..]));
    Ok(())
}
