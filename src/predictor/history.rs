//! The append-only `log_history.bin` file: fixed 16-byte records
//! `{i64 ts_ms, f32 in0, f32 in1}`, little-endian, used both by the
//! preprocessor (append on every accepted datapoint) and the predictor
//! (warm-start sweep at startup).

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::error::PersistenceError;

pub const RECORD_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub ts_ms: i64,
    pub in0: f32,
    pub in1: f32,
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Append one record to the history file, creating the parent directory
/// and the file itself on demand. Best-effort: callers log and continue
/// on failure rather than treating it as fatal.
pub fn append(path: &Path, entry: HistoryEntry) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    let mut buf = [0u8; RECORD_SIZE as usize];
    buf[0..8].copy_from_slice(&entry.ts_ms.to_le_bytes());
    buf[8..12].copy_from_slice(&entry.in0.to_le_bytes());
    buf[12..16].copy_from_slice(&entry.in1.to_le_bytes());
    file.write_all(&buf).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Load every well-formed record in the file. If the file length is not a
/// multiple of [`RECORD_SIZE`], the trailing partial record is dropped and
/// a [`PersistenceError::CorruptHistory`] is reported alongside the
/// records that could be recovered — callers are expected to log the
/// error and proceed with the partial result rather than treat it as fatal.
pub fn load_all(path: &Path) -> Result<Vec<HistoryEntry>, PersistenceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let len = file.metadata().map_err(|e| io_err(path, e))?.len();
    let n_complete = len / RECORD_SIZE;
    let remainder = len % RECORD_SIZE;

    let mut reader = BufReader::new(file);
    let mut entries = Vec::with_capacity(n_complete as usize);
    for _ in 0..n_complete {
        let mut buf = [0u8; RECORD_SIZE as usize];
        reader.read_exact(&mut buf).map_err(|e| io_err(path, e))?;
        let ts_ms = i64::from_le_bytes(buf[0..8].try_into().expect("8 bytes"));
        let in0 = f32::from_le_bytes(buf[8..12].try_into().expect("4 bytes"));
        let in1 = f32::from_le_bytes(buf[12..16].try_into().expect("4 bytes"));
        entries.push(HistoryEntry { ts_ms, in0, in1 });
    }

    if remainder != 0 {
        return Err(PersistenceError::CorruptHistory {
            len,
            record_size: RECORD_SIZE,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log_history.bin");
        append(&path, HistoryEntry { ts_ms: 1700000000000, in0: 0.75, in1: 0.5 }).unwrap();
        append(&path, HistoryEntry { ts_ms: 1700000001000, in0: 0.1, in1: 0.2 }).unwrap();

        let entries = load_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ts_ms, 1700000000000);
        assert!((entries[0].in0 - 0.75).abs() < 1e-6);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.bin");
        assert_eq!(load_all(&path).unwrap(), Vec::new());
    }

    #[test]
    fn file_length_is_always_a_multiple_of_record_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log_history.bin");
        for i in 0..10 {
            append(&path, HistoryEntry { ts_ms: i, in0: 0.0, in1: 0.0 }).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len % RECORD_SIZE, 0);
        assert_eq!(len, 10 * RECORD_SIZE);
    }

    #[test]
    fn truncated_file_reports_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log_history.bin");
        append(&path, HistoryEntry { ts_ms: 1, in0: 0.0, in1: 0.0 }).unwrap();
        // Truncate to a non-multiple of RECORD_SIZE.
        let f = OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(RECORD_SIZE - 3).unwrap();
        drop(f);
        let err = load_all(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptHistory { .. }));
    }
}
