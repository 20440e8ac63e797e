//! Atomic JSON file I/O.
//!
//! Writes serialize into a sibling temporary file, fsync it, and rename over
//! the destination, so readers never observe partial content even without a
//! lock. A failed write leaves the temporary file removed (tempfile drops
//! unlink it) and the destination untouched.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{Result, TeamsError};

/// Atomically write `value` as pretty JSON to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| TeamsError::Storage(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| TeamsError::Storage(format!("rename into {}: {}", path.display(), e.error)))?;
    Ok(())
}

/// Read and deserialize a JSON file. Missing files are storage errors; use
/// [`read_json_opt`] where absence is meaningful.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path)
        .map_err(|e| TeamsError::Storage(format!("read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&data)
        .map_err(|e| TeamsError::Storage(format!("parse {}: {}", path.display(), e)))
}

/// Read a JSON file, returning `None` when it does not exist.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read(path) {
        Ok(data) => serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| TeamsError::Storage(format!("parse {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TeamsError::Storage(format!(
            "read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("value.json");
        let value = json!({"name": "demo", "count": 3});

        write_json(&path, &value).unwrap();
        let back: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_overwrite_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("value.json");

        write_json(&path, &json!({"long": "x".repeat(4096)})).unwrap();
        write_json(&path, &json!({"short": true})).unwrap();

        let back: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(back, json!({"short": true}));
    }

    #[test]
    fn test_no_stray_temp_files_after_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("value.json");
        write_json(&path, &json!([1, 2, 3])).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("value.json")]);
    }

    #[test]
    fn test_read_json_opt_missing() {
        let dir = TempDir::new().unwrap();
        let missing: Option<serde_json::Value> =
            read_json_opt(&dir.path().join("absent.json")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_read_corrupt_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = read_json::<serde_json::Value>(&path).unwrap_err();
        assert_eq!(err.kind(), "ErrStorage");
    }
}
