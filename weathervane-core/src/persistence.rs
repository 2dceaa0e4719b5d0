//! Shared persistence utilities - atomic file writes, JSON load/save.
//!
//! Reports, registries, and tracked runs all persist through the same
//! staged-write pattern so a crash never leaves a half-written file
//! behind.

use std::io::{self, Write};
use std::path::Path;

/// Serialize `data` as pretty-printed JSON and write it atomically.
///
/// Creates parent directories as needed. The target file either keeps
/// its old contents or holds the complete new document, never a mix.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}

/// Atomically replace the file at `path` with `data`.
///
/// Stages the bytes in an unlinked-on-failure temp file in the same
/// directory, flushes it to disk, then renames over the target.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        label: String,
        count: u32,
    }

    #[test]
    fn test_atomic_write_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        let data = Sample {
            label: "cloudy".into(),
            count: 42,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Option<Sample> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifacts").join("nested").join("r.json");

        atomic_write_json(&path, &"ok").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_overwrite_leaves_no_staging_residue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.json");

        atomic_write_json(&path, &"first").unwrap();
        atomic_write_json(&path, &"second").unwrap();

        let loaded: Option<String> = load_json(&path).unwrap();
        assert_eq!(loaded.as_deref(), Some("second"));

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("clean.json")]);
    }

    #[test]
    fn test_load_json_missing_file() {
        let loaded: Option<Sample> = load_json(Path::new("/nonexistent/file.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_malformed_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{not json").unwrap();

        let loaded: io::Result<Option<Sample>> = load_json(&path);
        assert!(loaded.is_err());
    }
}
