//! Persistence and comparison of the "current" and "previous" manifests.
//!
//! A third file, the "partial" manifest, holds the scan of the last snapshot
//! that was copied with failures. It keeps an unchanged tree with an entry
//! that can never be copied from producing a new snapshot on every run.
//!
//! All files live directly under the destination root. Every write goes
//! through a temp file in the same directory followed by fsync and rename, so
//! a failed write never leaves a truncated manifest behind.

use crate::config::ManifestConfig;
use crate::utils::{Result, SnapshotError};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of comparing two serialized manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub identical: bool,
    pub detail: ComparisonDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonDetail {
    Identical,
    /// Nothing committed yet (first run)
    NoPrevious,
    LengthMismatch { previous: usize, current: usize },
    /// Same length, first differing byte at `offset`
    ContentMismatch { offset: usize },
}

/// Byte-exact comparison. A missing previous manifest never matches.
pub fn compare(previous: Option<&[u8]>, current: &[u8]) -> Comparison {
    let detail = match previous {
        None => ComparisonDetail::NoPrevious,
        Some(prev) if prev.len() != current.len() => ComparisonDetail::LengthMismatch {
            previous: prev.len(),
            current: current.len(),
        },
        Some(prev) => match prev.iter().zip(current).position(|(a, b)| a != b) {
            Some(offset) => ComparisonDetail::ContentMismatch { offset },
            None => ComparisonDetail::Identical,
        },
    };

    Comparison {
        identical: detail == ComparisonDetail::Identical,
        detail,
    }
}

/// The manifest files under a destination root.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    current_path: PathBuf,
    previous_path: PathBuf,
    partial_path: PathBuf,
}

impl ManifestStore {
    pub fn new(destination: &Path, names: &ManifestConfig) -> Self {
        Self {
            current_path: destination.join(&names.current_file),
            previous_path: destination.join(&names.previous_file),
            partial_path: destination.join(&names.partial_file),
        }
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn previous_path(&self) -> &Path {
        &self.previous_path
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Rewrite the "current" manifest. Happens on every run.
    pub fn write_current(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.current_path, bytes)
    }

    /// Load the committed "previous" manifest, `None` on the first run.
    pub fn load_previous(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.previous_path)
    }

    /// Replace the "previous" manifest with `bytes` and forget any
    /// incomplete attempt.
    pub fn commit(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.previous_path, bytes)?;
        debug!(path = %self.previous_path.display(), bytes = bytes.len(), "Manifest committed");
        if let Err(e) = self.clear_partial() {
            warn!("Failed to clear partial manifest: {}", e);
        }
        Ok(())
    }

    /// Load the manifest of the last incomplete snapshot, if any.
    pub fn load_partial(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.partial_path)
    }

    /// Remember `bytes` as the scan behind an incomplete snapshot.
    pub fn record_partial(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.partial_path, bytes)
    }

    pub fn clear_partial(&self) -> Result<()> {
        match fs::remove_file(&self.partial_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::io(&self.partial_path, e)),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SnapshotError::io(path, e)),
    }
}

/// Write `bytes` to `<path>.tmp`, fsync, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(SnapshotError::io(&tmp_path, e));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SnapshotError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ManifestStore {
        ManifestStore::new(dir.path(), &ManifestConfig::default())
    }

    #[test]
    fn test_first_run_is_never_identical() {
        let result = compare(None, b"");
        assert!(!result.identical);
        assert_eq!(result.detail, ComparisonDetail::NoPrevious);
    }

    #[test]
    fn test_identical_bytes() {
        let result = compare(Some(b"DT_REG\t1\n"), b"DT_REG\t1\n");
        assert!(result.identical);
        assert_eq!(result.detail, ComparisonDetail::Identical);
    }

    #[test]
    fn test_length_mismatch() {
        let result = compare(Some(b"DT_REG\t1\n"), b"DT_REG\t12\n");
        assert!(!result.identical);
        assert_eq!(
            result.detail,
            ComparisonDetail::LengthMismatch { previous: 9, current: 10 }
        );
    }

    #[test]
    fn test_single_byte_difference() {
        let result = compare(Some(b"line-a\nline-b\n"), b"line-a\nline-c\n");
        assert!(!result.identical);
        assert_eq!(result.detail, ComparisonDetail::ContentMismatch { offset: 12 });
    }

    #[test]
    fn test_reordering_is_a_difference() {
        let result = compare(Some(b"a\nb\n"), b"b\na\n");
        assert!(!result.identical);
    }

    #[test]
    fn test_load_previous_missing() -> Result<()> {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load_previous()?, None);
        Ok(())
    }

    #[test]
    fn test_commit_then_load() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.commit(b"first\n")?;
        store.commit(b"second\n")?;

        assert_eq!(store.load_previous()?, Some(b"second\n".to_vec()));
        assert!(!dir.path().join("manifest.last.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_write_current_leaves_previous_alone() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.commit(b"committed\n")?;
        store.write_current(b"fresh scan\n")?;

        assert_eq!(fs::read(store.current_path()).unwrap(), b"fresh scan\n");
        assert_eq!(store.load_previous()?, Some(b"committed\n".to_vec()));
        Ok(())
    }

    #[test]
    fn test_commit_forgets_partial_attempt() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(store.load_partial()?, None);
        store.record_partial(b"incomplete\n")?;
        assert_eq!(store.load_partial()?, Some(b"incomplete\n".to_vec()));

        store.commit(b"complete\n")?;
        assert_eq!(store.load_partial()?, None);
        assert!(!store.partial_path().exists());
        store.clear_partial()?;
        Ok(())
    }

    #[test]
    fn test_failed_commit_keeps_old_manifest() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.commit(b"committed\n")?;

        // A directory squatting on the temp name makes the write fail.
        fs::create_dir(dir.path().join("manifest.last.tmp")).unwrap();
        assert!(store.commit(b"replacement\n").is_err());

        assert_eq!(store.load_previous()?, Some(b"committed\n".to_vec()));
        Ok(())
    }
}
