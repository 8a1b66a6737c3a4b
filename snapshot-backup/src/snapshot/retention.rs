//! Snapshot retention.
//!
//! Only direct children of the destination root that are real directories
//! with a well-formed snapshot name count towards the limit. Manifests, temp
//! files and anything else a user drops there are left alone.

use super::parse_snapshot_name;
use crate::utils::{Result, SnapshotError};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// How many snapshots to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    max_snapshots: usize,
}

impl RetentionPolicy {
    pub fn new(max_snapshots: usize) -> Result<Self> {
        if max_snapshots == 0 {
            return Err(SnapshotError::Config(
                "max_snapshots must be a positive integer".into(),
            ));
        }
        Ok(Self { max_snapshots })
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }
}

/// A snapshot directory found under the destination root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDir {
    pub name: String,
    pub path: PathBuf,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// Remaining snapshots, oldest first
    pub kept: Vec<String>,
    /// Snapshots deleted by this pass, oldest first
    pub removed: Vec<String>,
}

/// List snapshot directories under `destination`, oldest first.
///
/// A destination that does not exist yet holds no snapshots.
pub fn list_snapshots(destination: &Path) -> Result<Vec<SnapshotDir>> {
    let read_dir = match fs::read_dir(destination) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SnapshotError::io(destination, e)),
    };

    let mut snapshots = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| SnapshotError::io(destination, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if parse_snapshot_name(&name).is_none() {
            continue;
        }
        // file_type() does not follow symlinks
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => snapshots.push(SnapshotDir {
                path: entry.path(),
                name,
            }),
            _ => continue,
        }
    }

    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshots)
}

/// Delete the oldest snapshots until at most `policy.max_snapshots()` remain.
///
/// Stops at the first deletion that fails so a newer snapshot is never
/// removed in place of an older one; the failed directory still sorts oldest
/// and is retried on the next pass.
pub fn enforce_retention(destination: &Path, policy: &RetentionPolicy) -> Result<RetentionReport> {
    let snapshots = list_snapshots(destination)?;
    let excess = snapshots.len().saturating_sub(policy.max_snapshots());

    let mut report = RetentionReport::default();
    for (idx, snapshot) in snapshots.into_iter().enumerate() {
        if idx < excess {
            remove_snapshot(&snapshot.path)?;
            info!(snapshot = %snapshot.name, "Removed old snapshot");
            report.removed.push(snapshot.name);
        } else {
            report.kept.push(snapshot.name);
        }
    }

    Ok(report)
}

fn remove_snapshot(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            // Snapshots mirror read-only source directories; unlock and retry once.
            warn!(path = %path.display(), "Snapshot has read-only directories, retrying removal");
            make_dirs_writable(path);
            fs::remove_dir_all(path).map_err(|source| SnapshotError::Retention {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(SnapshotError::Retention {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn make_dirs_writable(root: &Path) {
    for entry in WalkDir::new(root).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let mode = meta.permissions().mode();
        if mode & 0o700 != 0o700 {
            let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode | 0o700));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NAMES: [&str; 4] = [
        "2024-01-01-00-00-00",
        "2024-01-02-00-00-00",
        "2024-01-03-00-00-00",
        "2024-01-04-00-00-00",
    ];

    fn destination_with_snapshots() -> std::io::Result<TempDir> {
        let dest = TempDir::new()?;
        // Created out of order on purpose.
        for name in [NAMES[2], NAMES[0], NAMES[3], NAMES[1]] {
            fs::create_dir(dest.path().join(name))?;
            fs::write(dest.path().join(name).join("data.txt"), name)?;
        }
        fs::write(dest.path().join("manifest.new"), b"scan")?;
        fs::write(dest.path().join("manifest.last"), b"scan")?;
        Ok(dest)
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert!(RetentionPolicy::new(0).is_err());
        assert_eq!(RetentionPolicy::new(3).unwrap().max_snapshots(), 3);
    }

    #[test]
    fn test_missing_destination_is_a_noop() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("not-yet");

        let report = enforce_retention(&missing, &RetentionPolicy::new(1)?)?;
        assert!(report.kept.is_empty());
        assert!(report.removed.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_sorts_and_filters() -> Result<()> {
        let dest = destination_with_snapshots().unwrap();
        fs::write(dest.path().join("2024-01-05-00-00-00"), b"stray file").unwrap();
        std::os::unix::fs::symlink(
            dest.path().join(NAMES[0]),
            dest.path().join("2024-01-06-00-00-00"),
        )
        .unwrap();
        fs::create_dir(dest.path().join("notes")).unwrap();

        let names: Vec<String> = list_snapshots(dest.path())?.into_iter().map(|s| s.name).collect();
        assert_eq!(names, NAMES.to_vec());
        Ok(())
    }

    #[test]
    fn test_keeps_newest() -> Result<()> {
        let dest = destination_with_snapshots().unwrap();

        let report = enforce_retention(dest.path(), &RetentionPolicy::new(2)?)?;

        assert_eq!(report.removed, vec![NAMES[0], NAMES[1]]);
        assert_eq!(report.kept, vec![NAMES[2], NAMES[3]]);
        assert!(!dest.path().join(NAMES[0]).exists());
        assert!(!dest.path().join(NAMES[1]).exists());
        assert!(dest.path().join(NAMES[3]).join("data.txt").exists());
        assert!(dest.path().join("manifest.new").exists());
        assert!(dest.path().join("manifest.last").exists());
        Ok(())
    }

    #[test]
    fn test_is_idempotent() -> Result<()> {
        let dest = destination_with_snapshots().unwrap();
        let policy = RetentionPolicy::new(3)?;

        let first = enforce_retention(dest.path(), &policy)?;
        let second = enforce_retention(dest.path(), &policy)?;

        assert_eq!(first.removed, vec![NAMES[0]]);
        assert!(second.removed.is_empty());
        assert_eq!(first.kept, second.kept);
        Ok(())
    }

    #[test]
    fn test_under_limit_removes_nothing() -> Result<()> {
        let dest = destination_with_snapshots().unwrap();

        let report = enforce_retention(dest.path(), &RetentionPolicy::new(10)?)?;
        assert!(report.removed.is_empty());
        assert_eq!(report.kept.len(), 4);
        Ok(())
    }

    #[test]
    fn test_removes_read_only_snapshot() -> Result<()> {
        let dest = destination_with_snapshots().unwrap();
        let locked = dest.path().join(NAMES[0]).join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("file"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        let report = enforce_retention(dest.path(), &RetentionPolicy::new(3)?)?;

        assert_eq!(report.removed, vec![NAMES[0]]);
        assert!(!dest.path().join(NAMES[0]).exists());
        Ok(())
    }
}
