//! Full-copy snapshot creation.
//!
//! The source tree is walked in manifest order and mirrored under a fresh
//! timestamp-named directory. Regular files are streamed byte-for-byte,
//! directories are recreated and symlinks are recreated pointing at the same
//! target. Fifos, sockets and device nodes are listed in the report but not
//! copied.
//!
//! Directories are created owner-writable first; their full mode (including
//! setuid/setgid/sticky, which `mkdir` masks) and times are applied in a
//! second pass once their contents are in place, deepest first.

use crate::fs::metadata::{EntryMetadata, EntryType};
use crate::fs::walker::{TreeEntry, TreeWalk, WalkOptions};
use crate::snapshot::snapshot_name;
use crate::utils::{paths, Result, SnapshotError};
use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How far past the source mtime a free snapshot name is searched for.
const MAX_NAME_ATTEMPTS: i64 = 86_400;

/// Snapshot copy options
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Copy modification times onto the snapshot entries
    pub preserve_mtime: bool,

    /// Entries left out of the copy
    pub walk: WalkOptions,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            preserve_mtime: true,
            walk: WalkOptions::default(),
        }
    }
}

/// An entry that could not be (fully) reproduced in the snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Snapshot creation result
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotReport {
    pub name: String,
    pub path: PathBuf,
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
    pub bytes: u64,

    /// Special entries (fifos, sockets, devices) that were not copied
    pub skipped: Vec<PathBuf>,

    /// Entries the walk could not read; the scan reports these already
    pub unreadable: usize,

    pub failures: Vec<CopyFailure>,
}

impl SnapshotReport {
    fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            directories: 0,
            files: 0,
            symlinks: 0,
            bytes: 0,
            skipped: Vec::new(),
            unreadable: 0,
            failures: Vec::new(),
        }
    }

    /// True when every copyable entry made it into the snapshot intact.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, error: impl ToString) {
        let error = error.to_string();
        warn!(path = %path.display(), %error, "Snapshot entry failed");
        self.failures.push(CopyFailure {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// Create a new snapshot of `source` under `destination`.
///
/// Errors are returned only when the snapshot directory itself cannot be
/// created; everything below it is best-effort and reported per entry.
pub fn create_snapshot(
    source: &Path,
    destination: &Path,
    options: &CopyOptions,
) -> Result<SnapshotReport> {
    let source_meta = fs::metadata(source)
        .map(|m| EntryMetadata::from_std(&m))
        .map_err(|e| SnapshotError::io(source, e))?;
    if source_meta.entry_type != EntryType::Directory {
        return Err(SnapshotError::SourceNotDirectory(source.to_path_buf()));
    }

    let (name, snapshot_path) = reserve_snapshot_dir(destination, &source_meta)?;
    info!(
        source = %source.display(),
        snapshot = %snapshot_path.display(),
        "Creating snapshot"
    );

    let mut report = SnapshotReport::new(name, snapshot_path.clone());
    let mut pending_dirs = vec![(snapshot_path.clone(), source_meta)];

    let mut walk = TreeWalk::new(source, options.walk.clone());
    while let Some(item) = walk.next() {
        let entry = match item {
            Ok(entry) => entry,
            Err(warning) => {
                debug!(%warning, "Not copying unreadable entry");
                report.unreadable += 1;
                continue;
            }
        };

        let target = match paths::join_checked(&snapshot_path, &entry.relative_path) {
            Ok(target) => target,
            Err(e) => {
                report.fail(&entry.path, e);
                if entry.is_dir() {
                    walk.skip_current_dir();
                }
                continue;
            }
        };

        match entry.metadata.entry_type {
            EntryType::Directory => match create_directory(&target, entry.metadata.mode) {
                Ok(()) => {
                    report.directories += 1;
                    pending_dirs.push((target, entry.metadata));
                }
                Err(e) => {
                    report.fail(&target, e);
                    walk.skip_current_dir();
                }
            },
            EntryType::Regular => copy_file_entry(&entry, &target, options, &mut report),
            EntryType::Symlink => copy_symlink_entry(&entry, &target, options, &mut report),
            other => {
                debug!(path = %entry.path.display(), kind = other.tag(), "Not copying special entry");
                report.skipped.push(entry.relative_path);
            }
        }
    }

    // Children before parents, so adding entries never disturbs a parent's
    // restored mtime and read-only parents were still writable while filled.
    for (dir, meta) in pending_dirs.iter().rev() {
        if let Err(e) = meta.apply_permissions(dir) {
            report.fail(dir, format!("applying mode {:o}: {e}", meta.mode));
        }
        if options.preserve_mtime {
            if let Err(e) = meta.apply_modified_time(dir) {
                report.fail(dir, format!("applying mtime: {e}"));
            }
        }
    }

    info!(
        snapshot = %report.name,
        directories = report.directories,
        files = report.files,
        symlinks = report.symlinks,
        bytes = report.bytes,
        skipped = report.skipped.len(),
        unreadable = report.unreadable,
        failures = report.failures.len(),
        "Snapshot created"
    );

    Ok(report)
}

/// Create the snapshot directory under the first free name at or after the
/// source root's mtime.
fn reserve_snapshot_dir(destination: &Path, source_meta: &EntryMetadata) -> Result<(String, PathBuf)> {
    let base: DateTime<Local> = DateTime::from_timestamp(source_meta.modified, 0)
        .unwrap_or_default()
        .with_timezone(&Local);
    let base_name = snapshot_name(&base);

    for offset in 0..MAX_NAME_ATTEMPTS {
        let Some(name) = candidate_name(&base, offset) else {
            break;
        };
        let path = paths::join_checked(destination, &name)?;

        match create_directory(&path, source_meta.mode) {
            Ok(()) => {
                if offset > 0 {
                    info!(taken = %base_name, using = %name, "Snapshot name already in use");
                }
                return Ok((name, path));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(SnapshotError::io(&path, e)),
        }
    }

    Err(SnapshotError::SnapshotNameExhausted {
        root: destination.to_path_buf(),
        name: base_name,
    })
}

fn candidate_name(base: &DateTime<Local>, offset: i64) -> Option<String> {
    base.checked_add_signed(TimeDelta::seconds(offset))
        .map(|time| snapshot_name(&time))
}

/// First step of the two-step directory creation: base permission bits,
/// kept owner-writable until the contents are copied.
fn create_directory(path: &Path, mode: u32) -> io::Result<()> {
    DirBuilder::new().mode((mode & 0o777) | 0o700).create(path)
}

fn copy_file_entry(entry: &TreeEntry, target: &Path, options: &CopyOptions, report: &mut SnapshotReport) {
    match copy_file_contents(&entry.path, target) {
        Ok(bytes) => {
            report.files += 1;
            report.bytes += bytes;
        }
        Err(e) => {
            report.fail(&entry.path, e);
            return;
        }
    }

    // Mode goes on after the content so read-only and setuid files copy too.
    if let Err(e) = entry.metadata.apply_permissions(target) {
        report.fail(target, format!("applying mode {:o}: {e}", entry.metadata.mode));
    }
    if options.preserve_mtime {
        if let Err(e) = entry.metadata.apply_modified_time(target) {
            report.fail(target, format!("applying mtime: {e}"));
        }
    }
}

fn copy_file_contents(source: &Path, target: &Path) -> io::Result<u64> {
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(target)?;
    io::copy(&mut reader, &mut writer)
}

fn copy_symlink_entry(entry: &TreeEntry, target: &Path, options: &CopyOptions, report: &mut SnapshotReport) {
    let link_target = match fs::read_link(&entry.path) {
        Ok(t) => t,
        Err(e) => {
            report.fail(&entry.path, e);
            return;
        }
    };

    if let Err(e) = std::os::unix::fs::symlink(&link_target, target) {
        report.fail(target, e);
        return;
    }
    report.symlinks += 1;

    if options.preserve_mtime {
        if let Err(e) = entry.metadata.apply_modified_time(target) {
            report.fail(target, format!("applying mtime: {e}"));
        }
    }
}
