//! Backup job executor - Orchestrates one backup pass.
//!
//! This module ties together:
//! - Manifest building (scan of the source tree)
//! - Manifest comparison against the last committed manifest
//! - Snapshot creation when a change is detected
//! - Retention of snapshot directories
//!
//! A pass is synchronous and runs to completion. Per-entry problems end up in
//! the [`BackupResult`]; only a missing source or an unusable destination
//! abort the pass.

use crate::config::{Config, ManifestConfig};
use crate::fs::walker::{WalkOptions, WalkWarning};
use crate::manifest::{build_manifest, compare, Comparison, ManifestStore};
use crate::snapshot::{
    create_snapshot, enforce_retention, CopyOptions, RetentionPolicy, RetentionReport,
    SnapshotReport,
};
use crate::utils::{Result, SnapshotError};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Backup job configuration
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub retention: RetentionPolicy,
    pub manifest: ManifestConfig,
    pub preserve_mtime: bool,
    /// Commit the manifest even if some entries failed to copy
    pub commit_partial: bool,
    pub exclude: Vec<String>,
}

impl BackupJob {
    /// Build a job with default options.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            retention,
            manifest: ManifestConfig::default(),
            preserve_mtime: true,
            commit_partial: false,
            exclude: Vec::new(),
        }
    }

    /// Build a job from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source = config
            .backup
            .source
            .clone()
            .ok_or_else(|| SnapshotError::Config("no source directory given".into()))?;

        Ok(Self {
            source,
            destination: config.backup.destination.clone(),
            retention: RetentionPolicy::new(config.backup.max_snapshots)?,
            manifest: config.manifest.clone(),
            preserve_mtime: config.copy.preserve_mtime,
            commit_partial: config.copy.commit_partial,
            exclude: config.copy.exclude.clone(),
        })
    }
}

/// Backup execution result
#[derive(Debug, Serialize)]
pub struct BackupResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub manifest_entries: usize,
    pub manifest_bytes: usize,
    pub scan_warnings: Vec<WalkWarning>,
    pub comparison: Comparison,
    pub snapshot: Option<SnapshotReport>,
    pub manifest_committed: bool,
    /// The scan matched the last snapshot that was copied with failures
    pub unchanged_since_partial: bool,
    pub retention: Option<RetentionReport>,
    pub retention_error: Option<String>,
    pub duration_ms: u64,
}

/// Main backup executor
pub struct BackupExecutor {
    job: BackupJob,
}

impl BackupExecutor {
    pub fn new(job: BackupJob) -> Self {
        Self { job }
    }

    /// Execute one backup pass
    pub fn execute(&self) -> Result<BackupResult> {
        let start_time = Instant::now();
        let job = &self.job;

        info!(
            source = %job.source.display(),
            destination = %job.destination.display(),
            max_snapshots = job.retention.max_snapshots(),
            "Starting backup"
        );

        let source = open_source(&job.source)?;
        let destination = prepare_destination(&job.destination)?;
        if destination == source {
            return Err(SnapshotError::Config(format!(
                "destination {} is the source directory itself",
                destination.display()
            )));
        }

        let walk = WalkOptions {
            exclude_names: job.exclude.iter().map(OsString::from).collect(),
            exclude_paths: if destination.starts_with(&source) {
                info!(path = %destination.display(), "Destination lies inside the source, excluding it");
                vec![destination.clone()]
            } else {
                Vec::new()
            },
        };

        let manifest = build_manifest(&source, walk.clone());
        let bytes = manifest.to_bytes();
        info!(
            entries = manifest.len(),
            total_bytes = manifest.total_bytes(),
            warnings = manifest.warnings.len(),
            "Scanned source"
        );

        let store = ManifestStore::new(&destination, &job.manifest);
        if let Err(e) = store.write_current(&bytes) {
            warn!("Failed to write current manifest: {}", e);
        }

        let previous = store.load_previous().unwrap_or_else(|e| {
            warn!("Failed to read previous manifest, treating as first run: {}", e);
            None
        });
        let comparison = compare(previous.as_deref(), &bytes);

        let mut snapshot = None;
        let mut manifest_committed = false;
        let mut unchanged_since_partial = false;

        if comparison.identical {
            info!("No changes since last snapshot");
            if let Err(e) = store.clear_partial() {
                warn!("Failed to clear partial manifest: {}", e);
            }
        } else if matches_partial(&store, &bytes) {
            info!("No changes since last incomplete snapshot, not copying again");
            unchanged_since_partial = true;
        } else {
            info!(detail = ?comparison.detail, "Change detected, creating snapshot");

            let options = CopyOptions {
                preserve_mtime: job.preserve_mtime,
                walk,
            };
            let report = create_snapshot(&source, &destination, &options)?;

            if commit_allowed(&report, job.commit_partial) {
                match store.commit(&bytes) {
                    Ok(()) => manifest_committed = true,
                    Err(e) => error!("Failed to commit manifest: {}", e),
                }
            } else {
                warn!(
                    failures = report.failures.len(),
                    "Snapshot incomplete, keeping previous manifest until the tree changes again"
                );
                if let Err(e) = store.record_partial(&bytes) {
                    warn!("Failed to record partial manifest: {}", e);
                }
            }
            snapshot = Some(report);
        }

        let (retention, retention_error) = match enforce_retention(&destination, &job.retention) {
            Ok(report) => (Some(report), None),
            Err(e) => {
                error!("Retention failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            snapshot = snapshot.as_ref().map(|s| s.name.as_str()).unwrap_or("none"),
            committed = manifest_committed,
            duration_ms,
            "Backup completed"
        );

        Ok(BackupResult {
            source,
            destination,
            manifest_entries: manifest.len(),
            manifest_bytes: bytes.len(),
            scan_warnings: manifest.warnings,
            comparison,
            snapshot,
            manifest_committed,
            unchanged_since_partial,
            retention,
            retention_error,
            duration_ms,
        })
    }
}

/// Whether a snapshot's outcome allows committing its manifest.
fn commit_allowed(report: &SnapshotReport, commit_partial: bool) -> bool {
    report.is_complete() || commit_partial
}

/// Whether `bytes` is the scan an incomplete snapshot was already taken of.
fn matches_partial(store: &ManifestStore, bytes: &[u8]) -> bool {
    match store.load_partial() {
        Ok(partial) => compare(partial.as_deref(), bytes).identical,
        Err(e) => {
            warn!("Failed to read partial manifest, ignoring it: {}", e);
            false
        }
    }
}

/// Resolve the source root, failing if it is not a readable directory.
fn open_source(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|_| SnapshotError::SourceNotDirectory(path.to_path_buf()))?;
    match std::fs::read_dir(&canonical) {
        Ok(_) => Ok(canonical),
        Err(_) => Err(SnapshotError::SourceNotDirectory(path.to_path_buf())),
    }
}

fn prepare_destination(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path).map_err(|e| SnapshotError::io(path, e))?;
    path.canonicalize().map_err(|e| SnapshotError::io(path, e))
}
