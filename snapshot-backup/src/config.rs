//! Configuration management for snapshot-backup.
//!
//! Loads configuration from an optional TOML file; command-line flags are
//! layered on top by the binary.

use crate::snapshot::parse_snapshot_name;
use crate::utils::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub manifest: ManifestConfig,
    pub copy: CopyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory tree to back up
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// Root holding manifests and snapshot directories
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    /// Maximum number of snapshot directories kept
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Manifest of the latest scan, rewritten every run
    #[serde(default = "default_current_file")]
    pub current_file: String,

    /// Manifest committed on the latest handled change
    #[serde(default = "default_previous_file")]
    pub previous_file: String,

    /// Manifest of the last snapshot that was copied with failures
    #[serde(default = "default_partial_file")]
    pub partial_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Copy modification times into snapshots
    #[serde(default = "default_preserve_mtime")]
    pub preserve_mtime: bool,

    /// Commit the manifest even when some entries failed to copy
    #[serde(default)]
    pub commit_partial: bool,

    /// Entry names skipped (with their subtrees) in scan and copy
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_destination() -> PathBuf {
    PathBuf::from("backups")
}

fn default_max_snapshots() -> usize {
    5
}

fn default_current_file() -> String {
    "manifest.new".to_string()
}

fn default_previous_file() -> String {
    "manifest.last".to_string()
}

fn default_partial_file() -> String {
    "manifest.partial".to_string()
}

fn default_preserve_mtime() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination: default_destination(),
            max_snapshots: default_max_snapshots(),
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            current_file: default_current_file(),
            previous_file: default_previous_file(),
            partial_file: default_partial_file(),
        }
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            preserve_mtime: default_preserve_mtime(),
            commit_partial: false,
            exclude: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check the values a backup run depends on.
    pub fn validate(&self) -> Result<()> {
        if self.backup.source.is_none() {
            return Err(SnapshotError::Config("no source directory given".into()));
        }
        if self.backup.max_snapshots == 0 {
            return Err(SnapshotError::Config(
                "max_snapshots must be a positive integer".into(),
            ));
        }

        let names = [
            &self.manifest.current_file,
            &self.manifest.previous_file,
            &self.manifest.partial_file,
        ];
        for name in names {
            if name.is_empty() || name.contains('/') {
                return Err(SnapshotError::Config(format!(
                    "invalid manifest file name {name:?}"
                )));
            }
            if parse_snapshot_name(name).is_some() {
                return Err(SnapshotError::Config(format!(
                    "manifest file name {name:?} collides with the snapshot naming format"
                )));
            }
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(SnapshotError::Config(
                "current, previous and partial manifest files must all differ".into(),
            ));
        }

        Ok(())
    }
}
