//! Snapshot Backup Library
//!
//! Manifest-based change detection and retention-bounded full-copy snapshots
//! of a directory tree.

pub mod config;
pub mod executor;
pub mod fs;
pub mod manifest;
pub mod snapshot;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupExecutor, BackupJob, BackupResult};
pub use utils::errors::SnapshotError;
pub type Result<T> = std::result::Result<T, SnapshotError>;
