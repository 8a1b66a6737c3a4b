//! Custom error types for the snapshot engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Source is not a readable directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path too long ({len} bytes, limit {limit}): {}", path.display())]
    PathTooLong {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    #[error("No free snapshot name near {name} under {}", root.display())]
    SnapshotNameExhausted { root: PathBuf, name: String },

    #[error("Failed to remove snapshot {}: {source}", path.display())]
    Retention {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_path() {
        let err = SnapshotError::io(
            "/data/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/missing"));
        assert!(msg.contains("gone"));
    }
}
