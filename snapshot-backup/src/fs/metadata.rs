//! File metadata handling for snapshot operations.
//!
//! This module captures the metadata a manifest records (type, size, inode
//! change and modification times) and the bits a snapshot must reproduce
//! (permission mode, modification time).

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::Path;

/// Mask covering permission bits plus setuid/setgid/sticky.
pub const MODE_MASK: u32 = 0o7777;

/// Kind of filesystem object an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Regular,
    Directory,
    Symlink,
    Fifo,
    CharDevice,
    BlockDevice,
    Socket,
    Unknown,
}

impl EntryType {
    /// Classify a file type without following symlinks.
    pub fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryType::Symlink
        } else if file_type.is_dir() {
            EntryType::Directory
        } else if file_type.is_file() {
            EntryType::Regular
        } else if file_type.is_fifo() {
            EntryType::Fifo
        } else if file_type.is_char_device() {
            EntryType::CharDevice
        } else if file_type.is_block_device() {
            EntryType::BlockDevice
        } else if file_type.is_socket() {
            EntryType::Socket
        } else {
            EntryType::Unknown
        }
    }

    /// Dirent-style tag written into manifests.
    pub fn tag(self) -> &'static str {
        match self {
            EntryType::Regular => "DT_REG",
            EntryType::Directory => "DT_DIR",
            EntryType::Symlink => "DT_LNK",
            EntryType::Fifo => "DT_FIFO",
            EntryType::CharDevice => "DT_CHR",
            EntryType::BlockDevice => "DT_BLK",
            EntryType::Socket => "DT_SOCK",
            EntryType::Unknown => "DT_UNKNOWN",
        }
    }

    /// Whether the snapshot copier reproduces this kind of entry.
    pub fn is_copyable(self) -> bool {
        matches!(
            self,
            EntryType::Regular | EntryType::Directory | EntryType::Symlink
        )
    }
}

/// Metadata of a single filesystem entry, read without following symlinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub entry_type: EntryType,

    /// Size in bytes (always 0 for directories)
    pub size: u64,

    /// Unix mode bits including setuid/setgid/sticky
    pub mode: u32,

    /// Inode change time (seconds since Unix epoch)
    pub changed: i64,

    /// Last modified time (seconds since Unix epoch)
    pub modified: i64,

    /// Sub-second part of the modification time
    pub modified_nanos: u32,
}

impl EntryMetadata {
    /// Extract metadata from a full path. Symlinks are not followed.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(Self::from_std(&metadata))
    }

    /// Convert already-fetched `std` metadata.
    pub fn from_std(metadata: &fs::Metadata) -> Self {
        let entry_type = EntryType::from_file_type(metadata.file_type());
        let size = if entry_type == EntryType::Directory {
            0
        } else {
            metadata.len()
        };

        Self {
            entry_type,
            size,
            mode: metadata.mode() & MODE_MASK,
            changed: metadata.ctime(),
            modified: metadata.mtime(),
            modified_nanos: metadata.mtime_nsec().clamp(0, 999_999_999) as u32,
        }
    }

    /// Modification time as a `FileTime`.
    pub fn modified_time(&self) -> FileTime {
        FileTime::from_unix_time(self.modified, self.modified_nanos)
    }

    /// Apply the full permission set (including special bits) to `path`.
    pub fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))
    }

    /// Apply the recorded modification time to `path`.
    ///
    /// For symlinks the link itself is touched, never its target.
    pub fn apply_modified_time(&self, path: &Path) -> std::io::Result<()> {
        let mtime = self.modified_time();
        if self.entry_type == EntryType::Symlink {
            filetime::set_symlink_file_times(path, mtime, mtime)
        } else {
            filetime::set_file_mtime(path, mtime)
        }
    }
}
