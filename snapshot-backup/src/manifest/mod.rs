//! Manifest types and their on-disk line format.
//!
//! A manifest records every entry of a scanned tree in traversal order. Its
//! serialized bytes are the unit of change detection: two scans are the same
//! iff they serialize identically.
//!
//! Line layout, one entry per line, indented with one tab per depth level:
//!
//! ```text
//! <type>\t<size>\t<changed>\t<modified>\t<name>\n
//! ```

pub mod builder;
pub mod store;

pub use builder::build_manifest;
pub use store::{compare, Comparison, ComparisonDetail, ManifestStore};

use crate::fs::metadata::EntryType;
use crate::fs::walker::WalkWarning;
use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// `ctime(3)` layout, e.g. `Thu Jan  1 00:00:00 1970`.
pub const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// A single inventoried entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub relative_path: PathBuf,
    pub name: OsString,
    pub entry_type: EntryType,
    pub size_bytes: u64,
    pub created_at: String,
    pub modified_at: String,
    pub depth: usize,
}

impl ManifestEntry {
    /// Append this entry's line to `out`.
    pub fn write_line(&self, out: &mut Vec<u8>) {
        out.extend(std::iter::repeat(b'\t').take(self.depth));
        out.extend_from_slice(self.entry_type.tag().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.size_bytes.to_string().as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.created_at.as_bytes());
        out.push(b'\t');
        out.extend_from_slice(self.modified_at.as_bytes());
        out.push(b'\t');
        escape_name(self.name.as_bytes(), out);
        out.push(b'\n');
    }
}

/// Ordered inventory of a tree.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Root that was scanned (not serialized)
    pub root: PathBuf,

    /// When the scan started (not serialized)
    pub scanned_at: DateTime<Local>,

    pub entries: Vec<ManifestEntry>,

    /// Entries that could not be read and were left out
    pub warnings: Vec<WalkWarning>,
}

impl Manifest {
    /// Serialized form used for storage and byte-exact comparison.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 64);
        for entry in &self.entries {
            entry.write_line(&mut out);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the recorded sizes of all non-directory entries.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

/// Render seconds since the epoch in local time using [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(utc) => utc.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
        None => secs.to_string(),
    }
}

/// Keep each name on one line: `\` → `\\`, tab → `\t`, newline → `\n`.
fn escape_name(name: &[u8], out: &mut Vec<u8>) {
    for &byte in name {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            other => out.push(other),
        }
    }
}
