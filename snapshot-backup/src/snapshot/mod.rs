//! Snapshot directories: naming, creation and retention.
//!
//! A snapshot is a full copy of the source tree stored under a directory
//! named after the source root's modification time, `YYYY-MM-DD-HH-MM-SS`
//! in local time. The fixed-width format makes name order chronological.

pub mod copier;
pub mod retention;

pub use copier::{create_snapshot, CopyFailure, CopyOptions, SnapshotReport};
pub use retention::{enforce_retention, list_snapshots, RetentionPolicy, RetentionReport};

use chrono::{DateTime, Local, NaiveDateTime};

/// strftime layout of snapshot directory names.
pub const SNAPSHOT_NAME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

const SNAPSHOT_NAME_LEN: usize = "YYYY-MM-DD-HH-MM-SS".len();

/// Directory name for a snapshot taken of a tree last modified at `time`.
pub fn snapshot_name(time: &DateTime<Local>) -> String {
    time.format(SNAPSHOT_NAME_FORMAT).to_string()
}

/// Directory name for a modification time given in epoch seconds.
pub fn snapshot_name_from_secs(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|utc| snapshot_name(&utc.with_timezone(&Local)))
}

/// Parse a directory name back into its timestamp; `None` for anything that
/// is not exactly a snapshot name.
pub fn parse_snapshot_name(name: &str) -> Option<NaiveDateTime> {
    if name.len() != SNAPSHOT_NAME_LEN || !name.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        return None;
    }
    NaiveDateTime::parse_from_str(name, SNAPSHOT_NAME_FORMAT).ok()
}
