//! Builds a [`Manifest`] from the current state of a directory tree.

use super::{format_timestamp, Manifest, ManifestEntry};
use crate::fs::walker::{TreeWalk, WalkOptions};
use chrono::Local;
use std::path::Path;
use tracing::{debug, warn};

/// Inventory everything below `root`.
///
/// Unreadable entries are left out and recorded in `Manifest::warnings`; the
/// scan itself never fails. Callers are expected to have checked that `root`
/// is a directory.
pub fn build_manifest(root: &Path, options: WalkOptions) -> Manifest {
    let scanned_at = Local::now();
    let mut entries = Vec::new();
    let mut warnings = Vec::new();

    for item in TreeWalk::new(root, options) {
        match item {
            Ok(entry) => entries.push(ManifestEntry {
                created_at: format_timestamp(entry.metadata.changed),
                modified_at: format_timestamp(entry.metadata.modified),
                entry_type: entry.metadata.entry_type,
                size_bytes: entry.metadata.size,
                relative_path: entry.relative_path,
                name: entry.name,
                depth: entry.depth,
            }),
            Err(warning) => {
                warn!(%warning, "Skipping unreadable entry during scan");
                warnings.push(warning);
            }
        }
    }

    debug!(
        root = %root.display(),
        entries = entries.len(),
        warnings = warnings.len(),
        "Manifest built"
    );

    Manifest {
        root: root.to_path_buf(),
        scanned_at,
        entries,
        warnings,
    }
}
