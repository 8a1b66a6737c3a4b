//! Deterministic directory traversal with metadata capture.
//!
//! Entries come out depth-first with every directory immediately before its
//! descendants and siblings in ordinal (byte-wise) name order. Symlinks are
//! reported but never followed. Entries that cannot be read are reported as
//! [`WalkWarning`]s and the walk carries on with their siblings.

use super::metadata::{EntryMetadata, EntryType};
use crate::utils::paths;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Entry names skipped together with their subtrees (exact match)
    pub exclude_names: Vec<OsString>,

    /// Full paths skipped together with their subtrees
    pub exclude_paths: Vec<PathBuf>,
}

/// An entry discovered during walking
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Full path, always joined onto the walk root
    pub path: PathBuf,

    /// Path relative to the walk root
    pub relative_path: PathBuf,

    /// Final path component
    pub name: OsString,

    /// Nesting level (0 = direct child of the root)
    pub depth: usize,

    pub metadata: EntryMetadata,
}

impl TreeEntry {
    fn from_entry(entry: &DirEntry, root: &Path) -> Result<Self, WalkWarning> {
        let path = entry.path().to_path_buf();
        paths::check_len(&path).map_err(|e| WalkWarning::new(Some(path.clone()), e.to_string()))?;

        // walkdir stats the joined path (lstat, since links are not followed)
        let metadata = entry
            .metadata()
            .map_err(|e| WalkWarning::new(Some(path.clone()), e.to_string()))?;

        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Self {
            relative_path,
            name: entry.file_name().to_os_string(),
            depth: entry.depth().saturating_sub(1),
            metadata: EntryMetadata::from_std(&metadata),
            path,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.entry_type == EntryType::Directory
    }
}

/// A non-fatal problem met while walking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkWarning {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl WalkWarning {
    fn new(path: Option<PathBuf>, message: String) -> Self {
        Self { path, message }
    }
}

impl From<walkdir::Error> for WalkWarning {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf);
        let message = match err.io_error() {
            Some(io) => io.to_string(),
            None => err.to_string(),
        };
        Self::new(path, message)
    }
}

impl std::fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Sorted depth-first iterator over everything below a root.
///
/// The root itself is never yielded.
pub struct TreeWalk {
    root: PathBuf,
    inner: walkdir::IntoIter,
    options: WalkOptions,
}

impl TreeWalk {
    pub fn new(root: &Path, options: WalkOptions) -> Self {
        let inner = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Self {
            root: root.to_path_buf(),
            inner,
            options,
        }
    }

    /// Do not descend into the directory most recently yielded.
    pub fn skip_current_dir(&mut self) {
        self.inner.skip_current_dir();
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        self.options
            .exclude_names
            .iter()
            .any(|name| name.as_os_str() == entry.file_name())
            || self.options.exclude_paths.iter().any(|p| p == entry.path())
    }
}

impl Iterator for TreeWalk {
    type Item = Result<TreeEntry, WalkWarning>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };

            if self.is_excluded(&entry) {
                if entry.file_type().is_dir() {
                    self.inner.skip_current_dir();
                }
                continue;
            }

            let item = TreeEntry::from_entry(&entry, &self.root);
            if item.is_err() && entry.file_type().is_dir() {
                self.inner.skip_current_dir();
            }
            return Some(item);
        }
    }
}

/// Walk a directory tree and collect every readable entry plus warnings
pub fn walk_tree(root: &Path, options: WalkOptions) -> (Vec<TreeEntry>, Vec<WalkWarning>) {
    let mut entries = Vec::new();
    let mut warnings = Vec::new();

    for item in TreeWalk::new(root, options) {
        match item {
            Ok(entry) => entries.push(entry),
            Err(warning) => warnings.push(warning),
        }
    }

    (entries, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn relative_paths(entries: &[TreeEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let (entries, warnings) = walk_tree(temp_dir.path(), WalkOptions::default());
        assert!(entries.is_empty());
        assert!(warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_is_sorted_depth_first() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("b/inner"))?;
        fs::write(root.join("b/inner/deep.txt"), b"deep")?;
        fs::write(root.join("b/a.txt"), b"a")?;
        fs::write(root.join("a.txt"), b"a")?;
        fs::write(root.join("C.txt"), b"upper")?;
        fs::write(root.join("c.txt"), b"lower")?;

        let (entries, warnings) = walk_tree(root, WalkOptions::default());
        assert!(warnings.is_empty());
        assert_eq!(
            relative_paths(&entries),
            vec!["C.txt", "a.txt", "b", "b/a.txt", "b/inner", "b/inner/deep.txt", "c.txt"]
        );

        Ok(())
    }

    #[test]
    fn test_depth_counts_from_root_children() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("x/y"))?;

        let (entries, _) = walk_tree(temp_dir.path(), WalkOptions::default());
        let depths: Vec<usize> = entries.iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![0, 1]);
        assert_eq!(entries[1].name, OsString::from("y"));

        Ok(())
    }

    #[test]
    fn test_symlinked_directory_is_not_traversed() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("real"))?;
        fs::write(root.join("real/file.txt"), b"content")?;
        std::os::unix::fs::symlink(root.join("real"), root.join("loop"))?;

        let (entries, _) = walk_tree(root, WalkOptions::default());
        assert_eq!(relative_paths(&entries), vec!["loop", "real", "real/file.txt"]);
        assert_eq!(entries[0].metadata.entry_type, EntryType::Symlink);

        Ok(())
    }

    #[test]
    fn test_exclude_names_skip_subtree() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join(".git"))?;
        fs::write(root.join(".git/HEAD"), b"ref")?;
        fs::write(root.join("file.txt"), b"keep")?;

        let options = WalkOptions {
            exclude_names: vec![OsString::from(".git")],
            ..Default::default()
        };
        let (entries, _) = walk_tree(root, options);
        assert_eq!(relative_paths(&entries), vec!["file.txt"]);

        Ok(())
    }

    #[test]
    fn test_exclude_paths_skip_subtree() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("backups"))?;
        fs::write(root.join("backups/manifest.new"), b"x")?;
        fs::write(root.join("data.txt"), b"keep")?;

        let options = WalkOptions {
            exclude_paths: vec![root.join("backups")],
            ..Default::default()
        };
        let (entries, _) = walk_tree(root, options);
        assert_eq!(relative_paths(&entries), vec!["data.txt"]);

        Ok(())
    }
}
