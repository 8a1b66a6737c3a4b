//! Bounded path joining.
//!
//! Paths are built dynamically, but anything longer than [`MAX_PATH_LEN`]
//! bytes is rejected with [`SnapshotError::PathTooLong`] instead of being
//! handed to the OS (or silently cut short).

use super::errors::{Result, SnapshotError};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Longest path, in bytes, the engine will create or stat (Linux `PATH_MAX`).
pub const MAX_PATH_LEN: usize = 4096;

/// Reject `path` if it exceeds [`MAX_PATH_LEN`].
pub fn check_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().as_bytes().len();
    if len > MAX_PATH_LEN {
        return Err(SnapshotError::PathTooLong {
            path: path.to_path_buf(),
            len,
            limit: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Join `tail` onto `base`, failing loudly when the result is too long.
pub fn join_checked(base: &Path, tail: impl AsRef<Path>) -> Result<PathBuf> {
    let joined = base.join(tail);
    check_len(&joined)?;
    Ok(joined)
}

/// Trees that push against [`MAX_PATH_LEN`], shared by the test modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::MAX_PATH_LEN;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    /// Create `deep.txt` at the bottom of a chain of 200-byte directory names,
    /// with a full path between `MAX_PATH_LEN - 260` and `MAX_PATH_LEN - 50`
    /// bytes. It is readable where it is, but any copy placed under a longer
    /// root no longer fits.
    pub fn deep_file(root: &Path) -> io::Result<PathBuf> {
        let mut dir = root.to_path_buf();
        while dir.as_os_str().len() + 201 < MAX_PATH_LEN - 60 {
            dir.push("n".repeat(200));
        }
        fs::create_dir_all(&dir)?;
        let file = dir.join("deep.txt");
        fs::write(&file, b"deep")?;
        Ok(file)
    }

    /// Leave a file under `root` whose full path exceeds `MAX_PATH_LEN`, next
    /// to a short-named sibling `ok.txt` that stays within the limit.
    ///
    /// The tree is built under a short name and then renamed to a longer
    /// one, since the OS refuses to create the long path directly. Returns
    /// the directory holding both files.
    pub fn overlong_entry(root: &Path) -> io::Result<PathBuf> {
        let short = root.join("s");
        let mut dir = short.clone();
        while dir.as_os_str().len() + 201 < MAX_PATH_LEN - 250 {
            dir.push("n".repeat(200));
        }
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("f".repeat(240)), b"far")?;
        fs::write(dir.join("ok.txt"), b"near")?;

        // Grow the top-level name so the holding directory ends up 3890
        // bytes long: the long file goes past the limit, ok.txt does not.
        let growth = 3890 - dir.as_os_str().len();
        let long = root.join("l".repeat(growth + 1));
        fs::rename(&short, &long)?;

        let rest = dir.strip_prefix(&short).map_err(io::Error::other)?;
        Ok(long.join(rest))
    }
}
