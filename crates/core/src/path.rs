//! Watch target normalization

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Resolve a watch target to an absolute, normalized path
///
/// - Relative paths are resolved against the current directory
/// - Symlinks and `.`/`..` components are resolved
/// - Windows verbatim prefixes (`\\?\`) are removed
/// - The target must exist and, for directories, be listable
pub fn normalize_target(path: &Path) -> Result<PathBuf> {
    let canonical = std::fs::canonicalize(path).map_err(|e| Error::path_unavailable(path, e))?;

    let metadata = std::fs::metadata(&canonical).map_err(|e| Error::path_unavailable(path, e))?;
    if metadata.is_dir() {
        // Listing fails early on permission problems the OS watch would hit later
        std::fs::read_dir(&canonical).map_err(|e| Error::path_unavailable(path, e))?;
    }

    Ok(strip_verbatim_prefix(&canonical))
}

/// Remove the Windows long-path prefix from a path
///
/// `\\?\C:\dir` becomes `C:\dir` and `\\?\UNC\server\share` becomes
/// `\\server\share`. Any other path is returned unchanged.
pub fn strip_verbatim_prefix(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();

    if let Some(rest) = text.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{}", rest));
    }
    if let Some(rest) = text.strip_prefix(r"\\?\") {
        return PathBuf::from(rest);
    }

    path.to_path_buf()
}
