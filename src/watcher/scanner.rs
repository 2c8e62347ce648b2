//! One-shot listing of the subdirectories already present in a directory.
//!
//! These never produce a creation event, so the tree watcher attaches
//! nodes to them right after its own registration succeeds.

use std::path::{Path, PathBuf};

use super::WatchError;

/// Immediate subdirectories of `dir`, sorted by path.
///
/// Symlinks are not followed, so a link pointing back up the tree cannot
/// make the watcher recurse forever.
pub fn scan_children(dir: &Path) -> Result<Vec<PathBuf>, WatchError> {
    let failed = |e: std::io::Error| WatchError::ScanFailed {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut children = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(failed)? {
        let entry = entry.map_err(failed)?;
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => children.push(entry.path()),
            Ok(_) => {}
            // Entry vanished between listing and stat.
            Err(e) => crate::debug_event!("scanner", "skipped", "{}: {e}", entry.path().display()),
        }
    }
    children.sort();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(scan_children(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_only_direct_subdirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("a/nested")).unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        let children = scan_children(dir.path()).unwrap();
        assert_eq!(children, vec![dir.path().join("a"), dir.path().join("b")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinked_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let children = scan_children(dir.path()).unwrap();
        assert_eq!(children, vec![dir.path().join("real")]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let err = scan_children(&missing).unwrap_err();
        assert!(matches!(err, WatchError::ScanFailed { path, .. } if path == missing));
    }
}
