// src/watch/path_utils.rs

//! Utility functions for path handling.

use std::path::{Path, MAIN_SEPARATOR};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. symlinks or different absolute prefixes, notably
///   `/private/var` on macOS), we canonicalize both paths and try again.
///   This only works while `path` still exists.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_posix(rel));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(to_posix(rel));
        }
    }

    None
}

fn to_posix(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

/// Render a root directory as a string that always ends with the platform
/// separator.
pub fn with_trailing_separator(root: &Path) -> String {
    let mut s = root.to_string_lossy().into_owned();
    if !s.ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = PathBuf::from("/site/source");
        let path = root.join("posts").join("a.md");
        assert_eq!(relative_str(&root, &path).as_deref(), Some("posts/a.md"));
        assert_eq!(relative_str(&root, Path::new("/elsewhere/a.md")), None);
    }

    #[test]
    fn trailing_separator_is_added_once() {
        let once = with_trailing_separator(Path::new("/site/source"));
        assert!(once.ends_with(MAIN_SEPARATOR));
        assert_eq!(with_trailing_separator(Path::new(&once)), once);
    }
}
