// src/scan/walk.rs

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::errors::is_not_found;
use crate::fs::FileSystem;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::IgnoreSet;

/// Collect the relative paths of all regular files below `dir`.
///
/// Ignored directories are not descended into and ignored files are left
/// out. Symlinked directories below `dir` are not followed, so link cycles
/// cannot loop the walk. A directory that disappears mid-walk is skipped;
/// `dir` itself not existing yields an empty list.
pub fn collect_files(
    fs: &dyn FileSystem,
    root: &Path,
    dir: &Path,
    ignore: &IgnoreSet,
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    if !fs.is_dir(dir) {
        return Ok(files);
    }

    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match fs.read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if is_not_found(&err) => continue,
            Err(err) => return Err(err),
        };
        for path in entries {
            let Some(rel) = relative_str(root, &path) else {
                continue;
            };
            if ignore.is_ignored(&rel) {
                continue;
            }
            if fs.is_dir(&path) {
                if fs.is_symlink(&path) {
                    debug!(path = %rel, "not following symlinked directory");
                    continue;
                }
                stack.push(path);
            } else if fs.is_file(&path) {
                files.push(rel);
            }
        }
    }

    files.sort();
    Ok(files)
}
