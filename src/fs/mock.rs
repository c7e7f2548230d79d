// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    modified: SystemTime,
}

/// In-memory filesystem.
///
/// Only files are stored; a directory exists whenever some file lives below
/// it. Modification times are explicit so tests can model "content changed
/// but mtime did not" without sleeping.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, MockFile>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or overwrite a file with an mtime of `secs` seconds after the epoch.
    pub fn add_file_at(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>, secs: u64) {
        self.lock().insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                modified: UNIX_EPOCH + Duration::from_secs(secs),
            },
        );
    }

    /// Add or overwrite a file, stamping it with the current time.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.lock().insert(
            path.as_ref().to_path_buf(),
            MockFile {
                content: content.into(),
                modified: SystemTime::now(),
            },
        );
    }

    /// Replace the content of an existing file while keeping its mtime.
    pub fn overwrite_keep_mtime(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        if let Some(file) = self.lock().get_mut(path.as_ref()) {
            file.content = content.into();
        }
    }

    pub fn set_modified(&self, path: impl AsRef<Path>, secs: u64) {
        if let Some(file) = self.lock().get_mut(path.as_ref()) {
            file.modified = UNIX_EPOCH + Duration::from_secs(secs);
        }
    }

    /// Remove a file, or every file below a directory.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.lock().retain(|p, _| !p.starts_with(path));
    }

    fn not_found(path: &Path) -> anyhow::Error {
        anyhow::Error::from(io::Error::new(io::ErrorKind::NotFound, "no such file"))
            .context(format!("mock path {:?}", path))
    }
}

impl FileSystem for MockFileSystem {
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let files = self.lock();
        let file = files.get(path).ok_or_else(|| Self::not_found(path))?;
        Ok(Box::new(Cursor::new(file.content.clone())))
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.lock().keys().any(|p| p != path && p.starts_with(path))
    }

    fn is_symlink(&self, _path: &Path) -> bool {
        false
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let files = self.lock();
        files
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| Self::not_found(path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.lock();
        let mut children: Vec<PathBuf> = Vec::new();
        for file in files.keys() {
            let Ok(rest) = file.strip_prefix(path) else {
                continue;
            };
            if let Some(first) = rest.components().next() {
                let child = path.join(first);
                if !children.contains(&child) {
                    children.push(child);
                }
            }
        }
        if children.is_empty() {
            return Err(Self::not_found(path)).context("reading mock dir");
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::is_not_found;

    #[test]
    fn directories_are_derived_from_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/site/a.txt", "a");
        fs.add_file("/site/b/c.js", "c");

        assert!(fs.is_dir(Path::new("/site")));
        assert!(fs.is_dir(Path::new("/site/b")));
        assert!(fs.is_file(Path::new("/site/b/c.js")));
        assert!(!fs.is_dir(Path::new("/site/a.txt")));

        let mut entries = fs.read_dir(Path::new("/site")).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![PathBuf::from("/site/a.txt"), PathBuf::from("/site/b")]
        );
    }

    #[test]
    fn missing_paths_report_not_found() {
        let fs = MockFileSystem::new();
        let err = fs.modified(Path::new("/nope")).unwrap_err();
        assert!(is_not_found(&err));
        let err = fs.read_dir(Path::new("/nope")).unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn remove_drops_a_whole_subtree() {
        let fs = MockFileSystem::new();
        fs.add_file("/site/a/b.txt", "b");
        fs.add_file("/site/a/c.txt", "c");
        fs.add_file("/site/d.txt", "d");
        fs.remove("/site/a");
        assert!(!fs.exists(Path::new("/site/a")));
        assert!(fs.is_file(Path::new("/site/d.txt")));
    }
}
