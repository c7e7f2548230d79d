// tests/common/mod.rs

#![allow(dead_code)]

pub use sourcebox_test_utils::builders::{set_mtime, write_file};
pub use sourcebox_test_utils::{init_tracing, wait_until, with_timeout, Recorder};

use std::path::{Path, PathBuf};

use sourcebox::fs::millis_since_epoch;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A temp dir with a `test/` source root inside it, so cache ids are
/// scoped as `test/<path>`.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("test");
        std::fs::create_dir_all(&root).expect("create root");
        Self { dir, root }
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        write_file(&self.root, rel, content)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

/// Current mtime of a real file, in cache units.
pub fn mtime_ms(path: &Path) -> u64 {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .expect("file mtime");
    millis_since_epoch(modified)
}
