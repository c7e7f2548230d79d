// tests/mock_fs.rs

mod common;
use crate::common::{init_tracing, Recorder, TestResult};

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use sourcebox::cache::CacheEntry;
use sourcebox::fs::{FileSystem, MockFileSystem};
use sourcebox::watch::hash_bytes;
use sourcebox::{ChangeType, SourceBox};

fn mock_box(fs: &MockFileSystem) -> SourceBox {
    SourceBox::builder("/site/source")
        .fs(Arc::new(fs.clone()))
        .build()
}

fn at(rel: &str) -> PathBuf {
    PathBuf::from("/site/source").join(rel)
}

#[tokio::test]
async fn unchanged_mtime_skips_regardless_of_content() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file_at(at("a.txt"), "a", 10);

    let sb = mock_box(&fs);
    let rec = Recorder::new();
    sb.add_handler(rec.handler())?;

    sb.process().await?;
    assert_eq!(rec.changes(), vec![(ChangeType::Create, "a.txt".to_string())]);

    rec.clear();
    fs.overwrite_keep_mtime(at("a.txt"), "completely different");
    sb.process().await?;
    assert!(rec.is_empty());
    assert_eq!(sb.cache().get("a.txt")?.map(|e| e.hash), Some(hash_bytes("a")));

    fs.set_modified(at("a.txt"), 11);
    sb.process().await?;
    assert_eq!(rec.changes(), vec![(ChangeType::Update, "a.txt".to_string())]);
    Ok(())
}

#[tokio::test]
async fn mtimes_are_stored_in_milliseconds() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file_at(at("a.txt"), "a", 42);

    let sb = mock_box(&fs);
    sb.process().await?;

    assert_eq!(
        sb.cache().get("a.txt")?,
        Some(CacheEntry::new(42_000, hash_bytes("a")))
    );
    assert_eq!(sb.cache().scope(), "source/");
    Ok(())
}

#[tokio::test]
async fn removed_subtree_yields_one_delete_per_cached_file() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file_at(at("keep.txt"), "k", 1);
    fs.add_file_at(at("posts/a.md"), "a", 1);
    fs.add_file_at(at("posts/b.md"), "b", 1);

    let sb = mock_box(&fs);
    sb.process().await?;

    let rec = Recorder::new();
    sb.add_handler(rec.handler())?;
    fs.remove(at("posts"));
    let summary = sb.process().await?;

    assert_eq!(
        rec.sorted_changes(),
        vec![
            (ChangeType::Delete, "posts/a.md".to_string()),
            (ChangeType::Delete, "posts/b.md".to_string()),
        ]
    );
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(sb.cache().paths()?, vec!["keep.txt".to_string()]);
    Ok(())
}

#[tokio::test]
async fn newly_ignored_file_is_deleted_from_the_cache() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file_at(at("drafts/a.md"), "a", 1);

    let sb = SourceBox::builder("/site/source")
        .fs(Arc::new(fs.clone()))
        .ignore("drafts")
        .build();
    sb.cache().put("drafts/a.md", CacheEntry::new(1_000, hash_bytes("a")))?;

    let rec = Recorder::new();
    sb.add_handler(rec.handler())?;
    sb.process().await?;

    assert_eq!(rec.changes(), vec![(ChangeType::Delete, "drafts/a.md".to_string())]);
    Ok(())
}

#[tokio::test]
async fn bounded_parallelism_still_processes_everything() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    for i in 0..50 {
        fs.add_file_at(at(&format!("many/{i:02}.txt")), format!("{i}"), 1);
    }

    let sb = SourceBox::builder("/site/source")
        .fs(Arc::new(fs.clone()))
        .concurrency(3)
        .build();
    let rec = Recorder::new();
    sb.add_processor("many/:name", rec.handler())?;

    let summary = sb.process().await?;

    assert_eq!(summary.created, 50);
    assert_eq!(rec.len(), 50);
    let mut names: Vec<String> = rec
        .events()
        .into_iter()
        .filter_map(|e| e.params.get("name").cloned())
        .collect();
    names.sort();
    assert_eq!(names.first().map(String::as_str), Some("00.txt"));
    assert_eq!(names.last().map(String::as_str), Some("49.txt"));
    Ok(())
}

/// Lists every file of the inner mock but loses some of them on the way:
/// `gone_at_stat` fail `modified`, `gone_at_read` fail `open_read`.
#[derive(Debug)]
struct VanishingFs {
    inner: MockFileSystem,
    gone_at_stat: Vec<PathBuf>,
    gone_at_read: Vec<PathBuf>,
}

fn vanished(path: &Path) -> anyhow::Error {
    anyhow::Error::from(io::Error::new(io::ErrorKind::NotFound, "vanished"))
        .context(format!("reading {:?}", path))
}

impl FileSystem for VanishingFs {
    fn open_read(&self, path: &Path) -> anyhow::Result<Box<dyn Read + Send>> {
        if self.gone_at_read.iter().any(|p| p == path) {
            return Err(vanished(path));
        }
        self.inner.open_read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.inner.is_symlink(path)
    }

    fn canonicalize(&self, path: &Path) -> anyhow::Result<PathBuf> {
        self.inner.canonicalize(path)
    }

    fn modified(&self, path: &Path) -> anyhow::Result<SystemTime> {
        if self.gone_at_stat.iter().any(|p| p == path) {
            return Err(vanished(path));
        }
        self.inner.modified(path)
    }

    fn read_dir(&self, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }
}

#[tokio::test]
async fn files_vanishing_mid_scan_are_dropped_without_failing() -> TestResult {
    init_tracing();
    let inner = MockFileSystem::new();
    inner.add_file_at(at("stays.txt"), "s", 1);
    inner.add_file_at(at("gone-before-stat.txt"), "a", 1);
    inner.add_file_at(at("gone-before-hash.txt"), "b", 1);

    let fs = VanishingFs {
        inner,
        gone_at_stat: vec![at("gone-before-stat.txt")],
        gone_at_read: vec![at("gone-before-hash.txt")],
    };
    let sb = SourceBox::builder("/site/source").fs(Arc::new(fs)).build();
    let rec = Recorder::new();
    sb.add_handler(rec.handler())?;

    let summary = sb.process().await?;

    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.created, 1);
    assert_eq!(rec.changes(), vec![(ChangeType::Create, "stays.txt".to_string())]);
    assert_eq!(sb.cache().paths()?, vec!["stays.txt".to_string()]);
    Ok(())
}
