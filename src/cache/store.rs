// src/cache/store.rs

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::CacheEntry;

/// Relative path (from the config directory) of the default cache file.
pub const CACHE_FILE_PATH: &str = ".sourcebox/cache";

/// Durable key/value storage for cache entries.
///
/// Ids are tree-qualified (`<scope><relative path>`) so one store can back
/// several source boxes.
pub trait CacheStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<CacheEntry>>;
    fn put(&mut self, id: &str, entry: CacheEntry) -> Result<()>;
    fn delete(&mut self, id: &str) -> Result<()>;
    /// All ids currently stored.
    fn ids(&self) -> Result<Vec<String>>;

    /// Make every mutation so far durable.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A store handle that can be shared between source boxes.
pub type SharedStore = Arc<Mutex<Box<dyn CacheStore>>>;

pub fn shared(store: impl CacheStore + 'static) -> SharedStore {
    let boxed: Box<dyn CacheStore> = Box::new(store);
    Arc::new(Mutex::new(boxed))
}

/// Stores entries in memory only.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    map: BTreeMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.map.get(id).cloned())
    }

    fn put(&mut self, id: &str, entry: CacheEntry) -> Result<()> {
        self.map.insert(id.to_string(), entry);
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        self.map.remove(id);
        Ok(())
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.map.keys().cloned().collect())
    }
}

/// Stores entries in a line-oriented file.
///
/// Each line is `<modified_ms> <hash> <id>`; an empty hash is written as `-`.
/// The file is read once on open. Mutations stay in memory until
/// [`CacheStore::flush`] (or drop), which writes a sibling `.tmp` file and
/// renames it over the cache, so a crash never leaves a truncated file.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    map: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl FileCacheStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = load_entries(&path)?;
        info!(path = ?path, entries = map.len(), "opened cache file");
        Ok(Self {
            path,
            map,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unflushed mutations exist.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.map.get(id).cloned())
    }

    fn put(&mut self, id: &str, entry: CacheEntry) -> Result<()> {
        if self.map.get(id) != Some(&entry) {
            self.map.insert(id.to_string(), entry);
            self.dirty = true;
        }
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        if self.map.remove(id).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.map.keys().cloned().collect())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        save_entries(&self.path, &self.map)?;
        self.dirty = false;
        debug!(path = ?self.path, entries = self.map.len(), "cache file written");
        Ok(())
    }
}

impl Drop for FileCacheStore {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(path = ?self.path, error = %err, "failed to write cache file on drop");
        }
    }
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, CacheEntry>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let file = File::open(path).with_context(|| format!("opening cache file at {:?}", path))?;
    let reader = BufReader::new(file);

    let mut map = BTreeMap::new();

    for (lineno, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        let (Some(modified), Some(hash), Some(id)) = (parts.next(), parts.next(), parts.next())
        else {
            warn!(line = lineno + 1, "skipping malformed cache line");
            continue;
        };
        let Ok(modified) = modified.parse::<u64>() else {
            warn!(line = lineno + 1, "skipping cache line with bad mtime");
            continue;
        };
        let hash = if hash == "-" { String::new() } else { hash.to_string() };
        map.insert(id.to_string(), CacheEntry { modified, hash });
    }

    debug!(entries = map.len(), "loaded cache entries");
    Ok(map)
}

fn save_entries(path: &Path, map: &BTreeMap<String, CacheEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache directory at {:?}", parent))?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)
            .with_context(|| format!("creating temporary cache file at {:?}", tmp_path))?;
        let mut writer = BufWriter::new(file);

        for (id, entry) in map.iter() {
            let hash = if entry.hash.is_empty() { "-" } else { entry.hash.as_str() };
            writeln!(writer, "{} {} {}", entry.modified, hash, id)?;
        }

        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("replacing cache file at {:?}", path))?;
    Ok(())
}
