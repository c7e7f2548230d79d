// src/cache/mod.rs

//! Persistent change-detection cache.
//!
//! [`ChangeCache`] is the per-tree view over a [`store::CacheStore`]: it
//! prefixes every relative path with the tree's scope, so several trees can
//! share one store without their ids colliding.

pub mod store;

use std::sync::{MutexGuard, PoisonError};

use crate::errors::{Result, SourceBoxError};

pub use store::{
    shared, CacheStore, FileCacheStore, MemoryCacheStore, SharedStore, CACHE_FILE_PATH,
};

/// What the cache remembers about one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// Modification time in milliseconds since the Unix epoch.
    pub modified: u64,
    /// Hex content digest; empty if never hashed.
    pub hash: String,
}

impl CacheEntry {
    pub fn new(modified: u64, hash: impl Into<String>) -> Self {
        Self {
            modified,
            hash: hash.into(),
        }
    }
}

#[derive(Clone)]
pub struct ChangeCache {
    store: SharedStore,
    scope: String,
}

impl std::fmt::Debug for ChangeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeCache")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ChangeCache {
    /// `scope` is normalised to end with `/` unless empty.
    pub fn new(store: SharedStore, scope: impl Into<String>) -> Self {
        let mut scope = scope.into().replace('\\', "/");
        if !scope.is_empty() && !scope.ends_with('/') {
            scope.push('/');
        }
        Self { store, scope }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Tree-qualified id for a relative path.
    pub fn id_for(&self, rel: &str) -> String {
        format!("{}{}", self.scope, rel)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn CacheStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, rel: &str) -> Result<Option<CacheEntry>> {
        self.lock()
            .get(&self.id_for(rel))
            .map_err(SourceBoxError::Cache)
    }

    pub fn put(&self, rel: &str, entry: CacheEntry) -> Result<()> {
        self.lock()
            .put(&self.id_for(rel), entry)
            .map_err(SourceBoxError::Cache)
    }

    pub fn delete(&self, rel: &str) -> Result<()> {
        self.lock()
            .delete(&self.id_for(rel))
            .map_err(SourceBoxError::Cache)
    }

    /// Persist pending mutations of the underlying store.
    pub fn flush(&self) -> Result<()> {
        self.lock().flush().map_err(SourceBoxError::Cache)
    }

    /// Relative paths of every entry owned by this tree.
    pub fn paths(&self) -> Result<Vec<String>> {
        let ids = self.lock().ids().map_err(SourceBoxError::Cache)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| id.strip_prefix(self.scope.as_str()).map(str::to_string))
            .filter(|rel| !rel.is_empty())
            .collect())
    }

    /// Relative paths owned by this tree that live below directory `dir`.
    pub fn paths_under(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .paths()?
            .into_iter()
            .filter(|rel| rel.starts_with(&prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_keep_trees_apart() {
        let store = shared(MemoryCacheStore::new());
        let source = ChangeCache::new(store.clone(), "source");
        let theme = ChangeCache::new(store.clone(), "themes/landscape/");

        source.put("a.txt", CacheEntry::new(1, "h1")).unwrap();
        theme.put("a.txt", CacheEntry::new(2, "h2")).unwrap();

        assert_eq!(source.id_for("a.txt"), "source/a.txt");
        assert_eq!(source.get("a.txt").unwrap(), Some(CacheEntry::new(1, "h1")));
        assert_eq!(theme.get("a.txt").unwrap(), Some(CacheEntry::new(2, "h2")));
        assert_eq!(source.paths().unwrap(), vec!["a.txt".to_string()]);

        source.delete("a.txt").unwrap();
        assert_eq!(source.get("a.txt").unwrap(), None);
        assert!(theme.get("a.txt").unwrap().is_some());
    }

    #[test]
    fn paths_under_matches_whole_components() {
        let cache = ChangeCache::new(shared(MemoryCacheStore::new()), "");
        cache.put("a/b.txt", CacheEntry::default()).unwrap();
        cache.put("a/c/d.txt", CacheEntry::default()).unwrap();
        cache.put("ab/e.txt", CacheEntry::default()).unwrap();

        let mut under = cache.paths_under("a").unwrap();
        under.sort();
        assert_eq!(under, vec!["a/b.txt".to_string(), "a/c/d.txt".to_string()]);
    }
}
