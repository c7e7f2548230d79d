// src/engine/pipeline.rs

//! Per-file processing shared by the scan pass and the live watcher.
//!
//! For one file the order is fixed: `process_before` observers, every
//! matching processor, cache update, `process_after` observers. The cache is
//! only touched once all processors for the file have succeeded.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::cache::{CacheEntry, ChangeCache};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::process::{dispatch, EventBus, ProcessorRegistry, SourceFile};
use crate::types::ChangeType;
use crate::watch::patterns::IgnoreSet;

#[derive(Debug)]
pub struct Pipeline {
    base: PathBuf,
    fs: Arc<dyn FileSystem>,
    ignore: IgnoreSet,
    cache: ChangeCache,
    registry: RwLock<ProcessorRegistry>,
    bus: RwLock<EventBus>,
}

impl Pipeline {
    pub fn new(
        base: PathBuf,
        fs: Arc<dyn FileSystem>,
        ignore: IgnoreSet,
        cache: ChangeCache,
    ) -> Self {
        Self {
            base,
            fs,
            ignore,
            cache,
            registry: RwLock::new(ProcessorRegistry::new()),
            bus: RwLock::new(EventBus::new()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    pub fn cache(&self) -> &ChangeCache {
        &self.cache
    }

    pub fn with_registry<T>(&self, f: impl FnOnce(&mut ProcessorRegistry) -> T) -> T {
        let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn with_bus<T>(&self, f: impl FnOnce(&mut EventBus) -> T) -> T {
        let mut guard = self.bus.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Process one classified file.
    ///
    /// `stamp` is what gets stored for `Create`/`Update`; it is ignored for
    /// `Delete`. `Skip` files never reach this point.
    pub async fn run(&self, rel: &str, change: ChangeType, stamp: CacheEntry) -> Result<()> {
        let mut file = SourceFile::new(&self.base, rel, change);

        let bus = self.bus.read().unwrap_or_else(PoisonError::into_inner).clone();
        bus.before(&file);

        let matched = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .matching(rel);
        debug!(path = %rel, %change, processors = matched.len(), "dispatching");
        dispatch(matched, &mut file).await?;

        match change {
            ChangeType::Create | ChangeType::Update => self.cache.put(rel, stamp)?,
            ChangeType::Delete => self.cache.delete(rel)?,
            ChangeType::Skip => {}
        }

        bus.after(&file);
        Ok(())
    }
}
