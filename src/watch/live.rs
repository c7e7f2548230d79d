// src/watch/live.rs

//! Live reconciliation loop.
//!
//! Consumes [`FsEvent`]s from a notifier subscription and feeds them through
//! the same [`Pipeline`] as the scan pass:
//!
//! - `add` of a path with a pending unlink is an in-place rewrite: `Update`.
//! - `add` matching a pending unlink by content completes a rename:
//!   `Delete(old)` then `Create(new)` (`Update` if `new` is already cached).
//! - `add` of an unknown path is held in the [`RenameCoalescer`] so an
//!   unlink arriving just after it can still pair up; it is released as
//!   `Create` once the window passes. An `add` of a cached path is `Update`,
//!   or nothing when the content is unchanged.
//! - `change` never pairs: it is `Update` (or `Create`) right away, or just
//!   refreshes a held add.
//! - `unlink` of a cached path (or of a directory holding cached paths)
//!   pairs with a held add of the same content, or is parked until the
//!   window passes and then released as `Delete`. Unlinks of paths the cache
//!   never saw are ignored.
//!
//! Events are handled one at a time, so a file's processing never overlaps
//! with a later event for the same file. Failures are logged and the loop
//! keeps running. The cache is flushed after every event.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::cache::CacheEntry;
use crate::engine::pipeline::Pipeline;
use crate::errors::{is_not_found, Result};
use crate::fs::millis_since_epoch;
use crate::scan::collect_files;
use crate::types::ChangeType;
use crate::watch::coalesce::{Clock, Released, RenameCoalescer};
use crate::watch::hash::compute_file_hash;
use crate::watch::notifier::{FsEvent, FsEventKind};
use crate::watch::path_utils::relative_str;

pub struct LiveLoop {
    pipeline: Arc<Pipeline>,
    /// The box root plus its canonical form, if different.
    roots: Vec<PathBuf>,
    clock: Arc<dyn Clock>,
    coalescer: RenameCoalescer,
}

impl LiveLoop {
    pub fn new(
        pipeline: Arc<Pipeline>,
        roots: Vec<PathBuf>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            pipeline,
            roots,
            clock,
            coalescer: RenameCoalescer::new(window),
        }
    }

    /// Run until `stop` fires or the event stream closes.
    ///
    /// An event already being processed when `stop` fires is finished first.
    /// Unlinks still waiting for a rename partner are dropped; their cache
    /// entries stay, so the next scan pass reports them as deletes. Held adds
    /// are dropped the same way and come back as creates.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            let wait = self
                .coalescer
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(self.clock.now()));

            tokio::select! {
                biased;
                _ = &mut stop => break,
                received = events.recv() => match received {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                    self.release_expired().await;
                }
            }
            self.persist();
        }
        self.persist();

        let abandoned = self.coalescer.drain();
        if !abandoned.is_empty() {
            debug!(?abandoned, "dropping unpaired events at shutdown");
        }
        info!("live loop finished");
    }

    async fn handle(&mut self, event: FsEvent) {
        self.release_expired().await;

        let Some(rel) = self.relative(&event.path) else {
            warn!(path = ?event.path, "could not relativize event path");
            return;
        };
        if rel.is_empty() || self.pipeline.ignore().is_ignored(&rel) {
            return;
        }
        debug!(kind = ?event.kind, path = %rel, "fs event");

        let res = match event.kind {
            FsEventKind::Unlink => self.on_unlink(&rel).await,
            FsEventKind::Add | FsEventKind::Change => self.on_add(&rel, event.kind).await,
        };
        if let Err(err) = res {
            error!(path = %rel, error = %err, "live processing failed");
        }
    }

    fn relative(&self, path: &Path) -> Option<String> {
        self.roots.iter().find_map(|root| relative_str(root, path))
    }

    fn persist(&self) {
        if let Err(err) = self.pipeline.cache().flush() {
            error!(error = %err, "failed to persist cache");
        }
    }

    async fn release_expired(&mut self) {
        for released in self.coalescer.expire(self.clock.now()) {
            if let Err(err) = self.release(released).await {
                error!(error = %err, "releasing held event failed");
            }
        }
    }

    async fn release(&self, released: Released) -> Result<()> {
        match released {
            Released::Delete(rel) => self.delete(&rel).await,
            Released::Create(rel, stamp) => self.write(&rel, stamp).await,
        }
    }

    async fn delete(&self, rel: &str) -> Result<()> {
        if self.pipeline.cache().get(rel)?.is_none() {
            return Ok(());
        }
        self.pipeline
            .run(rel, ChangeType::Delete, CacheEntry::default())
            .await
    }

    /// `Create` or `Update`, depending on what the cache holds now.
    async fn write(&self, rel: &str, stamp: CacheEntry) -> Result<()> {
        let change = match self.pipeline.cache().get(rel)? {
            None => ChangeType::Create,
            Some(_) => ChangeType::Update,
        };
        self.pipeline.run(rel, change, stamp).await
    }

    async fn on_unlink(&mut self, rel: &str) -> Result<()> {
        let discarded = self.coalescer.discard_adds(rel);
        if !discarded.is_empty() {
            debug!(?discarded, "added and removed inside the window");
        }

        let cache = self.pipeline.cache();
        let mut targets: Vec<(String, CacheEntry)> = Vec::new();
        if let Some(entry) = cache.get(rel)? {
            targets.push((rel.to_string(), entry));
        } else {
            for child in cache.paths_under(rel)? {
                if self.pipeline.ignore().is_ignored(&child) {
                    continue;
                }
                if let Some(entry) = cache.get(&child)? {
                    targets.push((child, entry));
                }
            }
        }

        if targets.is_empty() {
            debug!(path = %rel, "unlink of uncached path ignored");
            return Ok(());
        }

        for (path, entry) in targets {
            let now = self.clock.now();
            if let Some((to, stamp)) = self.coalescer.pair_add(&entry.hash, now) {
                debug!(from = %path, to = %to, "rename detected");
                self.delete(&path).await?;
                self.write(&to, stamp).await?;
                continue;
            }
            for evicted in self.coalescer.push_unlink(path, entry.hash, now) {
                self.release(evicted).await?;
            }
        }
        Ok(())
    }

    /// `add` of a directory walks it; `change` of a directory is noise.
    /// Symlinked directories are never entered.
    async fn on_add(&mut self, rel: &str, kind: FsEventKind) -> Result<()> {
        let abs = self.pipeline.base().join(rel);
        let fs = Arc::clone(self.pipeline.fs());

        if fs.is_dir(&abs) {
            if kind != FsEventKind::Add || fs.is_symlink(&abs) {
                return Ok(());
            }
            let root = self.pipeline.base().to_path_buf();
            let ignore = self.pipeline.ignore().clone();
            let files =
                tokio::task::spawn_blocking(move || collect_files(fs.as_ref(), &root, &abs, &ignore))
                    .await??;
            for file in files {
                self.add_file(&file).await?;
            }
            return Ok(());
        }

        match kind {
            FsEventKind::Change => self.change_file(rel).await,
            _ => self.add_file(rel).await,
        }
    }

    async fn add_file(&mut self, rel: &str) -> Result<()> {
        let Some(stamp) = self.stamp(rel).await? else {
            debug!(path = %rel, "file vanished before hashing");
            return Ok(());
        };

        if self.coalescer.cancel(rel) {
            debug!(path = %rel, "path came back inside the window");
            return self.pipeline.run(rel, ChangeType::Update, stamp).await;
        }
        if self.coalescer.refresh_add(rel, stamp.clone()) {
            return Ok(());
        }

        let now = self.clock.now();
        if let Some(from) = self.coalescer.pair(&stamp.hash, now) {
            debug!(from = %from, to = %rel, "rename detected");
            self.delete(&from).await?;
            return self.write(rel, stamp).await;
        }

        match self.pipeline.cache().get(rel)? {
            None => {
                for evicted in self.coalescer.push_add(rel.to_string(), stamp, now) {
                    self.release(evicted).await?;
                }
                Ok(())
            }
            Some(entry) if entry.hash == stamp.hash => {
                debug!(path = %rel, "add of an unchanged cached file");
                Ok(())
            }
            Some(_) => self.pipeline.run(rel, ChangeType::Update, stamp).await,
        }
    }

    async fn change_file(&mut self, rel: &str) -> Result<()> {
        let Some(stamp) = self.stamp(rel).await? else {
            debug!(path = %rel, "file vanished before hashing");
            return Ok(());
        };

        if self.coalescer.refresh_add(rel, stamp.clone()) {
            return Ok(());
        }
        self.coalescer.cancel(rel);
        self.write(rel, stamp).await
    }

    /// Current mtime and hash, or `None` if the file is gone.
    async fn stamp(&self, rel: &str) -> Result<Option<CacheEntry>> {
        let fs = Arc::clone(self.pipeline.fs());
        let abs = self.pipeline.base().join(rel);
        tokio::task::spawn_blocking(move || -> Result<Option<CacheEntry>> {
            let modified = match fs.modified(&abs) {
                Ok(t) => millis_since_epoch(t),
                Err(err) if is_not_found(&err) => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            match compute_file_hash(fs.as_ref(), &abs) {
                Ok(hash) => Ok(Some(CacheEntry::new(modified, hash))),
                Err(err) if is_not_found(&err) => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
        .await?
    }
}
