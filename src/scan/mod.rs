// src/scan/mod.rs

//! Cold reconciliation pass.
//!
//! Walks the tree, classifies each file against the change cache and pushes
//! every `Create`/`Update`/`Delete` through the [`Pipeline`]. Files are
//! handled with bounded parallelism; the first failure aborts the pass.

pub mod walk;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::cache::CacheEntry;
use crate::engine::pipeline::Pipeline;
use crate::errors::{is_not_found, Result, SourceBoxError};
use crate::fs::millis_since_epoch;
use crate::types::ChangeType;
use crate::watch::hash::compute_file_hash;

pub use walk::collect_files;

/// Result of classifying one file against its cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub change: ChangeType,
    /// Entry to store once the file has been processed.
    pub stamp: CacheEntry,
    /// For a `Skip`: the stored mtime is stale and should be refreshed.
    pub refresh: bool,
}

/// Decide what happened to a file.
///
/// `hash` is only called when the decision depends on content: never for an
/// unchanged mtime.
pub fn classify(
    cached: Option<&CacheEntry>,
    modified: u64,
    hash: impl FnOnce() -> anyhow::Result<String>,
) -> anyhow::Result<Classification> {
    let Some(entry) = cached else {
        return Ok(Classification {
            change: ChangeType::Create,
            stamp: CacheEntry::new(modified, hash()?),
            refresh: false,
        });
    };

    if entry.modified == modified {
        return Ok(Classification {
            change: ChangeType::Skip,
            stamp: entry.clone(),
            refresh: false,
        });
    }

    let current = hash()?;
    let change = if current == entry.hash {
        ChangeType::Skip
    } else {
        ChangeType::Update
    };
    Ok(Classification {
        refresh: change == ChangeType::Skip,
        change,
        stamp: CacheEntry::new(modified, current),
    })
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    /// Files that vanished between listing and hashing.
    pub dropped: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: Option<ChangeType>) {
        match outcome {
            Some(ChangeType::Create) => self.created += 1,
            Some(ChangeType::Update) => self.updated += 1,
            Some(ChangeType::Skip) => self.skipped += 1,
            Some(ChangeType::Delete) => self.deleted += 1,
            None => self.dropped += 1,
        }
    }

    pub fn dispatched(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

enum Job {
    Scan(String),
    Delete(String),
}

/// Classify a file on disk; `None` if it disappeared meanwhile.
pub async fn classify_file(pipeline: &Pipeline, rel: &str) -> Result<Option<Classification>> {
    let fs = Arc::clone(pipeline.fs());
    let cache = pipeline.cache().clone();
    let path = pipeline.base().join(rel);
    let rel = rel.to_string();

    tokio::task::spawn_blocking(move || -> Result<Option<Classification>> {
        let modified = match fs.modified(&path) {
            Ok(t) => millis_since_epoch(t),
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let cached = cache.get(&rel)?;
        match classify(cached.as_ref(), modified, || compute_file_hash(fs.as_ref(), &path)) {
            Ok(c) => Ok(Some(c)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    })
    .await?
}

async fn run_job(pipeline: Arc<Pipeline>, job: Job) -> Result<Option<ChangeType>> {
    match job {
        Job::Delete(rel) => {
            pipeline
                .run(&rel, ChangeType::Delete, CacheEntry::default())
                .await?;
            Ok(Some(ChangeType::Delete))
        }
        Job::Scan(rel) => {
            let Some(class) = classify_file(&pipeline, &rel).await? else {
                debug!(path = %rel, "file vanished during scan; dropped");
                return Ok(None);
            };
            debug!(path = %rel, change = %class.change, "classified");
            match class.change {
                ChangeType::Skip => {
                    if class.refresh {
                        pipeline.cache().put(&rel, class.stamp)?;
                    }
                }
                change => pipeline.run(&rel, change, class.stamp).await?,
            }
            Ok(Some(class.change))
        }
    }
}

/// Run one full reconciliation pass over the pipeline's tree.
pub async fn reconcile(pipeline: Arc<Pipeline>, concurrency: usize) -> Result<ScanSummary> {
    let mut summary = ScanSummary::default();
    let base = pipeline.base().to_path_buf();

    if !pipeline.fs().is_dir(&base) {
        debug!(base = ?base, "source directory does not exist; nothing to process");
        return Ok(summary);
    }

    let files = {
        let fs = Arc::clone(pipeline.fs());
        let ignore = pipeline.ignore().clone();
        tokio::task::spawn_blocking(move || collect_files(fs.as_ref(), &base, &base, &ignore))
            .await??
    };

    let seen: HashSet<&str> = files.iter().map(String::as_str).collect();
    let removed: Vec<String> = pipeline
        .cache()
        .paths()?
        .into_iter()
        .filter(|rel| !seen.contains(rel.as_str()))
        .collect();

    debug!(files = files.len(), removed = removed.len(), "scan listing complete");

    let jobs = files
        .iter()
        .cloned()
        .map(Job::Scan)
        .chain(removed.into_iter().map(Job::Delete));

    let driven = drive(&pipeline, jobs, concurrency, &mut summary).await;
    // Whatever finished is written out even if the pass failed.
    let flushed = pipeline.cache().flush();
    driven?;
    flushed?;

    info!(
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        skipped = summary.skipped,
        dropped = summary.dropped,
        "processed source tree"
    );
    Ok(summary)
}

async fn drive(
    pipeline: &Arc<Pipeline>,
    jobs: impl Iterator<Item = Job>,
    concurrency: usize,
    summary: &mut ScanSummary,
) -> Result<()> {
    let limit = concurrency.max(1);
    let mut tasks: JoinSet<Result<Option<ChangeType>>> = JoinSet::new();

    for job in jobs {
        while tasks.len() >= limit {
            if let Some(joined) = tasks.join_next().await {
                if let Err(err) = settle(joined, summary) {
                    tasks.shutdown().await;
                    return Err(err);
                }
            }
        }
        tasks.spawn(run_job(Arc::clone(pipeline), job));
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = settle(joined, summary) {
            tasks.shutdown().await;
            return Err(err);
        }
    }
    Ok(())
}

fn settle(
    joined: std::result::Result<Result<Option<ChangeType>>, tokio::task::JoinError>,
    summary: &mut ScanSummary,
) -> Result<()> {
    let outcome = joined.map_err(SourceBoxError::Join)??;
    summary.record(outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn never_hash() -> anyhow::Result<String> {
        panic!("content must not be hashed when mtime is unchanged")
    }

    #[test]
    fn unseen_file_is_created() {
        let c = classify(None, 10, || Ok("h".to_string())).unwrap();
        assert_eq!(c.change, ChangeType::Create);
        assert_eq!(c.stamp, CacheEntry::new(10, "h"));
    }

    #[test]
    fn unchanged_mtime_skips_without_hashing() {
        let entry = CacheEntry::new(10, "stale");
        let c = classify(Some(&entry), 10, never_hash).unwrap();
        assert_eq!(c.change, ChangeType::Skip);
        assert!(!c.refresh);
    }

    #[test]
    fn changed_mtime_same_hash_skips_and_refreshes() {
        let entry = CacheEntry::new(0, "h");
        let calls = Cell::new(0);
        let c = classify(Some(&entry), 20, || {
            calls.set(calls.get() + 1);
            Ok("h".to_string())
        })
        .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(c.change, ChangeType::Skip);
        assert!(c.refresh);
        assert_eq!(c.stamp, CacheEntry::new(20, "h"));
    }

    #[test]
    fn changed_mtime_and_hash_updates() {
        let entry = CacheEntry::new(0, "old");
        let c = classify(Some(&entry), 20, || Ok("new".to_string())).unwrap();
        assert_eq!(c.change, ChangeType::Update);
        assert_eq!(c.stamp, CacheEntry::new(20, "new"));
    }
}
