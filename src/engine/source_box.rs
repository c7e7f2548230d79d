// src/engine/source_box.rs

//! The public tree instance.
//!
//! A [`SourceBox`] owns one source directory: its ignore rules, its slice of
//! the change cache, its processors and observers. `process()` runs a cold
//! reconciliation pass; `watch()` runs one pass and then follows live
//! filesystem events until `unwatch()`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{shared, ChangeCache, MemoryCacheStore, SharedStore};
use crate::engine::pipeline::Pipeline;
use crate::engine::state::{Lifecycle, WatchState};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::process::{Handler, PatternSpec, ProcessObserver, Registration, SourceFile};
use crate::scan::{self, ScanSummary};
use crate::watch::coalesce::{Clock, SystemClock, DEFAULT_RENAME_WINDOW};
use crate::watch::live::LiveLoop;
use crate::watch::notifier::{Notifier, NotifyNotifier, Subscription};
use crate::watch::path_utils::with_trailing_separator;
use crate::watch::patterns::{IgnoreSet, IgnoreSpec};

/// Default bound on files processed in parallel by `process()`.
pub const DEFAULT_CONCURRENCY: usize = 8;

struct LiveHandle {
    subscription: Subscription,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct LiveState {
    lifecycle: Lifecycle,
    handle: Option<LiveHandle>,
}

pub struct SourceBox {
    base: String,
    pipeline: Arc<Pipeline>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    rename_window: Duration,
    concurrency: usize,
    live: Mutex<LiveState>,
}

impl std::fmt::Debug for SourceBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBox")
            .field("base", &self.base)
            .field("scope", &self.pipeline.cache().scope())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Configures a [`SourceBox`]. Everything except the root has a default.
pub struct SourceBoxBuilder {
    root: PathBuf,
    ignore: IgnoreSpec,
    store: Option<SharedStore>,
    scope: Option<String>,
    fs: Option<Arc<dyn FileSystem>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
    rename_window: Duration,
    concurrency: usize,
}

impl SourceBoxBuilder {
    pub fn ignore(mut self, ignore: impl Into<IgnoreSpec>) -> Self {
        self.ignore = ignore.into();
        self
    }

    /// Cache store, possibly shared with other boxes.
    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Prefix for this box's cache ids. Defaults to `<root dir name>/`.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn rename_window(mut self, window: Duration) -> Self {
        self.rename_window = window;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn build(self) -> SourceBox {
        let scope = self.scope.unwrap_or_else(|| default_scope(&self.root));
        let store = self
            .store
            .unwrap_or_else(|| shared(MemoryCacheStore::new()));
        let fs = self.fs.unwrap_or_else(|| Arc::new(RealFileSystem));
        let ignore = IgnoreSet::new(&self.ignore);

        debug!(root = ?self.root, %scope, ignore = ?ignore.patterns(), "creating source box");

        let pipeline = Pipeline::new(self.root.clone(), fs, ignore, ChangeCache::new(store, scope));

        SourceBox {
            base: with_trailing_separator(&self.root),
            pipeline: Arc::new(pipeline),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NotifyNotifier)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            rename_window: self.rename_window,
            concurrency: self.concurrency,
            live: Mutex::new(LiveState::default()),
        }
    }
}

fn default_scope(root: &Path) -> String {
    root.file_name()
        .map(|name| format!("{}/", name.to_string_lossy()))
        .unwrap_or_default()
}

/// Puts the lifecycle back to `Stopped` if `watch()` bails out (or is
/// dropped) before the subscription is live.
struct StartGuard<'a> {
    live: &'a Mutex<LiveState>,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.live
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .lifecycle
                .abort_start();
        }
    }
}

impl SourceBox {
    /// Box over `root` with a memory cache, the real filesystem and the
    /// `notify` backend.
    pub fn new(root: impl Into<PathBuf>, ignore: impl Into<IgnoreSpec>) -> Self {
        Self::builder(root).ignore(ignore).build()
    }

    pub fn builder(root: impl Into<PathBuf>) -> SourceBoxBuilder {
        SourceBoxBuilder {
            root: root.into(),
            ignore: IgnoreSpec::None,
            store: None,
            scope: None,
            fs: None,
            notifier: None,
            clock: None,
            rename_window: DEFAULT_RENAME_WINDOW,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Root directory, always ending with the path separator.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn root(&self) -> &Path {
        self.pipeline.base()
    }

    pub fn ignore(&self) -> &[String] {
        self.pipeline.ignore().patterns()
    }

    pub fn cache(&self) -> &ChangeCache {
        self.pipeline.cache()
    }

    /// Register `handler` for paths matching `pattern`.
    pub fn add_processor(
        &self,
        pattern: impl Into<PatternSpec>,
        handler: impl Handler,
    ) -> Result<()> {
        self.register(Registration::WithPattern(pattern.into(), Arc::new(handler)))
    }

    /// Register `handler` for every path.
    pub fn add_handler(&self, handler: impl Handler) -> Result<()> {
        self.register(Registration::HandlerOnly(Arc::new(handler)))
    }

    pub fn register(&self, registration: Registration) -> Result<()> {
        self.pipeline.with_registry(|r| r.register(registration))
    }

    pub fn on_process_before(&self, hook: impl Fn(&SourceFile) + Send + Sync + 'static) {
        self.pipeline.with_bus(|bus| bus.on_before(hook));
    }

    pub fn on_process_after(&self, hook: impl Fn(&SourceFile) + Send + Sync + 'static) {
        self.pipeline.with_bus(|bus| bus.on_after(hook));
    }

    pub fn add_observer(&self, observer: Arc<dyn ProcessObserver>) {
        self.pipeline.with_bus(|bus| bus.subscribe(observer));
    }

    /// One full reconciliation pass.
    pub async fn process(&self) -> Result<ScanSummary> {
        scan::reconcile(Arc::clone(&self.pipeline), self.concurrency).await
    }

    /// Reconcile, then follow live events until [`SourceBox::unwatch`].
    ///
    /// Resolves once the subscription is active. Fails with
    /// `AlreadyWatching` unless the box is stopped.
    pub async fn watch(&self) -> Result<()> {
        self.lock_live().lifecycle.begin_start()?;
        let mut guard = StartGuard {
            live: &self.live,
            armed: true,
        };

        self.process().await?;

        let root = self.pipeline.base().to_path_buf();
        let mut roots = vec![root.clone()];
        let subscribe_root = match self.pipeline.fs().canonicalize(&root) {
            Ok(canon) => {
                if canon != root {
                    roots.push(canon.clone());
                }
                canon
            }
            Err(_) => root,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.notifier.subscribe(&subscribe_root, tx)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let live_loop = LiveLoop::new(
            Arc::clone(&self.pipeline),
            roots,
            Arc::clone(&self.clock),
            self.rename_window,
        );
        let task = tokio::spawn(live_loop.run(rx, stop_rx));

        let mut live = self.lock_live();
        live.handle = Some(LiveHandle {
            subscription,
            stop: stop_tx,
            task,
        });
        live.lifecycle.confirm_running();
        guard.armed = false;

        info!(root = %self.base, "watching source tree");
        Ok(())
    }

    /// Stop following live events. Idempotent.
    ///
    /// A handler already running finishes in the background.
    pub fn unwatch(&self) {
        let handle = {
            let mut live = self.lock_live();
            if !live.lifecycle.stop() {
                return;
            }
            live.handle.take()
        };

        if let Some(LiveHandle {
            subscription,
            stop,
            task,
        }) = handle
        {
            drop(subscription);
            // The loop may already have exited if its event stream closed.
            let _ = stop.send(());
            drop(task);
        }
        info!(root = %self.base, "stopped watching source tree");
    }

    pub fn is_watching(&self) -> bool {
        self.lock_live().lifecycle.is_running()
    }

    pub fn state(&self) -> WatchState {
        self.lock_live().lifecycle.state()
    }

    fn lock_live(&self) -> MutexGuard<'_, LiveState> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SourceBox {
    fn drop(&mut self) {
        self.unwatch();
    }
}
