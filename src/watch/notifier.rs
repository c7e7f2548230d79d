// src/watch/notifier.rs

//! Low-level filesystem notifications.
//!
//! A [`Notifier`] turns OS events for a directory subtree into a flat stream
//! of [`FsEvent`]s. Dropping the returned [`Subscription`] stops delivery.
//!
//! - [`NotifyNotifier`] is the production backend built on `notify`.
//! - [`ManualNotifier`] lets tests inject events without touching the OS.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Add,
    Change,
    Unlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self { kind: FsEventKind::Add, path: path.into() }
    }

    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self { kind: FsEventKind::Change, path: path.into() }
    }

    pub fn unlink(path: impl Into<PathBuf>) -> Self {
        Self { kind: FsEventKind::Unlink, path: path.into() }
    }
}

/// Keeps a notifier subscription alive.
pub struct Subscription {
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    pub fn new(guard: impl Any + Send) -> Self {
        Self { _guard: Box::new(guard) }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish()
    }
}

pub trait Notifier: Send + Sync + fmt::Debug {
    /// Start delivering events for `root` (recursively) into `sink`.
    ///
    /// Returns once the subscription is active.
    fn subscribe(&self, root: &Path, sink: mpsc::UnboundedSender<FsEvent>) -> Result<Subscription>;
}

/// Production notifier backed by `notify`'s recommended watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyNotifier;

impl Notifier for NotifyNotifier {
    fn subscribe(&self, root: &Path, sink: mpsc::UnboundedSender<FsEvent>) -> Result<Subscription> {
        let mut translator = EventTranslator::new();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for fs_event in translator.translate(event) {
                        // Receiver gone means the box stopped watching.
                        if sink.send(fs_event).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => warn!("file watch error: {err}"),
            },
            Config::default(),
        )
        .context("creating filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {:?}", root))?;

        debug!(root = ?root, "notify subscription active");
        Ok(Subscription::new(watcher))
    }
}

const TRACKED_RENAMES: usize = 256;

/// Stateful front end to [`translate`].
///
/// inotify reports one rename three times: `Name(From)`, `Name(To)`, then
/// `Name(Both)`, all with the same tracker. The halves already carry the
/// whole rename, so a `Both` whose tracker showed up in a half is dropped.
/// A `Both` with no tracker, or one never seen before, is translated.
#[derive(Debug, Default)]
pub struct EventTranslator {
    seen: VecDeque<usize>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: Event) -> Vec<FsEvent> {
        if let (EventKind::Modify(ModifyKind::Name(mode)), Some(tracker)) =
            (event.kind, event.tracker())
        {
            match mode {
                RenameMode::From | RenameMode::To => self.remember(tracker),
                RenameMode::Both if self.forget(tracker) => {
                    debug!(tracker, "dropping rename already reported in halves");
                    return Vec::new();
                }
                _ => {}
            }
        }
        translate(event)
    }

    fn remember(&mut self, tracker: usize) {
        if self.seen.contains(&tracker) {
            return;
        }
        if self.seen.len() == TRACKED_RENAMES {
            self.seen.pop_front();
        }
        self.seen.push_back(tracker);
    }

    fn forget(&mut self, tracker: usize) -> bool {
        let before = self.seen.len();
        self.seen.retain(|t| *t != tracker);
        self.seen.len() != before
    }
}

/// Map one `notify` event onto add/change/unlink events.
pub fn translate(event: Event) -> Vec<FsEvent> {
    let paths = event.paths;
    match event.kind {
        EventKind::Create(_) => paths.into_iter().map(FsEvent::add).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FsEvent::unlink).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.into_iter().map(FsEvent::unlink).collect(),
            RenameMode::To => paths.into_iter().map(FsEvent::add).collect(),
            RenameMode::Both => {
                let mut out = Vec::with_capacity(paths.len());
                let mut it = paths.into_iter();
                while let Some(from) = it.next() {
                    out.push(FsEvent::unlink(from));
                    if let Some(to) = it.next() {
                        out.push(FsEvent::add(to));
                    }
                }
                out
            }
            // Backends that cannot tell which side of a rename this is.
            RenameMode::Any | RenameMode::Other => paths
                .into_iter()
                .map(|p| {
                    if p.exists() {
                        FsEvent::add(p)
                    } else {
                        FsEvent::unlink(p)
                    }
                })
                .collect(),
        },
        EventKind::Modify(_) => paths.into_iter().map(FsEvent::change).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

type SharedSink = Arc<Mutex<Option<mpsc::UnboundedSender<FsEvent>>>>;

/// Deterministic notifier for tests.
///
/// Events pushed with [`ManualNotifier::emit`] are delivered only while a
/// subscription is alive.
#[derive(Debug, Clone, Default)]
pub struct ManualNotifier {
    sink: SharedSink,
    root: Arc<Mutex<Option<PathBuf>>>,
}

struct ManualGuard {
    sink: SharedSink,
}

impl Drop for ManualGuard {
    fn drop(&mut self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl ManualNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Root passed to the most recent `subscribe`.
    pub fn root(&self) -> Option<PathBuf> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Deliver an event; false if nobody is subscribed.
    pub fn emit(&self, event: FsEvent) -> bool {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match sink.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

impl Notifier for ManualNotifier {
    fn subscribe(&self, root: &Path, sink: mpsc::UnboundedSender<FsEvent>) -> Result<Subscription> {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        *self.root.lock().unwrap_or_else(PoisonError::into_inner) = Some(root.to_path_buf());
        Ok(Subscription::new(ManualGuard {
            sink: Arc::clone(&self.sink),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn create_modify_remove_map_directly() {
        assert_eq!(
            translate(event(EventKind::Create(CreateKind::File), &["/r/a.txt"])),
            vec![FsEvent::add("/r/a.txt")]
        );
        assert_eq!(
            translate(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/r/a.txt"]
            )),
            vec![FsEvent::change("/r/a.txt")]
        );
        assert_eq!(
            translate(event(EventKind::Remove(RemoveKind::File), &["/r/a.txt"])),
            vec![FsEvent::unlink("/r/a.txt")]
        );
    }

    #[test]
    fn rename_both_becomes_unlink_then_add() {
        let out = translate(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/a", "/r/c"],
        ));
        assert_eq!(out, vec![FsEvent::unlink("/r/a"), FsEvent::add("/r/c")]);
    }

    #[test]
    fn rename_halves_and_access_events() {
        assert_eq!(
            translate(event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/a"])),
            vec![FsEvent::unlink("/r/a")]
        );
        assert_eq!(
            translate(event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/r/b"])),
            vec![FsEvent::add("/r/b")]
        );
        assert!(translate(event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/r/a"]
        ))
        .is_empty());
    }

    fn renamed(mode: RenameMode, paths: &[&str], tracker: usize) -> Event {
        event(EventKind::Modify(ModifyKind::Name(mode)), paths).set_tracker(tracker)
    }

    #[test]
    fn inotify_rename_sequence_is_reported_once() {
        let mut translator = EventTranslator::new();
        let mut out = Vec::new();
        out.extend(translator.translate(renamed(RenameMode::From, &["/r/a/b.txt"], 7)));
        out.extend(translator.translate(renamed(RenameMode::To, &["/r/c/b.txt"], 7)));
        out.extend(translator.translate(renamed(
            RenameMode::Both,
            &["/r/a/b.txt", "/r/c/b.txt"],
            7,
        )));

        assert_eq!(
            out,
            vec![FsEvent::unlink("/r/a/b.txt"), FsEvent::add("/r/c/b.txt")]
        );
    }

    #[test]
    fn both_without_halves_is_still_translated() {
        let mut translator = EventTranslator::new();
        assert_eq!(
            translator.translate(renamed(RenameMode::Both, &["/r/a", "/r/c"], 3)),
            vec![FsEvent::unlink("/r/a"), FsEvent::add("/r/c")]
        );
        assert_eq!(
            translator.translate(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/r/c", "/r/d"],
            )),
            vec![FsEvent::unlink("/r/c"), FsEvent::add("/r/d")]
        );
    }

    #[test]
    fn trackers_are_not_reused_across_renames() {
        let mut translator = EventTranslator::new();
        translator.translate(renamed(RenameMode::From, &["/r/a"], 1));
        translator.translate(renamed(RenameMode::To, &["/r/b"], 1));
        assert!(translator
            .translate(renamed(RenameMode::Both, &["/r/a", "/r/b"], 1))
            .is_empty());
        // Cookie 1 was consumed; a later Both reusing it is a new rename.
        assert_eq!(
            translator.translate(renamed(RenameMode::Both, &["/r/b", "/r/a"], 1)).len(),
            2
        );
    }

    #[test]
    fn manual_notifier_stops_delivering_after_drop() {
        let notifier = ManualNotifier::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = notifier.subscribe(Path::new("/r"), tx).unwrap();

        assert!(notifier.emit(FsEvent::add("/r/a.txt")));
        assert_eq!(rx.try_recv().unwrap(), FsEvent::add("/r/a.txt"));

        drop(sub);
        assert!(!notifier.is_subscribed());
        assert!(!notifier.emit(FsEvent::add("/r/b.txt")));
    }
}
