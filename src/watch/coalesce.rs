// src/watch/coalesce.rs

//! Rename detection over raw notifier events.
//!
//! Both halves of a rename are held back for a short window:
//!
//! - an unlink of a cached path waits for an add with the same content hash;
//! - an add of a path the cache has never seen waits for an unlink of a
//!   cached path with the same content hash.
//!
//! Whichever half arrives second completes the pair, which is reported as a
//! rename (delete the old path, then create the new one). Anything still
//! unpaired when its window runs out is released on its own: a delete for an
//! unlink, a create for an add.
//!
//! Time is always passed in explicitly, so the logic is deterministic under
//! test; the live loop reads it from a [`Clock`].

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::CacheEntry;

/// Default coalescing window.
pub const DEFAULT_RENAME_WINDOW: Duration = Duration::from_millis(100);

const MAX_PENDING: usize = 1024;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held-back event whose window ran out (or that was evicted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Released {
    /// An unlink nobody claimed.
    Delete(String),
    /// An add nobody claimed, with the stamp taken when it was seen.
    Create(String, CacheEntry),
}

#[derive(Debug, Clone)]
enum Held {
    Unlink { hash: String },
    Add { stamp: CacheEntry },
}

#[derive(Debug, Clone)]
struct Pending {
    path: String,
    held: Held,
    at: Instant,
}

impl Pending {
    fn release(self) -> Released {
        match self.held {
            Held::Unlink { .. } => Released::Delete(self.path),
            Held::Add { stamp } => Released::Create(self.path, stamp),
        }
    }

    fn is_unlink(&self) -> bool {
        matches!(self.held, Held::Unlink { .. })
    }

    fn is_add(&self) -> bool {
        matches!(self.held, Held::Add { .. })
    }
}

#[derive(Debug)]
pub struct RenameCoalescer {
    window: Duration,
    pending: VecDeque<Pending>,
}

impl RenameCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// An unlink of `path` is waiting for its partner.
    pub fn is_pending(&self, path: &str) -> bool {
        self.pending.iter().any(|p| p.is_unlink() && p.path == path)
    }

    /// An add of `path` is waiting for its partner.
    pub fn is_held_add(&self, path: &str) -> bool {
        self.pending.iter().any(|p| p.is_add() && p.path == path)
    }

    fn inside(&self, at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(at) < self.window
    }

    fn push(&mut self, entry: Pending) -> Vec<Released> {
        let path = entry.path.clone();
        self.pending.retain(|p| p.path != path);
        self.pending.push_back(entry);

        let mut evicted = Vec::new();
        while self.pending.len() > MAX_PENDING {
            if let Some(old) = self.pending.pop_front() {
                evicted.push(old.release());
            }
        }
        evicted
    }

    /// Hold back an unlink of a cached path whose last known hash is `hash`.
    ///
    /// Returns entries evicted to keep the queue bounded; the caller must
    /// release those right away.
    pub fn push_unlink(&mut self, path: String, hash: String, now: Instant) -> Vec<Released> {
        self.push(Pending {
            path,
            held: Held::Unlink { hash },
            at: now,
        })
    }

    /// Hold back an add of a path the cache does not know yet.
    pub fn push_add(&mut self, path: String, stamp: CacheEntry, now: Instant) -> Vec<Released> {
        self.push(Pending {
            path,
            held: Held::Add { stamp },
            at: now,
        })
    }

    /// Forget a pending unlink because the same path came back.
    pub fn cancel(&mut self, path: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| !(p.is_unlink() && p.path == path));
        self.pending.len() != before
    }

    /// Replace the stamp of a held add, keeping its place in the window.
    pub fn refresh_add(&mut self, path: &str, stamp: CacheEntry) -> bool {
        for p in self.pending.iter_mut() {
            if p.path == path {
                if let Held::Add { stamp: held } = &mut p.held {
                    *held = stamp;
                    return true;
                }
            }
        }
        false
    }

    /// Drop held adds for `path` or anything below it. Returns the paths.
    pub fn discard_adds(&mut self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut gone = Vec::new();
        self.pending.retain(|p| {
            let hit = p.is_add() && (p.path == path || p.path.starts_with(&prefix));
            if hit {
                gone.push(p.path.clone());
            }
            !hit
        });
        gone
    }

    /// Pair an add carrying `hash` with the oldest pending unlink of the same
    /// content that is still inside the window. Returns the old path.
    pub fn pair(&mut self, hash: &str, now: Instant) -> Option<String> {
        if hash.is_empty() {
            return None;
        }
        let idx = self.pending.iter().position(|p| match &p.held {
            Held::Unlink { hash: h } => h == hash && self.inside(p.at, now),
            Held::Add { .. } => false,
        })?;
        self.pending.remove(idx).map(|p| p.path)
    }

    /// Pair an unlink whose cached hash is `hash` with the oldest held add
    /// of the same content inside the window. Returns the new path and its
    /// stamp.
    pub fn pair_add(&mut self, hash: &str, now: Instant) -> Option<(String, CacheEntry)> {
        if hash.is_empty() {
            return None;
        }
        let idx = self.pending.iter().position(|p| match &p.held {
            Held::Add { stamp } => stamp.hash == hash && self.inside(p.at, now),
            Held::Unlink { .. } => false,
        })?;
        match self.pending.remove(idx)?.release() {
            Released::Create(path, stamp) => Some((path, stamp)),
            Released::Delete(_) => None,
        }
    }

    /// Release everything whose window has run out, oldest first. An entry
    /// is released once exactly one window has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<Released> {
        let mut out = Vec::new();
        while let Some(front) = self.pending.front() {
            if self.inside(front.at, now) {
                break;
            }
            if let Some(p) = self.pending.pop_front() {
                out.push(p.release());
            }
        }
        out
    }

    /// When the oldest pending entry expires.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|p| p.at + self.window)
    }

    /// Drop everything still pending, returning the paths.
    pub fn drain(&mut self) -> Vec<String> {
        self.pending.drain(..).map(|p| p.path).collect()
    }
}

impl Default for RenameCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_RENAME_WINDOW)
    }
}
