// src/watch/mod.rs

//! Change detection support and live watching.
//!
//! This module is responsible for:
//! - Compiling ignore patterns into one predicate.
//! - Hashing file contents.
//! - Turning OS notifications into add/change/unlink events (`notify`).
//! - Pairing unlink/add events into renames inside a clock-driven window.
//! - The live loop that feeds those events through the processing pipeline.

pub mod coalesce;
pub mod hash;
pub mod live;
pub mod notifier;
pub mod path_utils;
pub mod patterns;

pub use coalesce::{
    Clock, ManualClock, Released, RenameCoalescer, SystemClock, DEFAULT_RENAME_WINDOW,
};
pub use hash::{compute_file_hash, hash_bytes};
pub use notifier::{
    EventTranslator, FsEvent, FsEventKind, ManualNotifier, Notifier, NotifyNotifier, Subscription,
};
pub use patterns::{IgnoreSet, IgnoreSpec};
