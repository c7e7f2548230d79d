// src/process/mod.rs

//! Routing of classified files to processors.
//!
//! - [`pattern`] compiles path patterns into matchers.
//! - [`registry`] keeps processors in registration order and dispatches.
//! - [`events`] holds the before/after observers.
//! - [`file`] defines the per-event [`SourceFile`].

pub mod events;
pub mod file;
pub mod pattern;
pub mod registry;

pub use events::{EventBus, ProcessObserver};
pub use file::SourceFile;
pub use pattern::{Params, PathMatcher, PatternSpec};
pub use registry::{dispatch, Handler, HandlerFuture, ProcessorRegistry, Registration};
