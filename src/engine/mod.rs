// src/engine/mod.rs

//! Tree instance orchestration.
//!
//! - [`pipeline`] is the per-file path shared by scan and live mode.
//! - [`state`] is the pure watch lifecycle.
//! - [`source_box`] is the public [`SourceBox`] tying it together.

pub mod pipeline;
pub mod source_box;
pub mod state;

pub use pipeline::Pipeline;
pub use source_box::{SourceBox, SourceBoxBuilder, DEFAULT_CONCURRENCY};
pub use state::{Lifecycle, WatchState};
