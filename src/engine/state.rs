// src/engine/state.rs

//! Pure watch lifecycle state machine.
//!
//! `Stopped -> Starting -> Running -> Stopped`. The async shell in
//! [`crate::engine::SourceBox`] drives the transitions; this type only
//! enforces which ones are legal, so it can be tested without Tokio or a
//! filesystem.

use crate::errors::{Result, SourceBoxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    #[default]
    Stopped,
    /// Initial scan and subscription in progress.
    Starting,
    Running,
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    state: WatchState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == WatchState::Running
    }

    /// `Stopped -> Starting`. Anything else is a double start.
    pub fn begin_start(&mut self) -> Result<()> {
        if self.state != WatchState::Stopped {
            return Err(SourceBoxError::AlreadyWatching);
        }
        self.state = WatchState::Starting;
        Ok(())
    }

    /// `Starting -> Running`, once the subscription is live.
    pub fn confirm_running(&mut self) {
        debug_assert_eq!(self.state, WatchState::Starting);
        self.state = WatchState::Running;
    }

    /// `Starting -> Stopped` when the initial scan or subscription failed.
    pub fn abort_start(&mut self) {
        if self.state == WatchState::Starting {
            self.state = WatchState::Stopped;
        }
    }

    /// `Running -> Stopped`. Returns false (and changes nothing) otherwise.
    pub fn stop(&mut self) -> bool {
        if self.state != WatchState::Running {
            return false;
        }
        self.state = WatchState::Stopped;
        true
    }
}
