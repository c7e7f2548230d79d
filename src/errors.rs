// src/errors.rs

//! Crate-wide error type and helpers.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceBoxError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Watcher has already started.")]
    AlreadyWatching,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("processor failed for {path}: {source:#}")]
    Handler {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Cache error: {0:#}")]
    Cache(anyhow::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SourceBoxError>;

/// True if any error in the chain is an `io::Error` of kind `NotFound`.
///
/// Used to tell "the file vanished between listing and reading" apart from
/// genuine I/O failures.
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    })
}
