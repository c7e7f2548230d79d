// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::cache::CACHE_FILE_PATH;
use crate::types::CacheStorageMode;
use crate::watch::patterns::IgnoreSpec;

/// Configuration as read from `SourceBox.toml`, before validation.
///
/// ```toml
/// [source]
/// root = "source"
/// ignore = ["**/drafts"]
///
/// [cache]
/// mode = "file"
///
/// [watch]
/// rename_window_ms = 100
/// concurrency = 8
///
/// [[route]]
/// name = "post"
/// pattern = "_posts/:slug"
/// ```
///
/// All sections are optional; `[source].root` must end up non-empty, either
/// from the file or from `--root`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBoxConfig {
    #[serde(default)]
    pub source: SourceSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default, rename = "route")]
    pub routes: Vec<RouteConfig>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawBoxConfig>`.
#[derive(Debug, Clone)]
pub struct BoxConfig {
    pub source: SourceSection,
    pub cache: CacheSection,
    pub watch: WatchSection,
    pub routes: Vec<RouteConfig>,
}

impl BoxConfig {
    pub(crate) fn new_unchecked(raw: RawBoxConfig) -> Self {
        Self {
            source: raw.source,
            cache: raw.cache,
            watch: raw.watch,
            routes: raw.routes,
        }
    }

    pub fn rename_window(&self) -> Duration {
        Duration::from_millis(self.watch.rename_window_ms)
    }
}

/// `[source]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSection {
    /// Directory to process, relative to the config file's directory.
    #[serde(default)]
    pub root: String,

    /// A single pattern, a list, or nothing. Empty entries are dropped.
    #[serde(default)]
    pub ignore: IgnoreSpec,

    /// Cache id prefix. `None` means `<root dir name>/`.
    #[serde(default)]
    pub scope: Option<String>,
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub mode: CacheStorageMode,

    /// Cache file, relative to the config file's directory. File mode only.
    #[serde(default = "default_cache_path")]
    pub path: String,
}

fn default_cache_path() -> String {
    CACHE_FILE_PATH.to_string()
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            mode: CacheStorageMode::default(),
            path: default_cache_path(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Window in which an unlink and an add of identical content are paired
    /// into a rename.
    #[serde(default = "default_rename_window_ms")]
    pub rename_window_ms: u64,

    /// Files processed in parallel during a scan pass.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_rename_window_ms() -> u64 {
    100
}

fn default_concurrency() -> usize {
    crate::engine::DEFAULT_CONCURRENCY
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            rename_window_ms: default_rename_window_ms(),
            concurrency: default_concurrency(),
        }
    }
}

/// One `[[route]]` entry: a named processor for the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub name: String,

    /// Path pattern (`posts/:id`, `*rest`). Omitted means every file.
    #[serde(default)]
    pub pattern: Option<String>,
}
