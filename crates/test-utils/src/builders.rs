#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sourcebox::config::{BoxConfig, RawBoxConfig, RouteConfig};
use sourcebox::types::CacheStorageMode;
use sourcebox::watch::IgnoreSpec;

/// Builder for `BoxConfig` to simplify test setup.
pub struct BoxConfigBuilder {
    config: RawBoxConfig,
}

impl BoxConfigBuilder {
    pub fn new(root: &str) -> Self {
        let mut config = RawBoxConfig::default();
        config.source.root = root.to_string();
        Self { config }
    }

    pub fn with_ignore(mut self, ignore: impl Into<IgnoreSpec>) -> Self {
        self.config.source.ignore = ignore.into();
        self
    }

    pub fn with_file_cache(mut self, path: &str) -> Self {
        self.config.cache.mode = CacheStorageMode::File;
        self.config.cache.path = path.to_string();
        self
    }

    pub fn with_route(mut self, name: &str, pattern: Option<&str>) -> Self {
        self.config.routes.push(RouteConfig {
            name: name.to_string(),
            pattern: pattern.map(str::to_string),
        });
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.watch.concurrency = concurrency;
        self
    }

    pub fn raw(self) -> RawBoxConfig {
        self.config
    }

    pub fn build(self) -> BoxConfig {
        BoxConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, content).expect("write file");
    path
}

/// Set a file's modification time to `secs` after the Unix epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open for mtime");
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .expect("set mtime");
}
