use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Classification assigned to a file for one processing event.
///
/// - `Create`: no cache entry existed for the path.
/// - `Update`: a cache entry existed and the content hash changed.
/// - `Skip`: nothing to do; never dispatched to processors.
/// - `Delete`: a cache entry exists but the file is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Create,
    Update,
    Skip,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Skip => "skip",
            ChangeType::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the change cache is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageMode {
    /// Store entries in a file (`.sourcebox/cache` by default).
    File,
    /// Store entries in memory only (lost on restart).
    Memory,
}

impl Default for CacheStorageMode {
    fn default() -> Self {
        CacheStorageMode::Memory
    }
}

impl FromStr for CacheStorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CacheStorageMode::File),
            "memory" => Ok(CacheStorageMode::Memory),
            other => Err(format!(
                "invalid cache mode: {other} (expected \"file\" or \"memory\")"
            )),
        }
    }
}
