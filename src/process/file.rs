use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::process::pattern::Params;
use crate::types::ChangeType;

/// One processing event for one file.
///
/// Handlers receive their own copy, so `params` always reflects the pattern
/// of the processor being invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the box root, `/`-separated.
    pub path: String,
    /// Absolute path on disk.
    pub source: PathBuf,
    pub change: ChangeType,
    pub params: Params,
}

impl SourceFile {
    pub fn new(base: &Path, path: impl Into<String>, change: ChangeType) -> Self {
        let path = path.into();
        let source = base.join(&path);
        Self {
            path,
            source,
            change,
            params: Params::new(),
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.source)
            .await
            .with_context(|| format!("reading {:?}", self.source))
    }

    pub async fn read_to_string(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.source)
            .await
            .with_context(|| format!("reading {:?}", self.source))
    }
}
