// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{BoxConfig, RawBoxConfig};
use crate::errors::Result;

/// Read and deserialize a config file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawBoxConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawBoxConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Read, deserialize and validate a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BoxConfig> {
    let raw_config = load_from_path(&path)?;
    let config = BoxConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load `path`, letting `root` override `[source].root`.
///
/// With a `root` override a missing config file is fine: defaults are used
/// for everything else.
pub fn load_with_root(path: impl AsRef<Path>, root: Option<&str>) -> Result<BoxConfig> {
    let path = path.as_ref();
    let mut raw = match (path.exists(), root) {
        (true, _) => load_from_path(path)?,
        (false, Some(_)) => {
            debug!(path = ?path, "no config file; using defaults");
            RawBoxConfig::default()
        }
        (false, None) => load_from_path(path)?,
    };

    if let Some(root) = root {
        raw.source.root = root.to_string();
    }
    BoxConfig::try_from(raw)
}

/// `SourceBox.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("SourceBox.toml")
}
