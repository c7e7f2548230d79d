// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{BoxConfig, RawBoxConfig};
use crate::errors::{Result, SourceBoxError};
use crate::process::pattern::{PathMatcher, PatternSpec};

impl TryFrom<RawBoxConfig> for BoxConfig {
    type Error = SourceBoxError;

    fn try_from(raw: RawBoxConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(BoxConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawBoxConfig) -> Result<()> {
    validate_source(cfg)?;
    validate_watch(cfg)?;
    validate_routes(cfg)?;
    Ok(())
}

fn validate_source(cfg: &RawBoxConfig) -> Result<()> {
    if cfg.source.root.trim().is_empty() {
        return Err(SourceBoxError::ConfigError(
            "[source].root must be set (in the config file or with --root)".to_string(),
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &RawBoxConfig) -> Result<()> {
    if cfg.watch.rename_window_ms == 0 {
        return Err(SourceBoxError::ConfigError(
            "[watch].rename_window_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.watch.concurrency == 0 {
        return Err(SourceBoxError::ConfigError(
            "[watch].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_routes(cfg: &RawBoxConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for route in &cfg.routes {
        if route.name.trim().is_empty() {
            return Err(SourceBoxError::ConfigError(
                "[[route]] entries need a non-empty name".to_string(),
            ));
        }
        if !seen.insert(route.name.as_str()) {
            return Err(SourceBoxError::ConfigError(format!(
                "route '{}' is defined more than once",
                route.name
            )));
        }
        if let Some(pattern) = &route.pattern {
            PathMatcher::compile(PatternSpec::Path(pattern.clone())).map_err(|err| {
                SourceBoxError::ConfigError(format!(
                    "route '{}' has an invalid pattern: {err}",
                    route.name
                ))
            })?;
        }
    }
    Ok(())
}
