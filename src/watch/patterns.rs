// src/watch/patterns.rs

use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use tracing::warn;

/// Ignore patterns as supplied by the caller or the config file.
///
/// Mirrors the accepted shapes:
///
/// ```toml
/// ignore = "**/drafts"
/// ignore = ["**/drafts", "", "**/*.tmp"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IgnoreSpec {
    #[default]
    None,
    Single(String),
    List(Vec<Option<String>>),
}

impl IgnoreSpec {
    /// Flatten to the non-empty pattern strings.
    pub fn patterns(&self) -> Vec<String> {
        let raw: Vec<Option<&str>> = match self {
            IgnoreSpec::None => Vec::new(),
            IgnoreSpec::Single(s) => vec![Some(s.as_str())],
            IgnoreSpec::List(list) => list.iter().map(|s| s.as_deref()).collect(),
        };
        raw.into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl From<&str> for IgnoreSpec {
    fn from(s: &str) -> Self {
        IgnoreSpec::Single(s.to_string())
    }
}

impl From<String> for IgnoreSpec {
    fn from(s: String) -> Self {
        IgnoreSpec::Single(s)
    }
}

impl From<Option<&str>> for IgnoreSpec {
    fn from(s: Option<&str>) -> Self {
        s.map(IgnoreSpec::from).unwrap_or_default()
    }
}

impl From<Vec<&str>> for IgnoreSpec {
    fn from(list: Vec<&str>) -> Self {
        IgnoreSpec::List(list.into_iter().map(|s| Some(s.to_string())).collect())
    }
}

impl From<Vec<Option<&str>>> for IgnoreSpec {
    fn from(list: Vec<Option<&str>>) -> Self {
        IgnoreSpec::List(list.into_iter().map(|s| s.map(str::to_string)).collect())
    }
}

impl From<Vec<String>> for IgnoreSpec {
    fn from(list: Vec<String>) -> Self {
        IgnoreSpec::List(list.into_iter().map(Some).collect())
    }
}

/// Compiled ignore predicate over relative, `/`-separated paths.
#[derive(Clone)]
pub struct IgnoreSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for IgnoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IgnoreSet").field(&self.patterns).finish()
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::new(&IgnoreSpec::None)
    }
}

impl IgnoreSet {
    /// Compile every usable pattern; entries that fail to compile are logged
    /// and dropped.
    pub fn new(spec: &IgnoreSpec) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut patterns = Vec::new();

        for pat in spec.patterns() {
            match GlobBuilder::new(&pat).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                    patterns.push(pat);
                }
                Err(err) => warn!(pattern = %pat, error = %err, "dropping invalid ignore pattern"),
            }
        }

        let set = builder.build().unwrap_or_else(|err| {
            warn!(error = %err, "ignore patterns failed to build; ignoring nothing");
            patterns.clear();
            GlobSet::empty()
        });

        Self { patterns, set }
    }

    /// The patterns that survived normalisation and compilation.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if `rel_path` or any of its ancestor directories is ignored.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if self.set.is_empty() || rel_path.is_empty() {
            return false;
        }
        let mut end = rel_path.len();
        loop {
            let candidate = &rel_path[..end];
            if self.set.is_match(candidate) {
                return true;
            }
            match candidate.rfind('/') {
                Some(idx) if idx > 0 => end = idx,
                _ => return false,
            }
        }
    }
}
