// src/process/pattern.rs

//! Path patterns for processor routing.
//!
//! A pattern is one of:
//! - nothing: matches every path with empty params;
//! - a [`Regex`]: tested against the whole relative path, empty params;
//! - a string such as `"posts/:id"`: literal text plus named parameters.
//!   `:name` captures one path component, `*name` captures across `/`, and a
//!   trailing `?` makes a parameter optional. The whole path must match.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::errors::{Result, SourceBoxError};

/// Named captures produced by a successful match.
pub type Params = BTreeMap<String, String>;

/// Uncompiled pattern as supplied by the caller.
#[derive(Debug, Clone)]
pub enum PatternSpec {
    Any,
    Regex(Regex),
    Path(String),
}

impl From<&str> for PatternSpec {
    fn from(s: &str) -> Self {
        PatternSpec::Path(s.to_string())
    }
}

impl From<String> for PatternSpec {
    fn from(s: String) -> Self {
        PatternSpec::Path(s)
    }
}

impl From<Regex> for PatternSpec {
    fn from(re: Regex) -> Self {
        PatternSpec::Regex(re)
    }
}

impl<T: Into<PatternSpec>> From<Option<T>> for PatternSpec {
    fn from(spec: Option<T>) -> Self {
        spec.map(Into::into).unwrap_or(PatternSpec::Any)
    }
}

#[derive(Clone)]
enum Inner {
    Any,
    Regex(Regex),
    Params { regex: Regex, names: Vec<String> },
}

/// Compiled pattern.
#[derive(Clone)]
pub struct PathMatcher {
    source: String,
    inner: Inner,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathMatcher").field(&self.source).finish()
    }
}

impl PathMatcher {
    pub fn any() -> Self {
        Self {
            source: "<any>".to_string(),
            inner: Inner::Any,
        }
    }

    pub fn compile(spec: impl Into<PatternSpec>) -> Result<Self> {
        match spec.into() {
            PatternSpec::Any => Ok(Self::any()),
            PatternSpec::Regex(re) => Ok(Self {
                source: re.as_str().to_string(),
                inner: Inner::Regex(re),
            }),
            PatternSpec::Path(s) => compile_path(&s),
        }
    }

    /// The pattern text this matcher was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a relative path; `None` means no match.
    pub fn matches(&self, path: &str) -> Option<Params> {
        match &self.inner {
            Inner::Any => Some(Params::new()),
            Inner::Regex(re) => re.is_match(path).then(Params::new),
            Inner::Params { regex, names } => {
                let caps = regex.captures(path)?;
                let params = names
                    .iter()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.clone(), m.as_str().to_string()))
                    })
                    .collect();
                Some(params)
            }
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn compile_path(pattern: &str) -> Result<PathMatcher> {
    let body = pattern.strip_prefix('/').unwrap_or(pattern);
    let mut out = String::from("^");
    let mut names: Vec<String> = Vec::new();
    let mut literal = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ':' && c != '*' {
            literal.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if !is_name_char(next) {
                break;
            }
            name.push(next);
            chars.next();
        }
        if name.is_empty() {
            return Err(SourceBoxError::InvalidArgument(format!(
                "pattern {pattern:?}: `{c}` must be followed by a parameter name"
            )));
        }
        if names.contains(&name) {
            return Err(SourceBoxError::InvalidArgument(format!(
                "pattern {pattern:?}: duplicate parameter `{name}`"
            )));
        }
        let optional = chars.next_if_eq(&'?').is_some();

        out.push_str(&regex::escape(&literal));
        literal.clear();

        let class = if c == ':' { "[^/]+" } else { ".+" };
        out.push_str(&format!("(?P<{name}>{class})"));
        if optional {
            out.push('?');
        }
        names.push(name);
    }

    out.push_str(&regex::escape(&literal));
    out.push('$');

    let regex = Regex::new(&out).map_err(|e| {
        SourceBoxError::InvalidArgument(format!("pattern {pattern:?} does not compile: {e}"))
    })?;

    Ok(PathMatcher {
        source: pattern.to_string(),
        inner: Inner::Params { regex, names },
    })
}
