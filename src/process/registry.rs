// src/process/registry.rs

//! Ordered processor list and dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, SourceBoxError};
use crate::process::file::SourceFile;
use crate::process::pattern::{Params, PathMatcher, PatternSpec};

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Something that reacts to a classified file.
///
/// Implemented for any `Fn(SourceFile) -> impl Future<Output = anyhow::Result<()>>`,
/// so plain async closures can be registered directly.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, file: SourceFile) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(SourceFile) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(&self, file: SourceFile) -> HandlerFuture {
        Box::pin(self(file))
    }
}

/// A processor registration request.
pub enum Registration {
    /// Universal pattern.
    HandlerOnly(Arc<dyn Handler>),
    WithPattern(PatternSpec, Arc<dyn Handler>),
}

#[derive(Clone)]
struct ProcessorEntry {
    matcher: PathMatcher,
    handler: Arc<dyn Handler>,
}

/// Processors in registration order.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    entries: Vec<ProcessorEntry>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.matcher.as_str()))
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile and append a processor. Fails with `InvalidArgument` if the
    /// pattern does not compile; nothing is registered in that case.
    pub fn register(&mut self, registration: Registration) -> Result<()> {
        let (matcher, handler) = match registration {
            Registration::HandlerOnly(handler) => (PathMatcher::any(), handler),
            Registration::WithPattern(spec, handler) => (PathMatcher::compile(spec)?, handler),
        };
        debug!(pattern = matcher.as_str(), "registered processor");
        self.entries.push(ProcessorEntry { matcher, handler });
        Ok(())
    }

    /// Every processor whose pattern matches `path`, with its params, in
    /// registration order.
    pub fn matching(&self, path: &str) -> Vec<(Params, Arc<dyn Handler>)> {
        self.entries
            .iter()
            .filter_map(|e| e.matcher.matches(path).map(|p| (p, Arc::clone(&e.handler))))
            .collect()
    }
}

/// Run every matched processor for `file` in order.
///
/// `file.params` is left holding the params of the last processor run. The
/// first failure stops dispatch and is returned.
pub async fn dispatch(
    matched: Vec<(Params, Arc<dyn Handler>)>,
    file: &mut SourceFile,
) -> Result<()> {
    for (params, handler) in matched {
        file.params = params;
        handler
            .handle(file.clone())
            .await
            .map_err(|source| SourceBoxError::Handler {
                path: file.path.clone(),
                source,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeType;
    use std::path::Path;
    use std::sync::Mutex;

    fn recording(
        tag: &'static str,
        log: Arc<Mutex<Vec<(String, Params)>>>,
    ) -> Arc<dyn Handler> {
        Arc::new(move |file: SourceFile| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push((tag.to_string(), file.params));
                Ok::<(), anyhow::Error>(())
            }
        })
    }

    #[tokio::test]
    async fn all_matching_processors_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProcessorRegistry::new();
        registry
            .register(Registration::WithPattern(
                "posts/:id".into(),
                recording("by-id", log.clone()),
            ))
            .unwrap();
        registry
            .register(Registration::HandlerOnly(recording("all", log.clone())))
            .unwrap();
        registry
            .register(Registration::WithPattern(
                "pages/:id".into(),
                recording("pages", log.clone()),
            ))
            .unwrap();

        let mut file = SourceFile::new(Path::new("/root"), "posts/123456", ChangeType::Create);
        dispatch(registry.matching(&file.path), &mut file).await.unwrap();

        let log = log.lock().unwrap();
        let tags: Vec<&str> = log.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tags, vec!["by-id", "all"]);
        assert_eq!(log[0].1.get("id").map(String::as_str), Some("123456"));
        assert!(log[1].1.is_empty());
    }

    #[tokio::test]
    async fn failure_stops_remaining_processors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProcessorRegistry::new();
        let failing: Arc<dyn Handler> =
            Arc::new(|_file: SourceFile| async { Err::<(), _>(anyhow::anyhow!("render failed")) });
        registry.register(Registration::HandlerOnly(failing)).unwrap();
        registry
            .register(Registration::HandlerOnly(recording("after", log.clone())))
            .unwrap();

        let mut file = SourceFile::new(Path::new("/root"), "a.txt", ChangeType::Update);
        let err = dispatch(registry.matching(&file.path), &mut file)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceBoxError::Handler { ref path, .. } if path == "a.txt"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn bad_pattern_registers_nothing() {
        let mut registry = ProcessorRegistry::new();
        let handler: Arc<dyn Handler> = Arc::new(|_f: SourceFile| async { Ok::<(), anyhow::Error>(()) });
        let err = registry
            .register(Registration::WithPattern("posts/:".into(), handler))
            .unwrap_err();
        assert!(matches!(err, SourceBoxError::InvalidArgument(_)));
        assert!(registry.is_empty());
    }
}
