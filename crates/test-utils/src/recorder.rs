#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sourcebox::process::{Handler, Params, SourceFile};
use sourcebox::types::ChangeType;

/// What a recording handler saw for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub tag: String,
    pub path: String,
    pub change: ChangeType,
    pub params: Params,
}

/// Collects dispatched files across any number of handlers.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that records under the tag `"default"`.
    pub fn handler(&self) -> impl Handler + use<> {
        self.tagged("default")
    }

    pub fn tagged(&self, tag: &str) -> impl Handler + use<> {
        let events = Arc::clone(&self.events);
        let tag = tag.to_string();
        move |file: SourceFile| {
            let events = Arc::clone(&events);
            let tag = tag.clone();
            async move {
                events.lock().unwrap().push(Recorded {
                    tag,
                    path: file.path,
                    change: file.change,
                    params: file.params,
                });
                Ok::<(), anyhow::Error>(())
            }
        }
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    /// `(change, path)` pairs in dispatch order.
    pub fn changes(&self) -> Vec<(ChangeType, String)> {
        self.events()
            .into_iter()
            .map(|e| (e.change, e.path))
            .collect()
    }

    /// `(change, path)` pairs sorted by path, for parallel passes.
    pub fn sorted_changes(&self) -> Vec<(ChangeType, String)> {
        let mut out = self.changes();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// A handler that always fails with `message`.
pub fn failing_handler(message: &'static str) -> impl Handler {
    move |_file: SourceFile| async move { Err::<(), _>(anyhow::anyhow!(message)) }
}
