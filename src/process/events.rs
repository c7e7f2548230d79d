use std::fmt;
use std::sync::Arc;

use crate::process::file::SourceFile;

/// Observer notified synchronously around each file's dispatch.
pub trait ProcessObserver: Send + Sync {
    fn process_before(&self, _file: &SourceFile) {}
    fn process_after(&self, _file: &SourceFile) {}
}

type Hook = Box<dyn Fn(&SourceFile) + Send + Sync>;

struct BeforeHook(Hook);

impl ProcessObserver for BeforeHook {
    fn process_before(&self, file: &SourceFile) {
        (self.0)(file)
    }
}

struct AfterHook(Hook);

impl ProcessObserver for AfterHook {
    fn process_after(&self, file: &SourceFile) {
        (self.0)(file)
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn ProcessObserver>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ProcessObserver>) {
        self.observers.push(observer);
    }

    pub fn on_before(&mut self, hook: impl Fn(&SourceFile) + Send + Sync + 'static) {
        self.subscribe(Arc::new(BeforeHook(Box::new(hook))));
    }

    pub fn on_after(&mut self, hook: impl Fn(&SourceFile) + Send + Sync + 'static) {
        self.subscribe(Arc::new(AfterHook(Box::new(hook))));
    }

    pub fn before(&self, file: &SourceFile) {
        for observer in &self.observers {
            observer.process_before(file);
        }
    }

    pub fn after(&self, file: &SourceFile) {
        for observer in &self.observers {
            observer.process_after(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeType;
    use std::path::Path;
    use std::sync::Mutex;

    #[test]
    fn hooks_fire_only_for_their_phase() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        {
            let seen = Arc::clone(&seen);
            bus.on_before(move |f| seen.lock().unwrap().push(format!("before {}", f.path)));
        }
        {
            let seen = Arc::clone(&seen);
            bus.on_after(move |f| seen.lock().unwrap().push(format!("after {}", f.path)));
        }

        let file = SourceFile::new(Path::new("/r"), "a.txt", ChangeType::Create);
        bus.before(&file);
        bus.after(&file);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["before a.txt".to_string(), "after a.txt".to_string()]
        );
    }
}
