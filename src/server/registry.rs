use std::sync::Mutex;

use tokio::sync::watch;

use crate::pipeline::WorkerSet;

/// Which workers are present, for health reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ModelsLoaded {
    pub whisperx: bool,
    pub diarizer: bool,
    pub translator: bool,
    pub clinical: bool,
    pub s3: bool,
}

/// Process-wide shared worker state. The background loader is the only
/// writer; the dispatcher reads snapshots. `ready` flips once when the
/// loader terminates, successfully or not.
pub struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

struct RegistryInner {
    workers: WorkerSet,
    load_errors: Vec<String>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            inner: Mutex::new(RegistryInner {
                workers: WorkerSet::default(),
                load_errors: Vec::new(),
            }),
            ready_tx,
            ready_rx,
        }
    }

    pub fn install(&self, workers: WorkerSet) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.workers = workers;
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.load_errors.push(message.into());
    }

    /// Snapshot of the workers for one job. Cheap: only Arc clones.
    pub fn workers(&self) -> WorkerSet {
        self.inner.lock().expect("registry lock").workers.clone()
    }

    pub fn load_errors(&self) -> Vec<String> {
        self.inner.lock().expect("registry lock").load_errors.clone()
    }

    pub fn models_loaded(&self) -> ModelsLoaded {
        let inner = self.inner.lock().expect("registry lock");
        ModelsLoaded {
            whisperx: inner.workers.transcriber.is_some(),
            diarizer: inner.workers.diarizer.is_some(),
            translator: inner.workers.translator.is_some(),
            clinical: inner.workers.extractor.is_some(),
            s3: inner.workers.resolver.is_some(),
        }
    }

    /// Mark loading finished and wake anything waiting on readiness.
    pub fn set_ready(&self) {
        self.ready_tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// A receiver that resolves when the loader has terminated.
    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_starts_empty_and_not_ready() {
        let registry = WorkerRegistry::new();
        assert!(!registry.is_ready());
        let loaded = registry.models_loaded();
        assert!(!loaded.whisperx);
        assert!(!loaded.s3);
        assert!(registry.load_errors().is_empty());
    }

    #[test]
    fn test_ready_event() {
        let registry = WorkerRegistry::new();
        let rx = registry.ready_signal();
        registry.set_ready();
        assert!(registry.is_ready());
        assert!(*rx.borrow());
    }

    #[test]
    fn test_errors_accumulate() {
        let registry = WorkerRegistry::new();
        registry.record_error("whisper model missing");
        registry.record_error("no credentials");
        assert_eq!(registry.load_errors().len(), 2);
    }
}
