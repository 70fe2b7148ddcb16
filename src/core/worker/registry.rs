use std::sync::Arc;

use tracing::{debug, info};

use crate::core::metrics::WorkerMetrics;

use super::{Worker, WorkerFactory, WorkerInfo};

/// A worker plus everything the orchestrator tracks about it.
pub struct RegisteredWorker {
    pub worker: Arc<dyn Worker>,
    pub factory: Option<Arc<dyn WorkerFactory>>,
    pub metrics: WorkerMetrics,
}

impl RegisteredWorker {
    pub fn id(&self) -> &str {
        self.worker.id()
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.worker.id().to_string(),
            display_name: self.worker.display_name().to_string(),
            description: self.worker.description().to_string(),
            state: self.metrics.status,
            metrics: self.metrics.clone(),
        }
    }
}

/// Named workers in registration order. Ids are unique.
#[derive(Default)]
pub struct WorkerRegistry {
    entries: Vec<RegisteredWorker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and changes nothing) if the id is already taken.
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> bool {
        self.insert(RegisteredWorker {
            worker,
            factory: None,
            metrics: WorkerMetrics::default(),
        })
    }

    /// Like [`register`](Self::register), also remembering how to rebuild the
    /// worker on restart.
    pub fn register_with_factory(
        &mut self,
        worker: Arc<dyn Worker>,
        factory: Arc<dyn WorkerFactory>,
    ) -> bool {
        self.insert(RegisteredWorker {
            worker,
            factory: Some(factory),
            metrics: WorkerMetrics::default(),
        })
    }

    /// Insert a fully formed entry. Used by registration and by restarts
    /// that carry metrics over.
    pub fn insert(&mut self, entry: RegisteredWorker) -> bool {
        if self.contains(entry.id()) {
            debug!("Worker [{}] already registered", entry.id());
            return false;
        }
        info!("Registered worker [{}]", entry.id());
        self.entries.push(entry);
        true
    }

    /// Insert at a given slot (clamped), keeping the order a restarted
    /// worker had before it was taken out.
    pub fn insert_at(&mut self, index: usize, entry: RegisteredWorker) -> bool {
        if self.contains(entry.id()) {
            debug!("Worker [{}] already registered", entry.id());
            return false;
        }
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        true
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.remove(id).is_some()
    }

    pub fn remove(&mut self, id: &str) -> Option<RegisteredWorker> {
        let pos = self.entries.iter().position(|e| e.id() == id)?;
        info!("Unregistered worker [{}]", id);
        Some(self.entries.remove(pos))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredWorker> {
        self.entries.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RegisteredWorker> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }

    pub fn list(&self) -> &[RegisteredWorker] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id().to_string()).collect()
    }

    pub fn infos(&self) -> Vec<WorkerInfo> {
        self.entries.iter().map(RegisteredWorker::info).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
