//! Names of worker loops that are currently alive.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Set of running worker names; lease owners not in it are orphans.
#[derive(Debug, Clone, Default)]
pub struct LiveWorkers {
    names: Arc<Mutex<HashSet<String>>>,
}

impl LiveWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` alive until the returned guard is dropped (also on panic).
    pub fn register(&self, name: &str) -> WorkerRegistration {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        WorkerRegistration {
            names: Arc::clone(&self.names),
            name: name.to_string(),
        }
    }

    pub fn is_alive(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes the worker name from [`LiveWorkers`] when dropped.
pub struct WorkerRegistration {
    names: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for WorkerRegistration {
    fn drop(&mut self) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}
