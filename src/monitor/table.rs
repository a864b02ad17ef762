//! Registered measurement keys and their histories.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::{EngineError, Snapshot};
use super::history::History;

/// Shared handle to one key's rolling history.
pub type SharedHistory = Arc<Mutex<History>>;

/// Key to history map shared between the engine and its probe tasks.
#[derive(Debug, Default)]
pub struct TargetTable {
    targets: Mutex<HashMap<String, SharedHistory>>,
}

impl TargetTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` with an empty history of `capacity` results.
    ///
    /// # Errors
    /// Returns `EngineError::DuplicateKey` if `key` is already present.
    pub fn insert(&self, key: &str, capacity: usize) -> Result<SharedHistory, EngineError> {
        let mut targets = self.targets.lock();
        if targets.contains_key(key) {
            return Err(EngineError::DuplicateKey(key.to_string()));
        }
        let history = Arc::new(Mutex::new(History::new(capacity)));
        targets.insert(key.to_string(), Arc::clone(&history));
        Ok(history)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.targets.lock().contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    /// Whether no key was added yet.
    pub fn is_empty(&self) -> bool {
        self.targets.lock().is_empty()
    }

    /// Statistics for every key with at least one recorded result.
    pub fn export(&self) -> Snapshot {
        self.targets
            .lock()
            .iter()
            .filter_map(|(key, history)| {
                let history = history.lock();
                (!history.is_empty()).then(|| (key.clone(), history.compute()))
            })
            .collect()
    }
}
