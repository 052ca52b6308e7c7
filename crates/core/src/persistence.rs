//! Bridges the in-memory forest to a key-value settings store.

use std::collections::HashMap;
use std::rc::Rc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::Task;

/// Settings key holding the whole serialized forest.
pub const TASKS_KEY: &str = "savedTasks_v2";

/// Byte-oriented key-value store provided by the environment.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for &T {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}

/// In-process settings store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().get(key).cloned()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

pub fn encode_forest(tasks: &[Task]) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(tasks).map_err(|source| StorageError::Encode {
        key: TASKS_KEY.to_string(),
        source,
    })
}

pub fn decode_forest(bytes: &[u8]) -> Result<Vec<Task>, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Decode {
        key: TASKS_KEY.to_string(),
        source,
    })
}

/// Best-effort persistence: failures are logged and never reach the caller.
#[derive(Debug)]
pub struct PersistenceBridge<S> {
    settings: S,
}

impl<S: SettingsStore> PersistenceBridge<S> {
    pub fn new(settings: S) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Returns whether the forest reached the store.
    pub fn save(&self, tasks: &[Task]) -> bool {
        let result = encode_forest(tasks).and_then(|bytes| self.settings.set(TASKS_KEY, &bytes));
        match result {
            Ok(()) => {
                debug!(roots = tasks.len(), "persisted task forest");
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to save tasks");
                false
            }
        }
    }

    /// Loads the saved forest; missing or unreadable data yields an empty forest.
    pub fn load(&self) -> Vec<Task> {
        let bytes = match self.settings.get(TASKS_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(error = %err, "failed to read saved tasks");
                return Vec::new();
            }
        };
        match decode_forest(&bytes) {
            Ok(tasks) => {
                debug!(roots = tasks.len(), "loaded task forest");
                tasks
            }
            Err(err) => {
                warn!(error = %err, "failed to load tasks");
                Vec::new()
            }
        }
    }
}
