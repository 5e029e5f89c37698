/// In-memory storage backend
use crate::{
    error::ClientResult,
    storage::{ContextId, StorageBackend, StorageEvent, EVENT_BUFFER},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Volatile backend, shared by every handle that holds it
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn publish(&self, event: StorageEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, source: ContextId) -> ClientResult<()> {
        let mut entries = self.entries.write();
        let old_value = entries.insert(key.to_string(), value.to_string());
        if old_value.as_deref() != Some(value) {
            self.publish(StorageEvent {
                key: key.to_string(),
                old_value,
                new_value: Some(value.to_string()),
                source,
            });
        }
        Ok(())
    }

    fn remove(&self, key: &str, source: ContextId) -> ClientResult<()> {
        let mut entries = self.entries.write();
        if let Some(old_value) = entries.remove(key) {
            self.publish(StorageEvent {
                key: key.to_string(),
                old_value: Some(old_value),
                new_value: None,
                source,
            });
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}
