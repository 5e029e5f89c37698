/// Disk-based storage backend
use crate::{
    error::{ClientError, ClientResult},
    storage::{ContextId, StorageBackend, StorageEvent, EVENT_BUFFER},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Disk storage backend
///
/// Keeps the whole store as one JSON object. Every write rewrites the file
/// through a temporary sibling and a rename so a crash never leaves a
/// half-written store behind.
pub struct DiskBackend {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl DiskBackend {
    /// Open (or create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> ClientResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ClientError::Storage(format!(
                        "Failed to create state directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }

        let entries = Self::read_file(&path)?;
        debug!("Opened state file {:?} with {} entries", path, entries.len());

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            events,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and publish changes made by other processes
    ///
    /// Differences are published with `ContextId::external()` as the source.
    pub fn reload(&self) -> ClientResult<usize> {
        let on_disk = Self::read_file(&self.path)?;
        let mut entries = self.entries.write();

        let mut changed = Vec::new();
        for (key, value) in &on_disk {
            let old_value = entries.get(key).cloned();
            if old_value.as_deref() != Some(value.as_str()) {
                changed.push(StorageEvent {
                    key: key.clone(),
                    old_value,
                    new_value: Some(value.clone()),
                    source: ContextId::external(),
                });
            }
        }
        for (key, value) in entries.iter() {
            if !on_disk.contains_key(key) {
                changed.push(StorageEvent {
                    key: key.clone(),
                    old_value: Some(value.clone()),
                    new_value: None,
                    source: ContextId::external(),
                });
            }
        }

        *entries = on_disk;
        let count = changed.len();
        for event in changed {
            let _ = self.events.send(event);
        }

        Ok(count)
    }

    fn read_file(path: &Path) -> ClientResult<HashMap<String, String>> {
        match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!("State file {:?} is corrupt, starting empty: {}", path, e);
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ClientError::Storage(format!(
                "Failed to read state file {:?}: {}",
                path, e
            ))),
        }
    }

    fn persist(&self, entries: &HashMap<String, String>) -> ClientResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("tmp");

        fs::write(&tmp_path, json).map_err(|e| {
            ClientError::Storage(format!("Failed to write state file {:?}: {}", tmp_path, e))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ClientError::Storage(format!("Failed to replace state file {:?}: {}", self.path, e))
        })?;

        Ok(())
    }
}

impl StorageBackend for DiskBackend {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, source: ContextId) -> ClientResult<()> {
        let mut entries = self.entries.write();
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }

        let old_value = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            // Keep memory and disk in agreement
            match &old_value {
                Some(previous) => entries.insert(key.to_string(), previous.clone()),
                None => entries.remove(key),
            };
            return Err(e);
        }

        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            old_value,
            new_value: Some(value.to_string()),
            source,
        });
        Ok(())
    }

    fn remove(&self, key: &str, source: ContextId) -> ClientResult<()> {
        let mut entries = self.entries.write();
        let Some(old_value) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), old_value);
            return Err(e);
        }

        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            old_value: Some(old_value),
            new_value: None,
            source,
        });
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}
