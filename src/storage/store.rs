/// Per-context store handles and the credential store
use crate::{
    error::ClientResult,
    storage::{keys, ContextId, StorageBackend, StorageEvent},
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// One execution context's view of a shared backend
#[derive(Clone)]
pub struct StoreHandle {
    backend: Arc<dyn StorageBackend>,
    context: ContextId,
}

impl StoreHandle {
    /// Attach a new context to `backend`
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            context: ContextId::new(),
        }
    }

    /// A second context on the same backend (another tab)
    pub fn fork(&self) -> Self {
        Self::new(Arc::clone(&self.backend))
    }

    /// Id stamped on every write made through this handle
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn get(&self, key: &str) -> ClientResult<Option<String>> {
        self.backend.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.backend.set(key, value, self.context)
    }

    pub fn remove(&self, key: &str) -> ClientResult<()> {
        self.backend.remove(key, self.context)
    }

    /// Stream of writes made by every other context
    pub fn remote_changes(&self) -> RemoteChanges {
        RemoteChanges {
            rx: self.backend.watch(),
            context: self.context,
        }
    }
}

/// What a context learns from its remote-change stream
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    /// A write made by another context
    Changed(StorageEvent),
    /// Events were dropped; re-read whatever state you derive
    Resync,
}

/// Filtered view of a backend's change stream
///
/// Writes made by the owning context are skipped.
pub struct RemoteChanges {
    rx: broadcast::Receiver<StorageEvent>,
    context: ContextId,
}

impl RemoteChanges {
    /// Wait for the next remote change; `None` once the backend is gone
    pub async fn next(&mut self) -> Option<RemoteChange> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.context => continue,
                Ok(event) => return Some(RemoteChange::Changed(event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Storage change stream lagged by {} events", skipped);
                    return Some(RemoteChange::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Access and refresh token pair
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Persisted credential store
///
/// Writes are crate-private: only the session manager mutates tokens.
#[derive(Clone)]
pub struct CredentialStore {
    store: StoreHandle,
}

impl CredentialStore {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Underlying handle
    pub fn handle(&self) -> &StoreHandle {
        &self.store
    }

    pub fn access_token(&self) -> ClientResult<Option<String>> {
        self.store.get(keys::ACCESS_TOKEN)
    }

    pub fn credential(&self) -> ClientResult<Credential> {
        Ok(Credential {
            access_token: self.store.get(keys::ACCESS_TOKEN)?,
            refresh_token: self.store.get(keys::REFRESH_TOKEN)?,
        })
    }

    pub(crate) fn set(&self, access_token: &str, refresh_token: Option<&str>) -> ClientResult<()> {
        self.store.set(keys::ACCESS_TOKEN, access_token)?;
        match refresh_token {
            Some(refresh) => self.store.set(keys::REFRESH_TOKEN, refresh),
            None => self.store.remove(keys::REFRESH_TOKEN),
        }
    }

    pub(crate) fn clear(&self) -> ClientResult<()> {
        self.store.remove(keys::ACCESS_TOKEN)?;
        self.store.remove(keys::REFRESH_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    #[tokio::test]
    async fn test_remote_changes_skip_own_writes() {
        let tab_a = StoreHandle::new(Arc::new(MemoryBackend::new()));
        let tab_b = tab_a.fork();
        let mut changes = tab_a.remote_changes();

        tab_a.set("theme", "dark").unwrap();
        tab_b.set("theme", "light").unwrap();

        match changes.next().await {
            Some(RemoteChange::Changed(event)) => {
                assert_eq!(event.source, tab_b.context());
                assert_eq!(event.new_value.as_deref(), Some("light"));
            }
            other => panic!("unexpected change: {:?}", other),
        }
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential {
            access_token: Some("secret-access".to_string()),
            refresh_token: None,
        };
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("secret-access"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_set_without_refresh_clears_old_refresh() {
        let creds = CredentialStore::new(StoreHandle::new(Arc::new(MemoryBackend::new())));
        creds.set("a1", Some("r1")).unwrap();
        creds.set("a2", None).unwrap();

        let credential = creds.credential().unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("a2"));
        assert_eq!(credential.refresh_token, None);
    }
}
