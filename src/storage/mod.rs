/// Client-local persistent key-value storage
///
/// Every execution context (a tab, a CLI invocation, a test "browser") owns a
/// `StoreHandle` onto a shared backend. Writes are published to all handles
/// tagged with the writing context, so a context can tell its own writes
/// from writes made elsewhere.

pub mod disk;
pub mod memory;
pub mod store;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;
pub use store::{Credential, CredentialStore, RemoteChange, RemoteChanges, StoreHandle};

use crate::error::ClientResult;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Well-known storage keys
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const THEME: &str = "theme";
    pub const REDIRECT_AFTER_LOGIN: &str = "redirect_after_login";
}

/// Capacity of the change-notification channel per backend
pub(crate) const EVENT_BUFFER: usize = 64;

/// Identifies the execution context that performed a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Fresh id for a new context
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Writes made outside this process (picked up by `DiskBackend::reload`)
    pub const fn external() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single observed mutation of the store
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub source: ContextId,
}

/// Storage backend trait
///
/// Implementations publish a `StorageEvent` for every write that changes a
/// value. Writes that leave the value unchanged publish nothing.
pub trait StorageBackend: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> ClientResult<Option<String>>;

    /// Write a value on behalf of `source`
    fn set(&self, key: &str, value: &str, source: ContextId) -> ClientResult<()>;

    /// Remove a value on behalf of `source`
    fn remove(&self, key: &str, source: ContextId) -> ClientResult<()>;

    /// Subscribe to all mutations, regardless of source
    fn watch(&self) -> broadcast::Receiver<StorageEvent>;
}
