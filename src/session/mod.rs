/// Session state and authentication events
///
/// The session is never stored: it is derived from the credential store and
/// the last profile fetched for the current token.

pub mod manager;

pub use manager::{SessionManager, Subscription};

use serde::{Deserialize, Serialize};

/// Where an auth change originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// An explicit call in this context
    Local,
    /// A write observed from another context
    Remote,
}

/// Authentication change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub is_authenticated: bool,
    pub origin: EventOrigin,
}

impl AuthEvent {
    pub fn local(is_authenticated: bool) -> Self {
        Self {
            is_authenticated,
            origin: EventOrigin::Local,
        }
    }

    pub fn remote(is_authenticated: bool) -> Self {
        Self {
            is_authenticated,
            origin: EventOrigin::Remote,
        }
    }
}

/// Profile returned by `GET /users/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Everything else the server sends, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Name to show in a header
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("User")
    }
}

/// Derived session view
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
}
