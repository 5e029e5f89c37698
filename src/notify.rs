/// User-visible transient notifications ("toasts")
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

const NOTIFICATION_BUFFER: usize = 128;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// A single toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Fan-out point for notifications
///
/// Every notification is logged and forwarded to whatever presentation layer
/// subscribed. Publishing with no subscriber is not an error.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self { sender }
    }

    /// Receive every notification published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotificationLevel::Error => error!(target: "umber_client::toast", "{}", message),
            _ => info!(target: "umber_client::toast", "{}", message),
        }
        let _ = self.sender.send(Notification { level, message });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Error, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Info, message);
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
