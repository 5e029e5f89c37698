/// Clipboard access
use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clipboard trait
pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> ClientResult<()>;
}

/// The desktop clipboard via `arboard`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> ClientResult<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClientError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|e| ClientError::Clipboard(e.to_string()))
    }
}

/// In-process clipboard for headless runs
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
    unavailable: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clipboard whose writes always fail
    pub fn unavailable() -> Self {
        let clipboard = Self::default();
        clipboard.unavailable.store(true, Ordering::SeqCst);
        clipboard
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&self, text: &str) -> ClientResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClientError::Clipboard("clipboard unavailable".to_string()));
        }
        *self.contents.lock() = Some(text.to_string());
        Ok(())
    }
}
