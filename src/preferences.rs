/// Persisted UI preferences
use crate::{
    error::ClientResult,
    storage::{keys, StoreHandle},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Stored theme choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "system" => Ok(ThemeMode::System),
            other => Err(format!("unknown theme '{}'", other)),
        }
    }
}

/// Theme actually applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Clone)]
pub struct ThemePreference {
    store: StoreHandle,
}

impl ThemePreference {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Stored mode; missing or unreadable values fall back to `System`
    pub fn mode(&self) -> ThemeMode {
        match self.store.get(keys::THEME) {
            Ok(Some(value)) => value.parse().unwrap_or_else(|e| {
                debug!("Ignoring stored theme: {}", e);
                ThemeMode::System
            }),
            Ok(None) => ThemeMode::System,
            Err(e) => {
                debug!("Failed to read theme: {}", e);
                ThemeMode::System
            }
        }
    }

    pub fn set_mode(&self, mode: ThemeMode) -> ClientResult<()> {
        self.store.set(keys::THEME, mode.as_str())
    }

    /// Concrete theme given the platform preference
    pub fn resolve(&self, system_prefers_dark: bool) -> Theme {
        resolve(self.mode(), system_prefers_dark)
    }
}

pub fn resolve(mode: ThemeMode, system_prefers_dark: bool) -> Theme {
    match mode {
        ThemeMode::Light => Theme::Light,
        ThemeMode::Dark => Theme::Dark,
        ThemeMode::System if system_prefers_dark => Theme::Dark,
        ThemeMode::System => Theme::Light,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::sync::Arc;

    fn preference() -> (ThemePreference, StoreHandle) {
        let store = StoreHandle::new(Arc::new(MemoryBackend::new()));
        (ThemePreference::new(store.clone()), store)
    }

    #[test]
    fn test_defaults_to_system() {
        let (preference, store) = preference();
        assert_eq!(preference.mode(), ThemeMode::System);

        store.set(keys::THEME, "sepia").unwrap();
        assert_eq!(preference.mode(), ThemeMode::System);
    }

    #[test]
    fn test_set_and_resolve() {
        let (preference, _store) = preference();
        preference.set_mode(ThemeMode::Dark).unwrap();

        assert_eq!(preference.mode(), ThemeMode::Dark);
        assert_eq!(preference.resolve(false), Theme::Dark);
        assert_eq!(resolve(ThemeMode::System, true), Theme::Dark);
        assert_eq!(resolve(ThemeMode::System, false), Theme::Light);
    }
}
