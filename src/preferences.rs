//! Persisted per-user preferences, stored as a flat JSON object on disk.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Key of the "play a sound on new comment" toggle.
pub const NOTIFICATION_SOUND: &str = "notificationSound";

#[derive(Debug, Clone, Default)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl PreferenceStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring malformed preferences file");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read preferences file");
                Map::new()
            }
        };
        Self { path: Some(path), values }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.values.insert(key.to_string(), Value::Bool(value));
        self.save()
    }

    pub fn notification_sound(&self) -> bool {
        self.get_bool(NOTIFICATION_SOUND)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let raw = serde_json::to_string_pretty(&self.values)
            .map_err(|e| ClientError::Config(format!("cannot serialize preferences: {e}")))?;
        std::fs::write(path, raw)?;
        debug!(path = %path.display(), "preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_off() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::open(dir.path().join("prefs.json"));
        assert!(!store.notification_sound());
    }

    #[test]
    fn toggle_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let mut store = PreferenceStore::open(&path);
        store.set_bool(NOTIFICATION_SOUND, true).unwrap();
        assert!(PreferenceStore::open(&path).notification_sound());
    }

    #[test]
    fn malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(!PreferenceStore::open(&path).notification_sound());
    }

    #[test]
    fn in_memory_store_does_not_write() {
        let mut store = PreferenceStore::in_memory();
        store.set_bool(NOTIFICATION_SOUND, true).unwrap();
        assert!(store.notification_sound());
        assert!(store.path().is_none());
    }
}
