//! Remembered user preferences.
//!
//! The translator remembers one thing between sessions: the last target
//! language, under [`SELECTED_LANGUAGE_KEY`]. Storage sits behind
//! [`PreferenceStore`] so the backing can be swapped: an in-memory map for
//! tests and embedding, a JSON file for the CLI, or a browser cookie / server
//! session in a web front end.
//!
//! Writes overwrite. There is no merge and no history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Key under which the last resolved target language is stored.
pub const SELECTED_LANGUAGE_KEY: &str = "selected_language";

/// Failure to persist a preference.
#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Failed to write preferences to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key/value preference storage.
///
/// Implementations use interior mutability so a store can be shared behind
/// an `Arc` between the selector and whatever owns the session.
pub trait PreferenceStore: Send + Sync {
    /// Read a value. Missing keys and unreadable backings both yield `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a remembered language.
    pub fn with_language(language: impl Into<String>) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(SELECTED_LANGUAGE_KEY.to_string(), language.into());
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── JSON file ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(flatten)]
    values: BTreeMap<String, String>,
}

/// Store persisted as a flat JSON object on disk.
///
/// The file is read lazily on every `get` and rewritten atomically
/// (temp file + rename) on every `set`. A missing or malformed file reads as
/// empty.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/edgequake-translate/preferences.json`, or `None` when
    /// the platform has no config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("edgequake-translate").join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> PreferenceFile {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!("Ignoring malformed preferences file {}: {}", self.path.display(), e);
                PreferenceFile::default()
            }),
            Err(_) => PreferenceFile::default(),
        }
    }

    fn write_err(&self, source: std::io::Error) -> PreferenceError {
        PreferenceError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load().values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load();
        file.values.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| self.write_err(e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.write_err(e))?;

        debug!("Saved preference '{}' to {}", key, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(store.get(SELECTED_LANGUAGE_KEY), None);
        store.set(SELECTED_LANGUAGE_KEY, "French").unwrap();
        store.set(SELECTED_LANGUAGE_KEY, "Klingon").unwrap();
        assert_eq!(store.get(SELECTED_LANGUAGE_KEY).as_deref(), Some("Klingon"));
    }

    #[test]
    fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        FilePreferenceStore::new(&path)
            .set(SELECTED_LANGUAGE_KEY, "Tagalog")
            .unwrap();

        let reopened = FilePreferenceStore::new(&path);
        assert_eq!(reopened.get(SELECTED_LANGUAGE_KEY).as_deref(), Some("Tagalog"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_store_keeps_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs.json"));
        store.set("theme", "dark").unwrap();
        store.set(SELECTED_LANGUAGE_KEY, "Urdu").unwrap();
        assert_eq!(store.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json at all").unwrap();
        let store = FilePreferenceStore::new(&path);
        assert_eq!(store.get(SELECTED_LANGUAGE_KEY), None);
        store.set(SELECTED_LANGUAGE_KEY, "Polish").unwrap();
        assert_eq!(store.get(SELECTED_LANGUAGE_KEY).as_deref(), Some("Polish"));
    }
}
