//! Local persisted key-value store shared by the surfaces of one profile.
//!
//! [`MemoryStore`] is shared in process through an `Arc`; [`FileStore`]
//! keeps one JSON document per key in a state directory so separate
//! processes of the same profile see each other's writes.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SyncError;

/// Key under which the timer anchor record is stored.
pub const TIMER_ANCHOR_KEY: &str = "tableclock.timer_anchor";
/// Key under which the room-state snapshot is stored.
pub const ROOM_STATE_KEY: &str = "tableclock.room_state";
/// Key under which the active event id is stored.
pub const ACTIVE_EVENT_KEY: &str = "tableclock.active_event";

/// String key-value storage.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, SyncError>;

    /// Writes a value.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), SyncError>;

    /// Deletes a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), SyncError>;
}

/// Reads and decodes a JSON value.
///
/// Missing keys, unreadable backends and corrupt documents all read as
/// `None`; the latter two are logged so the surface falls back to its
/// safe default instead of failing.
pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(key, error = %e, "local store read failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed local record");
            None
        }
    }
}

/// Encodes and writes a JSON value.
///
/// # Errors
///
/// Returns [`SyncError::Storage`] on encode or write failure.
pub fn write_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), SyncError> {
    let raw = serde_json::to_string(value).map_err(|e| SyncError::Storage(e.to_string()))?;
    store.set(key, &raw)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SyncError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SyncError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a state directory.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SyncError::Storage(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// State directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, SyncError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid || key.starts_with('.') {
            return Err(SyncError::Storage(format!("invalid key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SyncError> {
        let path = self.path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Storage(format!("{}: {e}", path.display()))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SyncError> {
        let path = self.path(key)?;
        // Readers in other processes must never observe a half-written file.
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, value)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                SyncError::Storage(format!("{}: {e}", path.display()))
            })
    }

    fn remove(&self, key: &str) -> Result<(), SyncError> {
        let path = self.path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Storage(format!("{}: {e}", path.display()))),
        }
    }
}
