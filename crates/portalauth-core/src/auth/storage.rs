use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directory name under the platform data dir for file-backed sessions
const APP_NAME: &str = "portalauth";

/// Where a portal's session blob lives between runs.
///
/// Backends move an opaque string; the session store owns the format.
pub trait SessionStorage: Send + Sync {
    /// Stored blob, or `None` if nothing has been saved.
    fn load(&self) -> Result<Option<String>>;

    fn save(&self, blob: &str) -> Result<()>;

    /// Remove the blob. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

impl<S: SessionStorage + ?Sized> SessionStorage for Box<S> {
    fn load(&self) -> Result<Option<String>> {
        (**self).load()
    }

    fn save(&self, blob: &str) -> Result<()> {
        (**self).save(blob)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// The persisted subset of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession<T> {
    pub access_token: Option<String>,
    pub identity: Option<T>,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl<T> PersistedSession<T> {
    pub fn new(access_token: Option<String>, identity: Option<T>) -> Self {
        Self {
            access_token,
            identity,
            saved_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.identity.is_none()
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local storage. Clones share the same slot, so a second store
/// built on a clone sees what the first one saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with a blob.
    pub fn with_blob(blob: &str) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(blob.to_string()))),
        }
    }

    pub fn blob(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.blob())
    }

    fn save(&self, blob: &str) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(blob.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

/// One JSON file per storage key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf, storage_key: &str) -> Self {
        Self {
            path: dir.join(format!("{}.json", storage_key)),
        }
    }

    /// Storage under the platform data directory, e.g.
    /// `~/.local/share/portalauth/<storage_key>.json`.
    pub fn in_data_dir(storage_key: &str) -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(Self::new(data_dir.join(APP_NAME), storage_key))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        Ok(Some(contents))
    }

    fn save(&self, blob: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, blob)
            .with_context(|| format!("Failed to write session file {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).with_context(|| {
                format!("Failed to remove session file {}", self.path.display())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("portalauth-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_memory_clones_share_slot() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.save("{}").unwrap();
        assert_eq!(other.load().unwrap().as_deref(), Some("{}"));
        other.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_roundtrip_and_clear() {
        let dir = temp_dir("file-roundtrip");
        let storage = FileStorage::new(dir.clone(), "admin-auth");
        assert!(storage.load().unwrap().is_none());

        storage.save(r#"{"access_token":"abc"}"#).unwrap();
        assert!(storage.path().ends_with("admin-auth.json"));
        assert_eq!(
            storage.load().unwrap().as_deref(),
            Some(r#"{"access_token":"abc"}"#)
        );

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        // Clearing twice is fine
        storage.clear().unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_persisted_session_defaults_saved_at() {
        let parsed: PersistedSession<serde_json::Value> =
            serde_json::from_str(r#"{"access_token":"abc","identity":null}"#).unwrap();
        assert_eq!(parsed.access_token.as_deref(), Some("abc"));
        assert!(parsed.identity.is_none());
        assert!(!parsed.is_empty());
    }
}
