//! Storage backends: where registry rows live.
//!
//! `create` is the uniqueness guard on `key_id`. Two concurrent creates for
//! the same id produce exactly one row; the other caller gets `Conflict`.

use crate::error::RegistryError;
use crate::types::{AuthorizedKey, KeyId};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::warn;

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Backend for persisting registry rows.
pub trait RegistryBackend: Send + Sync {
    fn get(&self, id: &KeyId) -> Result<Option<AuthorizedKey>, RegistryError>;
    /// Insert a new row. Fails with `Conflict` if `key_id` already exists.
    fn create(&self, row: &AuthorizedKey) -> Result<(), RegistryError>;
    /// Replace an existing row. Fails with `NotFound` if it does not exist.
    fn update(&self, row: &AuthorizedKey) -> Result<(), RegistryError>;
    fn list(&self) -> Result<Vec<AuthorizedKey>, RegistryError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory storage (for testing and ephemeral use).
pub struct InMemoryBackend {
    rows: RwLock<HashMap<KeyId, AuthorizedKey>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBackend for InMemoryBackend {
    fn get(&self, id: &KeyId) -> Result<Option<AuthorizedKey>, RegistryError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(id).cloned())
    }

    fn create(&self, row: &AuthorizedKey) -> Result<(), RegistryError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if rows.contains_key(&row.key_id) {
            return Err(RegistryError::Conflict(row.key_id.clone()));
        }
        rows.insert(row.key_id.clone(), row.clone());
        Ok(())
    }

    fn update(&self, row: &AuthorizedKey) -> Result<(), RegistryError> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        match rows.get_mut(&row.key_id) {
            Some(slot) => {
                *slot = row.clone();
                Ok(())
            }
            None => Err(RegistryError::NotFound(row.key_id.clone())),
        }
    }

    fn list(&self) -> Result<Vec<AuthorizedKey>, RegistryError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// File-based storage (one JSON file per key).
///
/// Directory layout:
/// ```text
/// keys/
///   {key_id}.json
/// ```
///
/// New rows are written to a temp file and published with a hard link, which
/// fails if the target exists; that is what makes `create` first-writer-wins
/// across processes sharing the directory. Updates use temp-then-rename.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| RegistryError::Storage(format!("create dir: {}", e)))?;
        Ok(Self { dir })
    }

    /// `None` for ids that could not have been derived from a key; they can
    /// never name a file here.
    fn key_path(&self, id: &KeyId) -> Option<PathBuf> {
        id.is_well_formed()
            .then(|| self.dir.join(format!("{}.json", id.as_str())))
    }

    fn temp_path(&self, id: &KeyId) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        self.dir.join(format!(
            ".{}.{}.{}.tmp",
            id.as_str(),
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    fn read_row(&self, path: &Path) -> Result<AuthorizedKey, RegistryError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Storage(format!("read: {}", e)))?;
        serde_json::from_str(&data)
            .map_err(|e| RegistryError::Storage(format!("parse {}: {}", path.display(), e)))
    }

    fn write_temp(&self, row: &AuthorizedKey) -> Result<PathBuf, RegistryError> {
        let json = serde_json::to_string_pretty(row)
            .map_err(|e| RegistryError::Storage(format!("serialize: {}", e)))?;
        let tmp = self.temp_path(&row.key_id);
        std::fs::write(&tmp, json)
            .map_err(|e| RegistryError::Storage(format!("write: {}", e)))?;
        Ok(tmp)
    }
}

fn malformed_id(id: &KeyId) -> RegistryError {
    RegistryError::InvalidRequest(format!("malformed key id: {}", id))
}

impl RegistryBackend for FileBackend {
    fn get(&self, id: &KeyId) -> Result<Option<AuthorizedKey>, RegistryError> {
        let Some(path) = self.key_path(id) else {
            return Ok(None);
        };
        match std::fs::metadata(&path) {
            Ok(_) => self.read_row(&path).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::Storage(format!("stat: {}", e))),
        }
    }

    fn create(&self, row: &AuthorizedKey) -> Result<(), RegistryError> {
        let path = self.key_path(&row.key_id).ok_or_else(|| malformed_id(&row.key_id))?;
        let tmp = self.write_temp(row)?;
        let linked = std::fs::hard_link(&tmp, &path);
        if let Err(e) = std::fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %e, "could not remove temp row");
        }
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(RegistryError::Conflict(row.key_id.clone()))
            }
            Err(e) => Err(RegistryError::Storage(format!("publish: {}", e))),
        }
    }

    fn update(&self, row: &AuthorizedKey) -> Result<(), RegistryError> {
        let path = self.key_path(&row.key_id).ok_or_else(|| malformed_id(&row.key_id))?;
        if !path.exists() {
            return Err(RegistryError::NotFound(row.key_id.clone()));
        }
        let tmp = self.write_temp(row)?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| RegistryError::Storage(format!("rename: {}", e)))
    }

    fn list(&self) -> Result<Vec<AuthorizedKey>, RegistryError> {
        let mut rows = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| RegistryError::Storage(format!("readdir: {}", e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::Storage(format!("entry: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                rows.push(self.read_row(&path)?);
            }
        }
        Ok(rows)
    }
}
