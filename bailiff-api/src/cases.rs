//! Received cases. Envelopes are stored exactly as submitted; nothing here
//! ever sees plaintext.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use bailiff_envelope::{Envelope, EnvelopeShape, KeyId, WrappedKeys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CaseId = i64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaseStoreError {
    #[error("case {0} not found")]
    NotFound(CaseId),

    #[error("case storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCase {
    pub case_name: String,
    pub file_name: String,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub id: CaseId,
    pub case_name: String,
    pub file_name: String,
    pub envelope: Envelope,
    pub received_at: DateTime<Utc>,
}

/// Listing view: metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub id: CaseId,
    pub case_name: String,
    pub file_name: String,
    pub content_digest: String,
    pub shape: EnvelopeShape,
    pub recipients: Vec<KeyId>,
    pub received_at: DateTime<Utc>,
}

impl From<&CaseRecord> for CaseSummary {
    fn from(r: &CaseRecord) -> Self {
        Self {
            id: r.id,
            case_name: r.case_name.clone(),
            file_name: r.file_name.clone(),
            content_digest: r.envelope.content_digest.clone(),
            shape: r.envelope.wrapped_keys.shape(),
            recipients: r.envelope.wrapped_keys.key_ids(),
            received_at: r.received_at,
        }
    }
}

pub trait CaseStore: Send + Sync {
    fn insert(&self, case: NewCase) -> Result<CaseId, CaseStoreError>;
    fn get(&self, id: CaseId) -> Result<Option<CaseRecord>, CaseStoreError>;
    /// Newest first.
    fn list(&self) -> Result<Vec<CaseRecord>, CaseStoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCaseStore {
    cases: RwLock<BTreeMap<CaseId, CaseRecord>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaseStore for InMemoryCaseStore {
    fn insert(&self, case: NewCase) -> Result<CaseId, CaseStoreError> {
        let mut cases = self.cases.write().unwrap_or_else(PoisonError::into_inner);
        let id = cases.keys().next_back().map_or(1, |last| last + 1);
        cases.insert(id, record(id, case));
        Ok(id)
    }

    fn get(&self, id: CaseId) -> Result<Option<CaseRecord>, CaseStoreError> {
        let cases = self.cases.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cases.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<CaseRecord>, CaseStoreError> {
        let cases = self.cases.read().unwrap_or_else(PoisonError::into_inner);
        Ok(cases.values().rev().cloned().collect())
    }
}

fn record(id: CaseId, case: NewCase) -> CaseRecord {
    CaseRecord {
        id,
        case_name: case.case_name,
        file_name: case.file_name,
        envelope: case.envelope,
        received_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// On-disk row. The wrapped keys live in a single string column, the way
/// older receivers stored them, so both envelope shapes share one layout.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseRow {
    id: CaseId,
    case_name: String,
    file_name: String,
    encrypted_file: String,
    encrypted_key: String,
    iv: String,
    auth_tag: String,
    hash: String,
    received_at: DateTime<Utc>,
}

impl CaseRow {
    fn from_record(r: &CaseRecord) -> Result<Self, CaseStoreError> {
        let encrypted_key = r
            .envelope
            .wrapped_keys
            .to_column()
            .map_err(|e| CaseStoreError::Storage(e.to_string()))?;
        // Reuse the envelope's own field encodings.
        let fields = serde_json::to_value(&r.envelope)
            .map_err(|e| CaseStoreError::Storage(e.to_string()))?;
        let field = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| CaseStoreError::Storage(format!("envelope field {name} missing")))
        };
        Ok(Self {
            id: r.id,
            case_name: r.case_name.clone(),
            file_name: r.file_name.clone(),
            encrypted_file: field("ciphertext")?,
            encrypted_key,
            iv: field("nonce")?,
            auth_tag: field("authTag")?,
            hash: r.envelope.content_digest.clone(),
            received_at: r.received_at,
        })
    }

    fn into_record(self) -> Result<CaseRecord, CaseStoreError> {
        let wrapped_keys = WrappedKeys::from_column(&self.encrypted_key)
            .map_err(|e| CaseStoreError::Storage(format!("case {}: {e}", self.id)))?;
        let envelope: Envelope = serde_json::from_value(serde_json::json!({
            "ciphertext": self.encrypted_file,
            "wrappedKeys": wrapped_keys,
            "nonce": self.iv,
            "authTag": self.auth_tag,
            "contentDigest": self.hash,
        }))
        .map_err(|e| CaseStoreError::Storage(format!("case {}: {e}", self.id)))?;
        Ok(CaseRecord {
            id: self.id,
            case_name: self.case_name,
            file_name: self.file_name,
            envelope,
            received_at: self.received_at,
        })
    }
}

/// One JSON file per case: `cases/{id}.json`.
pub struct FileCaseStore {
    dir: PathBuf,
    // Guards id allocation; holds the last id handed out.
    next: Mutex<CaseId>,
}

impl FileCaseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CaseStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| CaseStoreError::Storage(format!("create dir: {e}")))?;
        let last = case_files(&dir)?.into_iter().map(|(id, _)| id).max().unwrap_or(0);
        tracing::debug!(dir = %dir.display(), last_id = last, "case store opened");
        Ok(Self {
            dir,
            next: Mutex::new(last),
        })
    }

    fn path(&self, id: CaseId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read(path: &Path) -> Result<CaseRecord, CaseStoreError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| CaseStoreError::Storage(format!("read {}: {e}", path.display())))?;
        let row: CaseRow = serde_json::from_str(&data)
            .map_err(|e| CaseStoreError::Storage(format!("parse {}: {e}", path.display())))?;
        row.into_record()
    }
}

fn case_files(dir: &Path) -> Result<Vec<(CaseId, PathBuf)>, CaseStoreError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| CaseStoreError::Storage(format!("readdir: {e}")))?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| CaseStoreError::Storage(format!("entry: {e}")))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<CaseId>().ok())
        {
            out.push((id, path));
        }
    }
    Ok(out)
}

impl CaseStore for FileCaseStore {
    fn insert(&self, case: NewCase) -> Result<CaseId, CaseStoreError> {
        let mut last = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *last + 1;
        let row = CaseRow::from_record(&record(id, case))?;
        let json = serde_json::to_string_pretty(&row)
            .map_err(|e| CaseStoreError::Storage(format!("serialize: {e}")))?;

        let tmp = self.dir.join(format!(".{id}.{}.tmp", std::process::id()));
        std::fs::write(&tmp, json).map_err(|e| CaseStoreError::Storage(format!("write: {e}")))?;
        std::fs::rename(&tmp, self.path(id))
            .map_err(|e| CaseStoreError::Storage(format!("rename: {e}")))?;

        *last = id;
        Ok(id)
    }

    fn get(&self, id: CaseId) -> Result<Option<CaseRecord>, CaseStoreError> {
        let path = self.path(id);
        match std::fs::metadata(&path) {
            Ok(_) => Self::read(&path).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CaseStoreError::Storage(format!("stat: {e}"))),
        }
    }

    fn list(&self) -> Result<Vec<CaseRecord>, CaseStoreError> {
        let mut files = case_files(&self.dir)?;
        files.sort_by(|a, b| b.0.cmp(&a.0));
        files.iter().map(|(_, path)| Self::read(path)).collect()
    }
}
