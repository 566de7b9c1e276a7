//! Audit logging: every registry mutation emits a structured event.

use crate::error::RegistryError;
use crate::types::{KeyId, KeyStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Seed of the integrity chain.
pub const GENESIS_LABEL: &[u8] = b"bailiff-audit-genesis";

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    KeyRegistered,
    /// A revoked key was registered again. Device metadata was replaced.
    KeyReactivated { previous_device_name: String },
    KeyRevoked,
    /// Revoke of an already revoked key.
    RevokeNoop,
    RegistrationRejected { reason: String },
}

/// A structured audit event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub key_id: Option<KeyId>,
    pub device_name: Option<String>,
    /// Status of the row after the action.
    pub key_status: Option<KeyStatus>,
    pub action: AuditAction,
    /// Who or what triggered this.
    pub actor: String,
    pub success: bool,
    pub detail: Option<String>,
    /// Populated by `IntegrityChainSink`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// SHA-256 hex of the previous event's JSON; populated by `IntegrityChainSink`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
}

impl AuditEvent {
    pub fn key_event(key_id: &KeyId, key_status: KeyStatus, action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: Some(key_id.clone()),
            device_name: None,
            key_status: Some(key_status),
            action,
            actor: "system".into(),
            success: true,
            detail: None,
            sequence: None,
            prev_hash: None,
        }
    }

    /// A rejected request. The key id may be unknown if the key did not parse.
    pub fn rejection(key_id: Option<&KeyId>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: key_id.cloned(),
            device_name: None,
            key_status: None,
            action: AuditAction::RegistrationRejected {
                reason: reason.into(),
            },
            actor: "system".into(),
            success: false,
            detail: None,
            sequence: None,
            prev_hash: None,
        }
    }

    pub fn with_device(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = Some(device_name.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Audit sink trait
// ---------------------------------------------------------------------------

/// Where audit events go.
///
/// Synchronous; sinks that need async I/O should hand events to a channel.
pub trait AuditSinkSync: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Built-in sinks
// ---------------------------------------------------------------------------

/// Logs events via `tracing`.
pub struct TracingAuditSink;

impl AuditSinkSync for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "bailiff_registry::audit",
            timestamp = %event.timestamp,
            key_id = ?event.key_id,
            device_name = ?event.device_name,
            action = ?event.action,
            actor = %event.actor,
            success = event.success,
            detail = ?event.detail,
            "audit"
        );
    }
}

/// Collects events in memory.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for_key(&self, key_id: &KeyId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.key_id.as_ref() == Some(key_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSinkSync for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Appends one JSON event per line.
pub struct FileAuditSink {
    path: std::path::PathBuf,
    // Serializes appends from concurrent requests.
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl AuditSinkSync for FileAuditSink {
    fn record(&self, event: AuditEvent) {
        use std::io::Write;

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "audit serialize failed");
                return;
            }
        };

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", json) {
                    tracing::warn!(path = %self.path.display(), error = %e, "audit write failed");
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot open audit log");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Integrity chain sink (tamper-evident audit log)
// ---------------------------------------------------------------------------

/// Wraps any `AuditSinkSync` and adds a SHA-256 hash chain.
///
/// Each event gets a monotonic `sequence` and a `prev_hash` holding the hex
/// SHA-256 of the previous event's JSON. The first `prev_hash` is
/// `SHA-256("bailiff-audit-genesis")`. `verify_chain` replays a log.
pub struct IntegrityChainSink {
    inner: Arc<dyn AuditSinkSync>,
    state: Mutex<ChainState>,
}

struct ChainState {
    sequence: u64,
    prev_hash: String,
}

pub fn genesis_hash() -> String {
    hex::encode(Sha256::digest(GENESIS_LABEL))
}

fn event_hash(event: &AuditEvent) -> Option<String> {
    serde_json::to_string(event)
        .ok()
        .map(|json| hex::encode(Sha256::digest(json.as_bytes())))
}

impl IntegrityChainSink {
    pub fn new(inner: Arc<dyn AuditSinkSync>) -> Self {
        Self {
            inner,
            state: Mutex::new(ChainState {
                sequence: 0,
                prev_hash: genesis_hash(),
            }),
        }
    }

    /// Continue the chain already written to the JSON-lines log at `path`.
    ///
    /// The next event gets the last sequence plus one and links to the last
    /// event's hash. A missing or empty log starts at genesis. A log that no
    /// longer verifies is still extended from its last event, with a warning.
    pub fn resume(
        inner: Arc<dyn AuditSinkSync>,
        path: impl AsRef<Path>,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let events = read_log(path)?;
        let Some(last) = events.last() else {
            return Ok(Self::new(inner));
        };

        if let Err(index) = verify_chain(&events) {
            tracing::warn!(path = %path.display(), index, "existing audit chain does not verify");
        }
        let sequence = last.sequence.map_or(events.len() as u64, |s| s + 1);
        let prev_hash = event_hash(last)
            .ok_or_else(|| RegistryError::Storage("audit event does not serialize".into()))?;
        tracing::debug!(path = %path.display(), sequence, "resuming audit chain");

        Ok(Self {
            inner,
            state: Mutex::new(ChainState {
                sequence,
                prev_hash,
            }),
        })
    }
}

/// Every event in a JSON-lines audit log, in order. A missing file is empty.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>, RegistryError> {
    let path = path.as_ref();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RegistryError::Storage(format!("read audit log: {}", e))),
    };
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                RegistryError::Storage(format!("audit log {} line {}: {}", path.display(), i + 1, e))
            })
        })
        .collect()
}

impl AuditSinkSync for IntegrityChainSink {
    fn record(&self, mut event: AuditEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        event.sequence = Some(state.sequence);
        event.prev_hash = Some(state.prev_hash.clone());

        // Hash covers the full event, including sequence and prev_hash.
        if let Some(hash) = event_hash(&event) {
            state.prev_hash = hash;
        }
        state.sequence += 1;

        drop(state);
        self.inner.record(event);
    }
}

/// Check a chained log in order. Returns the index of the first event whose
/// sequence or `prev_hash` does not follow from its predecessor.
pub fn verify_chain(events: &[AuditEvent]) -> Result<(), usize> {
    let mut expected_prev = genesis_hash();
    for (i, event) in events.iter().enumerate() {
        if event.sequence != Some(i as u64) || event.prev_hash.as_deref() != Some(expected_prev.as_str()) {
            return Err(i);
        }
        expected_prev = event_hash(event).ok_or(i)?;
    }
    Ok(())
}
