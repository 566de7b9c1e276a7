//! Core types: AuthorizedKey and the views handed to senders and admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use bailiff_envelope::KeyId;

// ---------------------------------------------------------------------------
// Key status
// ---------------------------------------------------------------------------

/// Registry state of a key row.
///
/// ```text
/// (unregistered) → ACTIVE ⇄ REVOKED
/// ```
///
/// Rows are never deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStatus::Active => write!(f, "ACTIVE"),
            KeyStatus::Revoked => write!(f, "REVOKED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One recipient identity, as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedKey {
    /// Derived from `public_key`; unique across all rows.
    pub key_id: KeyId,
    /// SPKI PEM text exactly as registered.
    pub public_key: String,
    pub device_name: String,
    pub owner_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Last registration, reactivation or revocation.
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AuthorizedKey {
    pub fn status(&self) -> KeyStatus {
        if self.is_active {
            KeyStatus::Active
        } else {
            KeyStatus::Revoked
        }
    }
}

/// Input to `Registry::register`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub public_key: String,
    pub device_name: String,
    #[serde(default)]
    pub owner_email: Option<String>,
}

impl RegisterRequest {
    pub fn new(public_key: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            device_name: device_name.into(),
            owner_email: None,
        }
    }

    pub fn with_owner_email(mut self, email: impl Into<String>) -> Self {
        self.owner_email = Some(email.into());
        self
    }
}

/// A current recipient: what a sender must seal for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveKey {
    pub key_id: KeyId,
    pub public_key: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuthorizedKey> for ActiveKey {
    fn from(k: AuthorizedKey) -> Self {
        Self {
            key_id: k.key_id,
            public_key: k.public_key,
            device_name: k.device_name,
            owner_email: k.owner_email,
            created_at: k.created_at,
        }
    }
}

/// Administrative listing entry. Carries no key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub key_id: KeyId,
    pub device_name: String,
    pub owner_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AuthorizedKey> for KeySummary {
    fn from(k: AuthorizedKey) -> Self {
        Self {
            key_id: k.key_id,
            device_name: k.device_name,
            owner_email: k.owner_email,
            is_active: k.is_active,
            created_at: k.created_at,
        }
    }
}

/// What `Registry::seed` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    Reactivated,
    AlreadyActive,
}
