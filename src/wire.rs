//! Envelope wire format (JSON).
//!
//! ```text
//! {
//!   "ciphertext":    base64,
//!   "wrappedKeys":   base64 | [{"keyId": hex16, "wrappedKey": base64}, ...],
//!   "nonce":         hex (12 bytes),
//!   "authTag":       hex (16 bytes),
//!   "contentDigest": hex (SHA-256 of the plaintext)
//! }
//! ```
//!
//! Older senders use `encryptedFile`, `encryptedKey`, `iv` and `hash`; those
//! names are accepted on input and never produced.

use serde::{Deserialize, Serialize};

use crate::aead::{AEAD_TAG_BYTES, NONCE_BYTES};
use crate::error::EnvelopeError;
use crate::hasher;
use crate::key_id::KeyId;

/// One session key, wrapped for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey(#[serde(with = "b64")] pub Vec<u8>);

/// A wrapped key addressed to a known key id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientKey {
    pub key_id: KeyId,
    #[serde(alias = "encryptedKey")]
    pub wrapped_key: WrappedKey,
}

/// The two shapes a wrapped-key field can take. Decided once when the JSON is
/// read; nothing downstream inspects the raw form again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WrappedKeys {
    /// A bare wrapped key with no key id, implicitly for the receiver.
    Legacy(WrappedKey),
    /// One entry per recipient, in the order they were supplied to `seal`.
    MultiRecipient(Vec<RecipientKey>),
}

impl WrappedKeys {
    /// Parse a single-string storage column: a JSON array of recipient
    /// entries is multi-recipient, anything else is a legacy base64 value.
    pub fn from_column(column: &str) -> Result<Self, EnvelopeError> {
        let trimmed = column.trim();
        if trimmed.starts_with('[') {
            if let Ok(list) = serde_json::from_str::<Vec<RecipientKey>>(trimmed) {
                return Ok(Self::MultiRecipient(list));
            }
        }
        b64::decode(trimmed)
            .map(|bytes| Self::Legacy(WrappedKey(bytes)))
            .map_err(|_| EnvelopeError::Malformed("wrapped key column is neither a recipient list nor base64".into()))
    }

    /// Inverse of `from_column`.
    pub fn to_column(&self) -> Result<String, EnvelopeError> {
        match self {
            Self::Legacy(key) => Ok(b64::encode(&key.0)),
            Self::MultiRecipient(list) => serde_json::to_string(list)
                .map_err(|e| EnvelopeError::Malformed(e.to_string())),
        }
    }

    pub fn shape(&self) -> EnvelopeShape {
        match self {
            Self::Legacy(_) => EnvelopeShape::Legacy,
            Self::MultiRecipient(_) => EnvelopeShape::MultiRecipient,
        }
    }

    /// Key ids present in a multi-recipient envelope; empty for legacy.
    pub fn key_ids(&self) -> Vec<KeyId> {
        match self {
            Self::Legacy(_) => Vec::new(),
            Self::MultiRecipient(list) => list.iter().map(|r| r.key_id.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Legacy(_) => 1,
            Self::MultiRecipient(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeShape {
    Legacy,
    MultiRecipient,
}

impl EnvelopeShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::MultiRecipient => "multi-recipient",
        }
    }
}

/// One encrypted document. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(with = "b64", alias = "encryptedFile")]
    pub ciphertext: Vec<u8>,
    #[serde(alias = "encryptedKey", alias = "encryptedKeys")]
    pub wrapped_keys: WrappedKeys,
    #[serde(with = "hex_bytes", alias = "iv")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub auth_tag: Vec<u8>,
    #[serde(alias = "hash")]
    pub content_digest: String,
}

impl Envelope {
    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string_pretty(self).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Structural checks run when an envelope is accepted for storage.
    /// Cryptographic checks happen only when it is opened.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.wrapped_keys.is_empty() {
            return Err(EnvelopeError::NoRecipients);
        }
        if self.nonce.len() != NONCE_BYTES {
            return Err(EnvelopeError::Malformed(format!(
                "nonce must be {NONCE_BYTES} bytes, got {}",
                self.nonce.len()
            )));
        }
        if self.auth_tag.len() != AEAD_TAG_BYTES {
            return Err(EnvelopeError::Malformed(format!(
                "auth tag must be {AEAD_TAG_BYTES} bytes, got {}",
                self.auth_tag.len()
            )));
        }
        if !hasher::is_digest_hex(&self.content_digest) {
            return Err(EnvelopeError::Malformed("content digest is not SHA-256 hex".into()));
        }
        Ok(())
    }

    /// Metadata view without key material.
    pub fn summary(&self) -> EnvelopeSummary {
        EnvelopeSummary {
            shape: self.wrapped_keys.shape(),
            recipients: self.wrapped_keys.key_ids(),
            wrapped_key_count: self.wrapped_keys.len(),
            ciphertext_bytes: self.ciphertext.len(),
            content_digest: self.content_digest.clone(),
        }
    }
}

/// Result of `Envelope::summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub shape: EnvelopeShape,
    pub recipients: Vec<KeyId>,
    pub wrapped_key_count: usize,
    pub ciphertext_bytes: usize,
    pub content_digest: String,
}

/// Body of a submit request: case metadata plus the envelope fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSubmission {
    pub case_name: String,
    pub file_name: String,
    #[serde(flatten)]
    pub envelope: Envelope,
}

pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(s.trim())
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        decode(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}
