//! Key identity: a short, stable identifier derived from a public key's PEM text.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 of the encoded key.
pub const KEY_ID_HEX_LEN: usize = 16;

/// Identifier of one recipient key. Equal PEM text always yields an equal id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Derive the id for an encoded public key.
    pub fn for_public_key(encoded: &str) -> Self {
        let full = hex::encode(Sha256::digest(encoded.as_bytes()));
        Self(full[..KEY_ID_HEX_LEN].to_string())
    }

    /// Wrap an id received from elsewhere (a directory response, a URL path).
    /// No validation: unknown ids simply never match.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this looks like an id this crate would derive.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == KEY_ID_HEX_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for KeyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
