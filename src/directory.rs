//! Recipient directory results and the seal plan derived from them.
//!
//! A directory lookup never throws: it reports `Found`, `Empty` or
//! `Unavailable`, and the sender branches on the resulting `SealPlan`.

use std::fmt;

use crate::error::EnvelopeError;
use crate::key_id::KeyId;
use crate::wrap::PublicKey;

/// A key the sender should seal for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub key_id: KeyId,
    pub public_key: PublicKey,
}

impl Recipient {
    /// Parse a PEM and derive its key id from the PEM text.
    pub fn from_pem(pem: &str) -> Result<Self, EnvelopeError> {
        Ok(Self {
            key_id: KeyId::for_public_key(pem),
            public_key: PublicKey::from_pem(pem)?,
        })
    }

    /// Parse a PEM but keep the key id the directory reported for it.
    pub fn with_key_id(key_id: KeyId, pem: &str) -> Result<Self, EnvelopeError> {
        Ok(Self {
            key_id,
            public_key: PublicKey::from_pem(pem)?,
        })
    }
}

/// Outcome of asking a directory for the active recipient set.
#[derive(Debug, Clone)]
pub enum DirectoryLookup {
    Found(Vec<Recipient>),
    Empty,
    /// The directory could not be reached or answered unusably.
    Unavailable(String),
}

/// Why a sender is using the legacy single-key shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoActiveKeys,
    DirectoryUnavailable(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveKeys => f.write_str("no active keys registered"),
            Self::DirectoryUnavailable(why) => write!(f, "key directory unavailable: {why}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SealPlan {
    Recipients(Vec<Recipient>),
    LegacyFallback(FallbackReason),
}

impl DirectoryLookup {
    /// `Found` with an empty list counts as `Empty`.
    pub fn into_plan(self) -> SealPlan {
        match self {
            Self::Found(list) if !list.is_empty() => SealPlan::Recipients(list),
            Self::Found(_) | Self::Empty => SealPlan::LegacyFallback(FallbackReason::NoActiveKeys),
            Self::Unavailable(why) => {
                SealPlan::LegacyFallback(FallbackReason::DirectoryUnavailable(why))
            }
        }
    }

    pub fn from_recipients(list: Vec<Recipient>) -> Self {
        if list.is_empty() {
            Self::Empty
        } else {
            Self::Found(list)
        }
    }
}
