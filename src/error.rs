//! Unified error type for envelope operations.
//!
//! `Unwrap` and `Authentication` carry nothing beyond the stage that failed.

use thiserror::Error;

use crate::key_id::KeyId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// `seal` was called with an empty recipient set.
    #[error("no recipients: an envelope needs at least one wrapped session key")]
    NoRecipients,

    /// The envelope carries no wrapped key addressed to the opener.
    #[error("no wrapped key for recipient {key_id}")]
    RecipientNotFound { key_id: KeyId },

    /// The session key could not be recovered with the supplied private key.
    #[error("session key unwrap failed")]
    Unwrap,

    /// The authenticated cipher rejected the ciphertext, nonce or tag.
    #[error("authentication failed")]
    Authentication,

    /// Key material could not be parsed or encoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Envelope fields could not be decoded.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The OS random source failed.
    #[error("random source unavailable")]
    Random,
}

impl EnvelopeError {
    /// True for failures that retrying cannot fix.
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, Self::Unwrap | Self::Authentication)
    }
}
