//! Error types for the registry.

use thiserror::Error;

use crate::types::KeyId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The key is already registered and active.
    #[error("key already registered: {0}")]
    Conflict(KeyId),

    #[error("key not found: {0}")]
    NotFound(KeyId),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),
}
