//! Session-key wrapping: RSA-OAEP with SHA-256.

use std::fmt;

use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::aead::AES_KEY_BYTES;
use crate::error::EnvelopeError;

/// Modulus size for generated key pairs.
pub const RSA_MODULUS_BITS: usize = 2048;

/// A recipient public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

/// A long-lived private key. Zeroized on drop by `rsa`.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

/// Public and private halves of one identity.
#[derive(Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl PublicKey {
    /// Parse SPKI PEM (`BEGIN PUBLIC KEY`). PKCS#1 (`BEGIN RSA PUBLIC KEY`) is
    /// also accepted.
    pub fn from_pem(pem: &str) -> Result<Self, EnvelopeError> {
        let pem = pem.trim();
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(Self)
            .map_err(|e| EnvelopeError::InvalidKey(format!("public key PEM: {e}")))
    }

    /// SPKI PEM with LF line endings.
    pub fn to_pem(&self) -> Result<String, EnvelopeError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| EnvelopeError::InvalidKey(format!("encode public key: {e}")))
    }

    /// Wrap a session key for this recipient. OAEP is randomized, so wrapping
    /// the same key twice gives different outputs.
    pub fn wrap(&self, session_key: &[u8; AES_KEY_BYTES]) -> Result<Vec<u8>, EnvelopeError> {
        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), session_key)
            .map_err(|e| EnvelopeError::InvalidKey(format!("wrap: {e}")))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use rsa::traits::PublicKeyParts;
        f.debug_struct("PublicKey")
            .field("bits", &(self.0.size() * 8))
            .finish()
    }
}

impl PrivateKey {
    /// Parse PKCS#8 PEM.
    pub fn from_pem(pem: &str) -> Result<Self, EnvelopeError> {
        RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map(Self)
            .map_err(|e| EnvelopeError::InvalidKey(format!("private key PEM: {e}")))
    }

    pub fn to_pem(&self) -> Result<Zeroizing<String>, EnvelopeError> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| EnvelopeError::InvalidKey(format!("encode private key: {e}")))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// Recover a session key. Any failure, including a result of the wrong
    /// length, is `Unwrap`.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>, EnvelopeError> {
        let raw = Zeroizing::new(
            self.0
                .decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| EnvelopeError::Unwrap)?,
        );
        if raw.len() != AES_KEY_BYTES {
            return Err(EnvelopeError::Unwrap);
        }
        let mut key = Zeroizing::new([0u8; AES_KEY_BYTES]);
        key.copy_from_slice(&raw);
        Ok(key)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

impl KeyPair {
    /// Generate a fresh pair at `RSA_MODULUS_BITS`.
    pub fn generate() -> Result<Self, EnvelopeError> {
        Self::generate_with_bits(RSA_MODULUS_BITS)
    }

    /// Generate with an explicit modulus size. Smaller sizes are for tests.
    pub fn generate_with_bits(bits: usize) -> Result<Self, EnvelopeError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| EnvelopeError::InvalidKey(format!("generate: {e}")))?;
        Ok(Self::from_private(PrivateKey(private)))
    }

    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: private.public_key(),
            private,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
