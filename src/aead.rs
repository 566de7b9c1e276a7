//! AEAD: AES-256-GCM with a detached tag.
//!
//! A `SessionKey` owns both the key and the nonce. The only way to get one for
//! encryption is `SessionKey::generate`, so a (key, nonce) pair is never used
//! for more than one document.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::EnvelopeError;

pub const AES_KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;

/// One-time symmetric key material for a single envelope.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; AES_KEY_BYTES],
    nonce: [u8; NONCE_BYTES],
}

/// Output of `SessionKey::seal`.
#[derive(Debug, Clone)]
pub struct SealedBody {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; AEAD_TAG_BYTES],
}

impl SessionKey {
    /// Fresh key and nonce from the OS RNG.
    pub fn generate() -> Result<Self, EnvelopeError> {
        let mut out = Self {
            key: [0u8; AES_KEY_BYTES],
            nonce: [0u8; NONCE_BYTES],
        };
        OsRng
            .try_fill_bytes(&mut out.key)
            .map_err(|_| EnvelopeError::Random)?;
        OsRng
            .try_fill_bytes(&mut out.nonce)
            .map_err(|_| EnvelopeError::Random)?;
        Ok(out)
    }

    /// Raw key bytes, for wrapping.
    pub fn key_bytes(&self) -> &[u8; AES_KEY_BYTES] {
        &self.key
    }

    pub fn nonce(&self) -> &[u8; NONCE_BYTES] {
        &self.nonce
    }

    /// Encrypt `plaintext`, consuming the key so it cannot seal twice.
    pub fn seal(self, plaintext: &[u8]) -> Result<(SealedBody, Self), EnvelopeError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| EnvelopeError::InvalidKey("aes key length".into()))?;
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&self.nonce), b"", &mut buffer)
            .map_err(|_| EnvelopeError::Malformed("plaintext too large for AES-GCM".into()))?;

        let mut tag_bytes = [0u8; AEAD_TAG_BYTES];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok((
            SealedBody {
                ciphertext: buffer,
                tag: tag_bytes,
            },
            self,
        ))
    }
}

/// Decrypt a detached-tag AES-256-GCM body.
///
/// The tag is verified before any plaintext leaves this function; on failure
/// the working buffer is wiped and `Authentication` is returned. Wrong-length
/// key, nonce or tag inputs fail the same way.
pub fn open(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
    let nonce: [u8; NONCE_BYTES] = nonce.try_into().map_err(|_| EnvelopeError::Authentication)?;
    let tag: [u8; AEAD_TAG_BYTES] = tag.try_into().map_err(|_| EnvelopeError::Authentication)?;
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EnvelopeError::Authentication)?;

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            b"",
            buffer.as_mut_slice(),
            Tag::from_slice(&tag),
        )
        .map_err(|_| EnvelopeError::Authentication)?;
    Ok(buffer)
}
