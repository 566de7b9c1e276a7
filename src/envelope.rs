//! Envelope builder and opener.

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::aead::{self, SessionKey};
use crate::directory::Recipient;
use crate::error::EnvelopeError;
use crate::hasher;
use crate::identity::Identity;
use crate::wire::{Envelope, RecipientKey, WrappedKey, WrappedKeys};
use crate::wrap::PublicKey;

/// Plaintext recovered from an envelope, with its integrity verdict.
///
/// `verified == false` means the cipher accepted the ciphertext but the
/// plaintext does not hash to the digest the sender attached. Callers must
/// surface that to whoever consumes the document.
#[derive(Debug)]
pub struct OpenedDocument {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub verified: bool,
    pub expected_digest: String,
    pub computed_digest: String,
}

/// Seal and open envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bailiff;

impl Bailiff {
    pub fn new() -> Self {
        Self
    }

    /// Seal `plaintext` for every recipient, in order. One fresh session key
    /// is wrapped independently for each.
    pub fn seal(&self, plaintext: &[u8], recipients: &[Recipient]) -> Result<Envelope, EnvelopeError> {
        if recipients.is_empty() {
            return Err(EnvelopeError::NoRecipients);
        }

        let (content_digest, session, ciphertext, auth_tag) = encrypt_body(plaintext)?;

        let mut wrapped = Vec::with_capacity(recipients.len());
        for r in recipients {
            wrapped.push(RecipientKey {
                key_id: r.key_id.clone(),
                wrapped_key: WrappedKey(r.public_key.wrap(session.key_bytes())?),
            });
        }
        debug!(
            recipients = wrapped.len(),
            bytes = plaintext.len(),
            digest = %content_digest,
            "sealed multi-recipient envelope"
        );

        Ok(Envelope {
            ciphertext,
            wrapped_keys: WrappedKeys::MultiRecipient(wrapped),
            nonce: session.nonce().to_vec(),
            auth_tag,
            content_digest,
        })
    }

    /// Seal for a single receiver using the legacy shape: one bare wrapped
    /// key and no key id.
    pub fn seal_legacy(&self, plaintext: &[u8], public_key: &PublicKey) -> Result<Envelope, EnvelopeError> {
        let (content_digest, session, ciphertext, auth_tag) = encrypt_body(plaintext)?;
        let wrapped = WrappedKey(public_key.wrap(session.key_bytes())?);
        debug!(bytes = plaintext.len(), digest = %content_digest, "sealed legacy envelope");

        Ok(Envelope {
            ciphertext,
            wrapped_keys: WrappedKeys::Legacy(wrapped),
            nonce: session.nonce().to_vec(),
            auth_tag,
            content_digest,
        })
    }

    /// Recover the plaintext addressed to `identity`.
    ///
    /// Unwrap and cipher failures are hard errors and release no plaintext.
    /// A digest mismatch is reported through `OpenedDocument::verified`.
    pub fn open(&self, envelope: &Envelope, identity: &Identity) -> Result<OpenedDocument, EnvelopeError> {
        let shape = envelope.wrapped_keys.shape().as_str();
        let selected = match &envelope.wrapped_keys {
            WrappedKeys::Legacy(key) => key,
            WrappedKeys::MultiRecipient(list) => list
                .iter()
                .find(|r| &r.key_id == identity.key_id())
                .map(|r| &r.wrapped_key)
                .ok_or_else(|| {
                    warn!(
                        key_id = %identity.key_id(),
                        recipients = list.len(),
                        "envelope has no wrapped key for this identity"
                    );
                    EnvelopeError::RecipientNotFound {
                        key_id: identity.key_id().clone(),
                    }
                })?,
        };

        let session_key = identity.private_key().unwrap_key(&selected.0).map_err(|e| {
            warn!(stage = "unwrap", key_id = %identity.key_id(), shape, "open failed");
            e
        })?;

        let plaintext = aead::open(
            session_key.as_slice(),
            &envelope.nonce,
            &envelope.ciphertext,
            &envelope.auth_tag,
        )
        .map_err(|e| {
            warn!(stage = "decrypt", key_id = %identity.key_id(), shape, "open failed");
            e
        })?;

        let computed_digest = hasher::digest(&plaintext);
        let verified = hasher::digests_match(&envelope.content_digest, &computed_digest);
        if !verified {
            warn!(
                expected = %envelope.content_digest,
                computed = %computed_digest,
                "content digest mismatch"
            );
        }

        Ok(OpenedDocument {
            plaintext,
            verified,
            expected_digest: envelope.content_digest.clone(),
            computed_digest,
        })
    }
}

fn encrypt_body(plaintext: &[u8]) -> Result<(String, SessionKey, Vec<u8>, Vec<u8>), EnvelopeError> {
    let content_digest = hasher::digest(plaintext);
    let (body, session) = SessionKey::generate()?.seal(plaintext)?;
    Ok((content_digest, session, body.ciphertext, body.tag.to_vec()))
}
