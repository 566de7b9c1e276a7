//! # bailiff-envelope
//!
//! Envelope encryption for sealed case documents.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bailiff_envelope::{Bailiff, Identity, KeyPair, Recipient};
//!
//! let identity = Identity::from_key_pair(KeyPair::generate().unwrap()).unwrap();
//! let me = Recipient::from_pem(identity.public_pem()).unwrap();
//!
//! let envelope = Bailiff::new().seal(b"hello-pdf", &[me]).unwrap();
//! let doc = Bailiff::new().open(&envelope, &identity).unwrap();
//!
//! assert_eq!(doc.plaintext.as_slice(), b"hello-pdf");
//! assert!(doc.verified);
//! ```
//!
//! ## Construction
//!
//! - **Body**: AES-256-GCM under a fresh key and nonce per document
//! - **Session key**: RSA-OAEP (SHA-256), wrapped once per recipient
//! - **Integrity**: SHA-256 of the plaintext travels with the envelope and is
//!   re-checked after decryption
//! - **Key ids**: first 16 hex chars of SHA-256 over the public key PEM
//!
//! ## What's NOT Provided
//!
//! - Transport access control
//! - Streaming encryption
//! - Key rotation

#![deny(unsafe_code)]

pub mod aead;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod key_id;
pub mod wire;
pub mod wrap;

pub use directory::{DirectoryLookup, FallbackReason, Recipient, SealPlan};
pub use envelope::{Bailiff, OpenedDocument};
pub use error::EnvelopeError;
pub use identity::{Identity, IdentityError};
pub use key_id::KeyId;
pub use wire::{CaseSubmission, Envelope, EnvelopeShape, EnvelopeSummary, RecipientKey, WrappedKey, WrappedKeys};
pub use wrap::{KeyPair, PrivateKey, PublicKey, RSA_MODULUS_BITS};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
