//! Local identity: the receiver's own key pair and key id.
//!
//! Files live at `<dir>/<name>_private.pem` (PKCS#8) and
//! `<dir>/<name>_public.pem` (SPKI). The private file is the source of truth;
//! the public file is derived from it and rewritten if missing or stale.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::EnvelopeError;
use crate::key_id::KeyId;
use crate::wrap::{KeyPair, PrivateKey, PublicKey, RSA_MODULUS_BITS};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no identity at {path}")]
    Missing { path: PathBuf },

    #[error("identity file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Key(#[from] EnvelopeError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> IdentityError + '_ {
    move |source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// An explicitly constructed identity, passed to whatever needs to open
/// envelopes.
#[derive(Clone)]
pub struct Identity {
    key_pair: KeyPair,
    key_id: KeyId,
    public_pem: String,
}

impl Identity {
    /// In-memory identity. The key id is derived from the SPKI PEM encoding.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self, EnvelopeError> {
        let public_pem = key_pair.public.to_pem()?;
        let key_id = KeyId::for_public_key(&public_pem);
        Ok(Self {
            key_pair,
            key_id,
            public_pem,
        })
    }

    /// Load an existing `<name>` from `dir`. Never writes: a missing private
    /// key is `IdentityError::Missing`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, IdentityError> {
        let private_path = dir.join(format!("{name}_private.pem"));
        let key_pair = read_private(&private_path)?
            .ok_or(IdentityError::Missing { path: private_path })?;
        Ok(Self::from_key_pair(key_pair)?)
    }

    /// Load `<name>` from `dir`, generating it on first boot.
    pub fn load_or_generate(dir: &Path, name: &str) -> Result<Self, IdentityError> {
        Self::load_or_generate_with_bits(dir, name, RSA_MODULUS_BITS)
    }

    /// As `load_or_generate`, with an explicit modulus size for new keys.
    ///
    /// Concurrent first boots converge on one key pair: the new private key is
    /// written to a temp file and published with a hard link, which fails if
    /// the target exists. The loser discards its key and loads the winner's.
    pub fn load_or_generate_with_bits(
        dir: &Path,
        name: &str,
        bits: usize,
    ) -> Result<Self, IdentityError> {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
        let private_path = dir.join(format!("{name}_private.pem"));
        let public_path = dir.join(format!("{name}_public.pem"));

        let key_pair = match read_private(&private_path)? {
            Some(kp) => kp,
            None => generate_and_publish(dir, name, &private_path, bits)?,
        };

        let identity = Self::from_key_pair(key_pair)?;
        sync_public_file(dir, name, &public_path, &identity.public_pem)?;
        info!(key_id = %identity.key_id, path = %private_path.display(), "identity ready");
        Ok(identity)
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key_pair.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.key_pair.private
    }

    /// SPKI PEM text; the key id is the digest of exactly these bytes.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

fn read_private(path: &Path) -> Result<Option<KeyPair>, IdentityError> {
    match fs::read_to_string(path) {
        Ok(pem) => Ok(Some(KeyPair::from_private(PrivateKey::from_pem(&pem)?))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

fn generate_and_publish(
    dir: &Path,
    name: &str,
    private_path: &Path,
    bits: usize,
) -> Result<KeyPair, IdentityError> {
    let key_pair = KeyPair::generate_with_bits(bits)?;
    let pem = key_pair.private.to_pem()?;

    let tmp = temp_path(dir, name, "private");
    write_new_file(&tmp, pem.as_bytes(), true)?;

    let published = fs::hard_link(&tmp, private_path);
    // The temp name is unique to this call; losing it is harmless.
    let _ = fs::remove_file(&tmp);

    match published {
        Ok(()) => {
            info!(path = %private_path.display(), bits, "generated new identity key pair");
            Ok(key_pair)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!(path = %private_path.display(), "identity created concurrently, loading it");
            read_private(private_path)?.ok_or_else(|| IdentityError::Io {
                path: private_path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "published identity vanished"),
            })
        }
        Err(e) => Err(io_err(private_path)(e)),
    }
}

fn sync_public_file(dir: &Path, name: &str, path: &Path, pem: &str) -> Result<(), IdentityError> {
    match fs::read_to_string(path) {
        Ok(existing) if existing == pem => return Ok(()),
        Ok(_) => warn!(path = %path.display(), "public key file does not match private key, rewriting"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(path)(e)),
    }
    let tmp = temp_path(dir, name, "public");
    write_new_file(&tmp, pem.as_bytes(), false)?;
    fs::rename(&tmp, path).map_err(io_err(path))
}

fn temp_path(dir: &Path, name: &str, half: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    dir.join(format!(
        ".{name}_{half}.{}.{}.{nanos}.tmp",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

fn write_new_file(path: &Path, bytes: &[u8], private: bool) -> Result<(), IdentityError> {
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(if private { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = opts.open(path).map_err(io_err(path))?;
    file.write_all(bytes).map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))
}
