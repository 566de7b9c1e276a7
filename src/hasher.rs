//! Content digest: SHA-256, lower-case hex.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex length of a content digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// SHA-256 of `data` as 64 lower-case hex characters.
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare two hex digests without short-circuiting. Case-insensitive, since
/// some senders emit upper-case hex.
pub fn digests_match(expected: &str, computed: &str) -> bool {
    let a = expected.to_ascii_lowercase();
    let b = computed.to_ascii_lowercase();
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// True if `s` looks like a SHA-256 hex digest.
pub fn is_digest_hex(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
