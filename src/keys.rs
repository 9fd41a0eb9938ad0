//! Fixed-width key helpers.
//!
//! Callers that prefer deterministic 8-byte keys over raw encoded keys can map
//! strings through a fast non-cryptographic hash, or integers through their
//! big-endian representation.

use twox_hash::XxHash64;

/// Hash an arbitrary string into an 8-byte big-endian key (xxHash64, seed 0).
pub fn hash_key(text: &str) -> [u8; 8] {
    XxHash64::oneshot(0, text.as_bytes()).to_be_bytes()
}

/// Map a signed 64-bit integer to its 8-byte big-endian key.
pub fn int_key(n: i64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Stable group name for coalescing, derived from the encoded key.
///
/// Hex keeps the mapping injective, so distinct keys never share a group.
pub(crate) fn group_key(encoded: &[u8]) -> String {
    hex::encode(encoded)
}
