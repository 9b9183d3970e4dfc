//! Short content fingerprints.
//!
//! Truncated SHA-256 hex digests. Truncation trades collision resistance
//! for size; these are lookup keys, not integrity checks.

use sha2::{Digest, Sha256};

/// Lowercase hex of the SHA-256 digest of `data`, truncated to `len`
/// characters (at most 64).
pub fn short_hex(data: &[u8], len: usize) -> String {
    let digest = Sha256::digest(data);
    let mut hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(len);
    hex
}
