//! Hashing and canonical encoding helpers. Anything that gets signed goes
//! through [`canonical_json`] so the signed bytes never depend on field
//! declaration order.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Produces a raw SHA-256 digest of the provided bytes.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of `parts`, without allocating the joined buffer.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Returns the hexadecimal representation of a SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_digest(data))
}

/// Serializes `value` as compact JSON with every object's keys sorted.
///
/// The value is first lowered into a `serde_json::Value`, whose map type is
/// ordered by key, so nested objects are sorted as well.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_vec(&tree)
}
