//! Client identifiers derived from the remote address.

use sha2::{Digest, Sha256};

/// Derive a stable client id from a remote address.
///
/// The id is the hex-encoded SHA-256 of the address string bytes, so the
/// same `ip:port` always maps to the same id and distinct addresses do not
/// collide in practice.
pub fn fingerprint(address: &str) -> String {
    hex::encode(Sha256::digest(address.as_bytes()))
}
