//! SHA-256 content digests, independent of the AEAD tag.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hex-encoded SHA-256 of `data`
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check `data` against a full hex digest.
///
/// Prefixes, malformed hex and other lengths never match. The byte
/// comparison itself is constant-time.
pub fn verify_digest(data: &[u8], expected_hex: &str) -> bool {
    let expected = match hex::decode(expected_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let computed = Sha256::digest(data);
    computed.as_slice().ct_eq(&expected).into()
}
