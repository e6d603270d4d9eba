//! Visit Photos Vault - Key Material
//!
//! The single photo key and nonce generation.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{PhotoError, PhotoResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-GCM (96 bits)
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length
pub const TAG_LEN: usize = 16;

/// 256-bit symmetric photo key, zeroized on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    inner: Zeroizing<[u8; KEY_LEN]>,
}

impl SymmetricKey {
    /// Create a key from raw bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Zeroizing::new(bytes),
        }
    }

    /// Rebuild a key from persisted bytes, rejecting the wrong length
    pub fn from_slice(bytes: &[u8]) -> PhotoResult<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            PhotoError::KeyStoreIo(format!(
                "stored key has invalid length: expected {}, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::new(array))
    }

    /// Generate 32 bytes from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut *bytes);
        Self { inner: bytes }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.inner
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Generate a random nonce for AES-GCM
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let k1 = SymmetricKey::generate();
        let k2 = SymmetricKey::generate();
        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_from_slice_length_check() {
        assert!(SymmetricKey::from_slice(&[7u8; KEY_LEN]).is_ok());
        assert!(matches!(
            SymmetricKey::from_slice(&[7u8; 16]),
            Err(PhotoError::KeyStoreIo(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::new([0xAB; KEY_LEN]);
        let shown = format!("{:?}", key);
        assert!(!shown.contains("171"));
        assert!(!shown.to_lowercase().contains("ab"));
    }
}
