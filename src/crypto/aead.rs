//! Visit Photos Vault - AEAD Encryption
//!
//! AES-256-GCM in the combined layout `nonce || ciphertext || tag`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use super::keys::{generate_nonce, SymmetricKey, NONCE_LEN, TAG_LEN};
use crate::error::{PhotoError, PhotoResult};

/// Encrypted photo payload: `nonce || ciphertext || tag`
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    /// Wrap bytes read back from storage
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into (nonce, ciphertext || tag); `None` if too short to be valid
    fn split(&self) -> Option<(&[u8], &[u8])> {
        if self.0.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        Some(self.0.split_at(NONCE_LEN))
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedBlob({} bytes)", self.0.len())
    }
}

/// Stateless authenticated encryption over byte buffers.
///
/// Every call draws a fresh 96-bit nonce; identical plaintexts never
/// produce identical blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherEngine;

impl CipherEngine {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` under `key`
    pub fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> PhotoResult<EncryptedBlob> {
        let cipher = Aes256Gcm::new_from_slice(key.expose())
            .map_err(|e| PhotoError::EncryptionFailed(e.to_string()))?;

        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| PhotoError::EncryptionFailed(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(EncryptedBlob(combined))
    }

    /// Decrypt and verify `blob` under `key`.
    ///
    /// Truncated input, a flipped bit and a wrong key all fail with
    /// [`PhotoError::AuthenticationFailed`]; no plaintext is ever returned
    /// for an unverified blob.
    pub fn decrypt(&self, blob: &EncryptedBlob, key: &SymmetricKey) -> PhotoResult<Zeroizing<Vec<u8>>> {
        let (nonce_bytes, ciphertext) = blob.split().ok_or(PhotoError::AuthenticationFailed)?;

        let cipher = Aes256Gcm::new_from_slice(key.expose())
            .map_err(|_| PhotoError::AuthenticationFailed)?;
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| PhotoError::AuthenticationFailed)
    }
}
