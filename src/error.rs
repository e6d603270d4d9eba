//! Visit Photos Vault - Error Types

use thiserror::Error;

use crate::blob_store::ContentId;

/// Result type for vault operations
pub type PhotoResult<T> = Result<T, PhotoError>;

/// Photo protection error types
#[derive(Error, Debug)]
pub enum PhotoError {
    // ═══════════════════════════════════════════════════════════════
    // KEY STORE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    #[error("Key store I/O error: {0}")]
    KeyStoreIo(String),

    #[error("Access to the photo key was denied")]
    AccessDenied,

    #[error("Too many failed attempts - access locked")]
    TooManyAttempts,

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Authentication failed - blob tampered, corrupted or encrypted under another key")]
    AuthenticationFailed,

    // ═══════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Blob not found: {0}")]
    NotFound(ContentId),

    #[error("Content identifier collision: {0}")]
    IdentifierCollision(ContentId),

    #[error("Invalid content identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // IMAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Invalid image data: {0}")]
    InvalidImageData(String),

    #[error("Input too large: {size} bytes (max: {max})")]
    InputTooLarge { size: u64, max: u64 },

    // ═══════════════════════════════════════════════════════════════
    // ORCHESTRATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Batch aborted before this item started")]
    BatchAborted,

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PhotoError {
    /// Check if this error signals tampering or a lost/rotated key
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            PhotoError::AuthenticationFailed
                | PhotoError::IdentifierCollision(_)
                | PhotoError::TooManyAttempts
        )
    }

    /// Check if the error means "no blob behind this identifier"
    pub fn is_not_found(&self) -> bool {
        matches!(self, PhotoError::NotFound(_))
    }

    /// Single human-readable message for the UI layer.
    ///
    /// Never includes key material, ciphertext or filesystem paths.
    pub fn user_message(&self) -> &'static str {
        match self {
            PhotoError::KeyStoreUnavailable(_) => "Unlock your device to access photos.",
            PhotoError::KeyStoreIo(_) => "The photo key could not be read or saved.",
            PhotoError::AccessDenied => "Access to photos was not authorized.",
            PhotoError::TooManyAttempts => "Too many failed attempts. Try again later.",
            PhotoError::EncryptionFailed(_) => "The photo could not be protected.",
            PhotoError::AuthenticationFailed => "The photo is damaged or can no longer be opened.",
            PhotoError::NotFound(_) | PhotoError::InvalidIdentifier(_) => "The photo could not be found.",
            PhotoError::IdentifierCollision(_) | PhotoError::StorageIo(_) => "The photo could not be saved.",
            PhotoError::CompressionFailed(_) => "The photo could not be compressed.",
            PhotoError::InvalidImageData(_) => "The file is not a supported image.",
            PhotoError::InputTooLarge { .. } => "The photo is too large.",
            PhotoError::BatchAborted | PhotoError::WorkerFailed(_) => "The photo operation was interrupted.",
            PhotoError::Config(_) => "Photo storage is misconfigured.",
        }
    }
}

impl From<image::ImageError> for PhotoError {
    fn from(e: image::ImageError) -> Self {
        PhotoError::InvalidImageData(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PhotoError {
    fn from(e: tokio::task::JoinError) -> Self {
        PhotoError::WorkerFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PhotoError::AuthenticationFailed.is_security_critical());
        assert!(!PhotoError::BatchAborted.is_security_critical());

        let id = ContentId::generate();
        assert!(PhotoError::NotFound(id).is_not_found());
        assert!(!PhotoError::AuthenticationFailed.is_not_found());
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = PhotoError::KeyStoreIo("secret /data/keys/0xdeadbeef".into());
        assert!(!err.user_message().contains("deadbeef"));
        assert!(!err.user_message().contains("/data"));
    }
}
