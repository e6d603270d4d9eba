//! Visit Photos Vault - Cryptographic Core
//!
//! AES-256-GCM for photo blobs, SHA-256 for integrity digests.

pub mod keys;
pub mod aead;
pub mod digest;

pub use keys::*;
pub use aead::*;
pub use digest::*;
