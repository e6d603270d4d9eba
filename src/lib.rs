//! # Visit Photos Vault
//!
//! Photo protection for visit records: images picked by the user become
//! encrypted, integrity-protected blobs on disk and are turned back into
//! images on read.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     PHOTO PIPELINE                       │
//! │   resize → compress → encrypt → store / load → decrypt  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  KEY VAULT  │  │   CIPHER    │  │   BLOB STORE    │  │
//! │  │ get-or-create│  │ AES-256-GCM │  │ uuid → file     │  │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────┘  │
//! │         │                                                │
//! │  ┌──────┴──────────────────────────────────────────────┐ │
//! │  │  ACCESS GATE  +  SECRET STORE (keyring / sealed file)│ │
//! │  └─────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - One 256-bit key per installation, created on first use
//! - Key readable only while the secret store is unlocked and the gate agrees
//! - Every blob is `nonce || ciphertext || tag` with a fresh 96-bit nonce
//! - Any tampering or a wrong key fails closed with `AuthenticationFailed`
//! - Plaintext is never written to disk; decrypted buffers are zeroized

pub mod error;
pub mod config;
pub mod crypto;
pub mod keystore;
pub mod gate;
pub mod key_vault;
pub mod blob_store;
pub mod imaging;
pub mod batch;
pub mod reference;
pub mod pipeline;

pub use error::{PhotoError, PhotoResult};
pub use config::{PipelineConfig, VaultSettings};
pub use crypto::{CipherEngine, EncryptedBlob, SymmetricKey};
pub use keystore::{FileSecretStore, MemorySecretStore, SecretStore};
pub use gate::{AccessGate, AllowAll, SessionGate};
pub use key_vault::KeyVault;
pub use blob_store::{BlobStore, ContentId, FsBlobStore, MemoryBlobStore};
pub use batch::BatchReport;
pub use reference::PhotoReference;
pub use pipeline::{CleanupReport, IntegrityReport, PhotoPipeline};

/// Visit Photos Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
