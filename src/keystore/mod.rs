//! Visit Photos Vault - Secret Stores
//!
//! Small named binary secrets behind device/session unlock:
//! - [`MemorySecretStore`]: in-process double with a simulated device lock
//! - [`FileSecretStore`]: Argon2id + XChaCha20-Poly1305 sealed file, unlocked per session
//! - `KeyringSecretStore` (feature `keyring-store`): the OS credential store

pub mod memory;
pub mod file;
#[cfg(feature = "keyring-store")]
pub mod keyring;

pub use memory::MemorySecretStore;
pub use file::{FileSecretStore, KdfParams};
#[cfg(feature = "keyring-store")]
pub use self::keyring::KeyringSecretStore;

use crate::error::PhotoResult;

/// Get/set/delete-by-name access to a protected secret store.
///
/// Implementations must refuse every operation with
/// [`PhotoError::KeyStoreUnavailable`](crate::PhotoError::KeyStoreUnavailable)
/// while the device or session is locked.
pub trait SecretStore: Send + Sync {
    /// Read a secret; `Ok(None)` if nothing is stored under `name`
    fn get(&self, name: &str) -> PhotoResult<Option<Vec<u8>>>;

    /// Store or replace a secret
    fn set(&self, name: &str, secret: &[u8]) -> PhotoResult<()>;

    /// Store `secret` only if nothing is stored under `name` yet.
    ///
    /// Returns `Ok(None)` when `secret` was written, or the secret already
    /// present, which is left untouched. The check and the write are one
    /// atomic step for every holder of the same backing store.
    fn set_if_absent(&self, name: &str, secret: &[u8]) -> PhotoResult<Option<Vec<u8>>>;

    /// Remove a secret; removing a missing secret is not an error
    fn delete(&self, name: &str) -> PhotoResult<()>;

    /// Whether secrets can currently be read
    fn is_available(&self) -> bool;
}
