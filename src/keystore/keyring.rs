//! OS credential store integration.
//!
//! - macOS / iOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Accessibility (e.g. "when unlocked, this device only") is governed by the
//! platform store; a locked or unreachable store surfaces as
//! [`PhotoError::KeyStoreUnavailable`].

use parking_lot::{const_mutex, Mutex};

use super::SecretStore;
use crate::error::{PhotoError, PhotoResult};

/// Default service name used in the OS keyring.
pub const DEFAULT_SERVICE: &str = "visit-photos-vault";

/// Serializes conditional writes from every store instance in this process
static KEYRING_WRITE: Mutex<()> = const_mutex(());

/// Secret store backed by the operating system keyring
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> PhotoResult<keyring::Entry> {
        keyring::Entry::new(&self.service, name).map_err(map_error)
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, name: &str) -> PhotoResult<Option<Vec<u8>>> {
        match self.entry(name)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    fn set(&self, name: &str, secret: &[u8]) -> PhotoResult<()> {
        self.entry(name)?.set_secret(secret).map_err(map_error)
    }

    /// Check-then-set; the platform store offers no conditional write, so
    /// this is only atomic within one process.
    fn set_if_absent(&self, name: &str, secret: &[u8]) -> PhotoResult<Option<Vec<u8>>> {
        let _guard = KEYRING_WRITE.lock();
        let entry = self.entry(name)?;
        match entry.get_secret() {
            Ok(existing) => Ok(Some(existing)),
            Err(keyring::Error::NoEntry) => {
                entry.set_secret(secret).map_err(map_error)?;
                Ok(None)
            }
            Err(e) => Err(map_error(e)),
        }
    }

    fn delete(&self, name: &str) -> PhotoResult<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_error(e)),
        }
    }

    fn is_available(&self) -> bool {
        match self.entry("__availability_check__") {
            Ok(entry) => matches!(entry.get_secret(), Ok(_) | Err(keyring::Error::NoEntry)),
            Err(_) => false,
        }
    }
}

fn map_error(e: keyring::Error) -> PhotoError {
    match e {
        keyring::Error::NoStorageAccess(inner) => PhotoError::KeyStoreUnavailable(inner.to_string()),
        keyring::Error::PlatformFailure(inner) => PhotoError::KeyStoreIo(inner.to_string()),
        other => PhotoError::KeyStoreIo(other.to_string()),
    }
}
