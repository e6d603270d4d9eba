//! Visit Photos Vault - Key Vault
//!
//! Owns the single photo key: created lazily on first use, persisted in a
//! [`SecretStore`], handed out only after the [`AccessGate`] agrees.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::SymmetricKey;
use crate::error::{PhotoError, PhotoResult};
use crate::gate::{AccessGate, AllowAll};
use crate::keystore::SecretStore;

/// Default secret name for the photo key
pub const DEFAULT_KEY_NAME: &str = "photo-master-key";

/// Get-or-create / delete access to the photo key
pub struct KeyVault {
    store: Arc<dyn SecretStore>,
    gate: Arc<dyn AccessGate>,
    key_name: String,
    cached: RwLock<Option<SymmetricKey>>,
    create_lock: Mutex<()>,
}

impl KeyVault {
    /// Key vault over `store` with no extra authorization gate
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_gate(store, Arc::new(AllowAll))
    }

    pub fn with_gate(store: Arc<dyn SecretStore>, gate: Arc<dyn AccessGate>) -> Self {
        Self {
            store,
            gate,
            key_name: DEFAULT_KEY_NAME.to_string(),
            cached: RwLock::new(None),
            create_lock: Mutex::new(()),
        }
    }

    /// Use a different secret name
    pub fn key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = name.into();
        self
    }

    /// Return the photo key, generating and persisting it on first use.
    ///
    /// Concurrent first calls converge on a single persisted key. Within one
    /// vault creation is serialized; across vaults and processes sharing a
    /// store, the store's put-if-absent decides which key is kept and every
    /// loser adopts it.
    pub fn get_or_create_key(&self) -> PhotoResult<SymmetricKey> {
        self.gate.authorize()?;
        self.ensure_store_available()?;

        if let Some(key) = self.cached.read().as_ref() {
            return Ok(key.clone());
        }

        let _creating = self.create_lock.lock();

        if let Some(key) = self.cached.read().as_ref() {
            return Ok(key.clone());
        }

        let key = match self.store.get(&self.key_name)? {
            Some(bytes) => SymmetricKey::from_slice(&Zeroizing::new(bytes))?,
            None => {
                let candidate = SymmetricKey::generate();
                match self.store.set_if_absent(&self.key_name, candidate.expose())? {
                    None => {
                        info!(key_name = %self.key_name, "generated new photo key");
                        candidate
                    }
                    Some(existing) => {
                        debug!(key_name = %self.key_name, "adopted photo key created by another holder");
                        SymmetricKey::from_slice(&Zeroizing::new(existing))?
                    }
                }
            }
        };

        *self.cached.write() = Some(key.clone());
        Ok(key)
    }

    /// Permanently remove the photo key.
    ///
    /// Every blob encrypted under it becomes unrecoverable. Not part of any
    /// normal application flow.
    pub fn delete_key(&self) -> PhotoResult<()> {
        self.gate.authorize()?;
        let _creating = self.create_lock.lock();

        self.store.delete(&self.key_name)?;
        *self.cached.write() = None;
        warn!(key_name = %self.key_name, "photo key deleted; existing blobs are unrecoverable");
        Ok(())
    }

    /// Drop the in-memory copy; the next access re-reads the store
    pub fn evict(&self) {
        *self.cached.write() = None;
    }

    fn ensure_store_available(&self) -> PhotoResult<()> {
        if self.store.is_available() {
            Ok(())
        } else {
            Err(PhotoError::KeyStoreUnavailable("secret store is locked".into()))
        }
    }
}
