//! In-memory secret store for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use zeroize::Zeroizing;

use super::SecretStore;
use crate::error::{PhotoError, PhotoResult};

/// Secret store held in process memory
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
    locked: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the device locking
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    /// Simulate the device unlocking
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_unlocked(&self) -> PhotoResult<()> {
        if self.locked.load(Ordering::SeqCst) {
            Err(PhotoError::KeyStoreUnavailable("device is locked".into()))
        } else {
            Ok(())
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, name: &str) -> PhotoResult<Option<Vec<u8>>> {
        self.ensure_unlocked()?;
        Ok(self.secrets.read().get(name).map(|s| s.to_vec()))
    }

    fn set(&self, name: &str, secret: &[u8]) -> PhotoResult<()> {
        self.ensure_unlocked()?;
        self.secrets
            .write()
            .insert(name.to_string(), Zeroizing::new(secret.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_if_absent(&self, name: &str, secret: &[u8]) -> PhotoResult<Option<Vec<u8>>> {
        self.ensure_unlocked()?;
        let mut secrets = self.secrets.write();
        if let Some(existing) = secrets.get(name) {
            return Ok(Some(existing.to_vec()));
        }
        secrets.insert(name.to_string(), Zeroizing::new(secret.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn delete(&self, name: &str) -> PhotoResult<()> {
        self.ensure_unlocked()?;
        self.secrets.write().remove(name);
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.locked.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_delete() {
        let store = MemorySecretStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", b"secret").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"secret"[..]));

        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_set_if_absent_keeps_first_secret() {
        let store = MemorySecretStore::new();

        assert_eq!(store.set_if_absent("k", b"first").unwrap(), None);
        assert_eq!(store.set_if_absent("k", b"second").unwrap(), Some(b"first".to_vec()));
        assert_eq!(store.get("k").unwrap(), Some(b"first".to_vec()));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_locked_store_refuses_access() {
        let store = MemorySecretStore::new();
        store.set("k", b"secret").unwrap();
        store.lock();

        assert!(!store.is_available());
        assert!(matches!(store.get("k"), Err(PhotoError::KeyStoreUnavailable(_))));
        assert!(matches!(store.set("k", b"x"), Err(PhotoError::KeyStoreUnavailable(_))));

        store.unlock();
        assert!(store.get("k").unwrap().is_some());
    }
}
