//! Visit Photos Vault - Sealed File Secret Store
//!
//! Fallback for hosts without an OS keystore. Secrets live in a single JSON
//! file, each sealed with XChaCha20-Poly1305 under a key-encryption key
//! derived from the session PIN with Argon2id. The store is unusable until
//! [`FileSecretStore::unlock`] succeeds and again after [`FileSecretStore::lock`].
//!
//! ```text
//! keystore.json
//! {
//!   "version": 1,
//!   "salt": base64(16B),
//!   "kdf": { "memory_kib", "iterations", "parallelism" },
//!   "verifier": base64(nonce 24B || ciphertext || tag 16B),
//!   "secrets": { "<name>": base64(nonce 24B || ciphertext || tag 16B) }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::SecretStore;
use crate::error::{PhotoError, PhotoResult};

/// Store file name inside the store directory
pub const STORE_FILE: &str = "keystore.json";

const FORMAT_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const LOCK_RETRY: Duration = Duration::from_millis(10);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);
const XNONCE_LEN: usize = 24;
const VERIFIER_AAD: &[u8] = b"visit-photos:keystore:verifier";
const VERIFIER_PLAINTEXT: &[u8] = b"visit-photos keystore v1";

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    salt: String,
    kdf: KdfParams,
    verifier: String,
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

/// Secret store sealed on disk, gated by a session PIN
pub struct FileSecretStore {
    path: PathBuf,
    params: KdfParams,
    kek: RwLock<Option<Zeroizing<[u8; 32]>>>,
    io_lock: Mutex<()>,
}

impl FileSecretStore {
    /// Store in `dir/keystore.json` with default Argon2id costs
    pub fn new(dir: &Path) -> Self {
        Self::with_params(dir, KdfParams::default())
    }

    /// Store with explicit Argon2id costs (used for newly created stores only)
    pub fn with_params(dir: &Path, params: KdfParams) -> Self {
        Self {
            path: dir.join(STORE_FILE),
            params,
            kek: RwLock::new(None),
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock the store for this session.
    ///
    /// The first unlock of a missing store creates it and binds it to `pin`.
    /// A wrong PIN yields [`PhotoError::AccessDenied`].
    pub fn unlock(&self, pin: &SecretString) -> PhotoResult<()> {
        let _guard = self.io_lock.lock();
        let _file_lock = StoreLock::acquire(&self.lock_path())?;

        let kek = match self.read_file()? {
            Some(file) => {
                if file.version != FORMAT_VERSION {
                    return Err(PhotoError::KeyStoreIo(format!(
                        "unsupported keystore version {}",
                        file.version
                    )));
                }
                let salt = decode_b64(&file.salt)?;
                let kek = derive_kek(pin, &salt, file.kdf)?;
                let verifier = decode_b64(&file.verifier)?;
                if open(&kek, VERIFIER_AAD, &verifier).is_err() {
                    warn!("keystore unlock rejected");
                    return Err(PhotoError::AccessDenied);
                }
                kek
            }
            None => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                let kek = derive_kek(pin, &salt, self.params)?;
                let file = StoreFile {
                    version: FORMAT_VERSION,
                    salt: B64.encode(salt),
                    kdf: self.params,
                    verifier: B64.encode(seal(&kek, VERIFIER_AAD, VERIFIER_PLAINTEXT)?),
                    secrets: BTreeMap::new(),
                };
                self.write_file(&file)?;
                info!(path = %self.path.display(), "created sealed keystore");
                kek
            }
        };

        *self.kek.write() = Some(kek);
        debug!("keystore unlocked");
        Ok(())
    }

    /// Forget the session key; secrets become unreadable until the next unlock
    pub fn lock(&self) {
        *self.kek.write() = None;
        debug!("keystore locked");
    }

    fn current_kek(&self) -> PhotoResult<Zeroizing<[u8; 32]>> {
        self.kek
            .read()
            .clone()
            .ok_or_else(|| PhotoError::KeyStoreUnavailable("keystore is locked".into()))
    }

    fn read_file(&self) -> PhotoResult<Option<StoreFile>> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| PhotoError::KeyStoreIo(format!("keystore file corrupted: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PhotoError::KeyStoreIo(e.to_string())),
        }
    }

    fn write_file(&self, file: &StoreFile) -> PhotoResult<()> {
        let io = |e: std::io::Error| PhotoError::KeyStoreIo(e.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_vec_pretty(file)
            .map_err(|e| PhotoError::KeyStoreIo(e.to_string()))?;

        let temp_path = self
            .path
            .with_file_name(format!(".{STORE_FILE}.{}.tmp", Uuid::new_v4()));
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(io)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            out.set_permissions(fs::Permissions::from_mode(0o600)).map_err(io)?;
        }
        let written = out
            .write_all(&json)
            .and_then(|()| out.sync_all())
            .and_then(|()| fs::rename(&temp_path, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(io(e));
        }
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{STORE_FILE}.lock"))
    }

    /// Seal `secret` under `name` and persist the file
    fn write_secret(&self, kek: &[u8; 32], file: &mut StoreFile, name: &str, secret: &[u8]) -> PhotoResult<()> {
        let sealed = seal(kek, name.as_bytes(), secret)?;
        file.secrets.insert(name.to_string(), B64.encode(sealed));
        self.write_file(file)
    }

    fn open_secret(&self, kek: &[u8; 32], file: &StoreFile, name: &str) -> PhotoResult<Option<Vec<u8>>> {
        match file.secrets.get(name) {
            Some(sealed) => {
                let sealed = decode_b64(sealed)?;
                let secret = open(kek, name.as_bytes(), &sealed).map_err(|_| {
                    PhotoError::KeyStoreIo(format!("secret {name:?} failed authentication"))
                })?;
                Ok(Some(secret.to_vec()))
            }
            None => Ok(None),
        }
    }

    fn existing_file(&self) -> PhotoResult<StoreFile> {
        self.read_file()?
            .ok_or_else(|| PhotoError::KeyStoreUnavailable("keystore file is missing".into()))
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, name: &str) -> PhotoResult<Option<Vec<u8>>> {
        let kek = self.current_kek()?;
        let _guard = self.io_lock.lock();
        let file = self.existing_file()?;
        self.open_secret(&kek, &file, name)
    }

    fn set(&self, name: &str, secret: &[u8]) -> PhotoResult<()> {
        let kek = self.current_kek()?;
        let _guard = self.io_lock.lock();
        let _file_lock = StoreLock::acquire(&self.lock_path())?;

        let mut file = self.existing_file()?;
        self.write_secret(&kek, &mut file, name, secret)
    }

    fn set_if_absent(&self, name: &str, secret: &[u8]) -> PhotoResult<Option<Vec<u8>>> {
        let kek = self.current_kek()?;
        let _guard = self.io_lock.lock();
        let _file_lock = StoreLock::acquire(&self.lock_path())?;

        let mut file = self.existing_file()?;
        if let Some(existing) = self.open_secret(&kek, &file, name)? {
            return Ok(Some(existing));
        }
        self.write_secret(&kek, &mut file, name, secret)?;
        Ok(None)
    }

    fn delete(&self, name: &str) -> PhotoResult<()> {
        self.current_kek()?;
        let _guard = self.io_lock.lock();
        let _file_lock = StoreLock::acquire(&self.lock_path())?;
        let mut file = self.existing_file()?;

        if file.secrets.remove(name).is_some() {
            self.write_file(&file)?;
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.kek.read().is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CROSS-PROCESS LOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Exclusive lock on the store file, shared by every process and store
/// instance using the same directory.
///
/// Held as a lock file created with `create_new`; removed on drop. A lock
/// file older than [`LOCK_STALE_AFTER`] is left over from a crashed holder
/// and is broken.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: &Path) -> PhotoResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PhotoError::KeyStoreIo(e.to_string()))?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        warn!(path = %path.display(), "breaking stale keystore lock");
                        let _ = fs::remove_file(path);
                        continue;
                    }
                    if started.elapsed() >= LOCK_TIMEOUT {
                        return Err(PhotoError::KeyStoreUnavailable(
                            "keystore is busy in another process".into(),
                        ));
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(PhotoError::KeyStoreIo(e.to_string())),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn derive_kek(pin: &SecretString, salt: &[u8], params: KdfParams) -> PhotoResult<Zeroizing<[u8; 32]>> {
    let params = Params::new(params.memory_kib, params.iterations, params.parallelism, Some(32))
        .map_err(|e| PhotoError::KeyStoreIo(format!("invalid KDF parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut kek = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(pin.expose_secret().as_bytes(), salt, &mut *kek)
        .map_err(|e| PhotoError::KeyStoreIo(format!("key derivation failed: {e}")))?;
    Ok(kek)
}

fn seal(kek: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> PhotoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(kek)
        .map_err(|e| PhotoError::KeyStoreIo(e.to_string()))?;

    let mut nonce_bytes = [0u8; XNONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad })
        .map_err(|e| PhotoError::KeyStoreIo(format!("sealing failed: {e}")))?;

    let mut sealed = Vec::with_capacity(XNONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open(kek: &[u8; 32], aad: &[u8], sealed: &[u8]) -> PhotoResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < XNONCE_LEN {
        return Err(PhotoError::AuthenticationFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(XNONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(kek)
        .map_err(|_| PhotoError::AuthenticationFailed)?;

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| PhotoError::AuthenticationFailed)
}

fn decode_b64(value: &str) -> PhotoResult<Vec<u8>> {
    B64.decode(value)
        .map_err(|e| PhotoError::KeyStoreIo(format!("keystore file corrupted: {e}")))
}
