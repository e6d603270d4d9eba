//! Visit Photos Vault - Blob Store
//!
//! Maps random content identifiers to encrypted payloads. On disk each blob
//! is one file named by its identifier; the nonce travels inside the blob so
//! there is no metadata sidecar.
//!
//! ```text
//! <storage_dir>/
//!   3f2b8c1e-....-....-....-............   nonce || ciphertext || tag
//!   .9a0d....tmp                           in-flight write (ignored)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::crypto::EncryptedBlob;
use crate::error::{PhotoError, PhotoResult};

const TEMP_PREFIX: char = '.';
const TEMP_SUFFIX: &str = ".tmp";

/// Opaque 128-bit identifier naming one stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(Uuid);

impl ContentId {
    /// Fresh random (v4) identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ContentId {
    type Err = PhotoError;

    /// Parse an identifier received from the record model.
    ///
    /// Only the lowercase hyphenated form written by [`fmt::Display`] is
    /// accepted, so an identifier can never address a path outside the
    /// storage directory and every accepted string names exactly one file.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Uuid::parse_str(s) {
            Ok(uuid) if uuid.hyphenated().to_string() == s => Ok(Self(uuid)),
            _ => Err(PhotoError::InvalidIdentifier(s.to_string())),
        }
    }
}

/// Storage of encrypted payloads by identifier
pub trait BlobStore: Send + Sync {
    /// Store `payload` under a newly generated identifier
    fn put(&self, payload: &EncryptedBlob) -> PhotoResult<ContentId>;

    /// Read a blob; [`PhotoError::NotFound`] if nothing backs `id`
    fn get(&self, id: &ContentId) -> PhotoResult<EncryptedBlob>;

    /// Remove a blob; [`PhotoError::NotFound`] if nothing backs `id`
    fn delete(&self, id: &ContentId) -> PhotoResult<()>;

    /// Identifiers of all stored blobs
    fn list(&self) -> PhotoResult<Vec<ContentId>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// FILESYSTEM STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Blob store over an app-private directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn temp_path(&self, id: &ContentId) -> PathBuf {
        self.root.join(format!("{TEMP_PREFIX}{id}{TEMP_SUFFIX}"))
    }

    /// Publish a fully written temp file under its final name.
    ///
    /// A hard link fails instead of replacing an existing file, so a
    /// colliding identifier can never overwrite another blob. Readers only
    /// ever see complete files.
    fn publish(&self, temp: &Path, id: &ContentId) -> PhotoResult<()> {
        let result = fs::hard_link(temp, self.blob_path(id));
        let _ = fs::remove_file(temp);

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                error!(%id, "content identifier collision");
                Err(PhotoError::IdentifierCollision(*id))
            }
            Err(e) => Err(PhotoError::StorageIo(e)),
        }
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, payload: &EncryptedBlob) -> PhotoResult<ContentId> {
        fs::create_dir_all(&self.root)?;

        let id = ContentId::generate();
        let temp = self.temp_path(&id);

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().write(true).create_new(true).open(&temp)?;
            file.write_all(payload.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp);
            return Err(PhotoError::StorageIo(e));
        }

        self.publish(&temp, &id)?;
        debug!(%id, bytes = payload.len(), "blob stored");
        Ok(id)
    }

    fn get(&self, id: &ContentId) -> PhotoResult<EncryptedBlob> {
        match fs::read(self.blob_path(id)) {
            Ok(bytes) => Ok(EncryptedBlob::from_bytes(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PhotoError::NotFound(*id)),
            Err(e) => Err(PhotoError::StorageIo(e)),
        }
    }

    fn delete(&self, id: &ContentId) -> PhotoResult<()> {
        match fs::remove_file(self.blob_path(id)) {
            Ok(()) => {
                debug!(%id, "blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PhotoError::NotFound(*id)),
            Err(e) => Err(PhotoError::StorageIo(e)),
        }
    }

    fn list(&self) -> PhotoResult<Vec<ContentId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PhotoError::StorageIo(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Blob store held in process memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, payload: &EncryptedBlob) -> PhotoResult<ContentId> {
        let id = ContentId::generate();
        let mut blobs = self.blobs.write();
        if blobs.contains_key(&id) {
            return Err(PhotoError::IdentifierCollision(id));
        }
        blobs.insert(id, payload.as_bytes().to_vec());
        Ok(id)
    }

    fn get(&self, id: &ContentId) -> PhotoResult<EncryptedBlob> {
        self.blobs
            .read()
            .get(id)
            .map(|bytes| EncryptedBlob::from_bytes(bytes.clone()))
            .ok_or(PhotoError::NotFound(*id))
    }

    fn delete(&self, id: &ContentId) -> PhotoResult<()> {
        self.blobs
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(PhotoError::NotFound(*id))
    }

    fn list(&self) -> PhotoResult<Vec<ContentId>> {
        let mut ids: Vec<_> = self.blobs.read().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
