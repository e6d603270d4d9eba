//! Visit Photos Vault - Photo Pipeline
//!
//! Write path: decode → resize → compress → encrypt → store.
//! Read path: fetch → decrypt → decode.
//!
//! CPU and disk work runs on tokio's blocking pool; callers only await.
//! A blob is written only after encryption succeeded, so a failed store
//! never leaves a partial blob behind.

use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::batch::{run_ordered, BatchReport};
use crate::blob_store::{BlobStore, ContentId};
use crate::config::PipelineConfig;
use crate::crypto::{digest, verify_digest, CipherEngine};
use crate::error::{PhotoError, PhotoResult};
use crate::imaging;
use crate::key_vault::KeyVault;
use crate::reference::PhotoReference;

/// Outcome of a cascading delete
#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    /// Blobs removed
    pub deleted: usize,
    /// Identifiers that had no blob (already gone)
    pub missing: usize,
    /// Identifiers whose removal failed, with the reason
    pub failed: Vec<(ContentId, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of an integrity audit
#[derive(Debug, Default, Clone)]
pub struct IntegrityReport {
    /// Blobs that decrypted and authenticated
    pub healthy: Vec<ContentId>,
    /// Identifiers with no blob
    pub missing: Vec<ContentId>,
    /// Blobs that failed authentication (tampered, corrupted or wrong key)
    pub damaged: Vec<ContentId>,
    /// Blobs that could not be checked, with the reason
    pub unreadable: Vec<(ContentId, String)>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty() && self.damaged.is_empty() && self.unreadable.is_empty()
    }
}

/// Photo protection pipeline.
///
/// Cheap to clone; all clones share the key vault and blob store.
#[derive(Clone)]
pub struct PhotoPipeline {
    keys: Arc<KeyVault>,
    store: Arc<dyn BlobStore>,
    cipher: CipherEngine,
    config: Arc<PipelineConfig>,
}

impl PhotoPipeline {
    pub fn new(keys: Arc<KeyVault>, store: Arc<dyn BlobStore>, config: PipelineConfig) -> PhotoResult<Self> {
        config.validate()?;
        Ok(Self {
            keys,
            store,
            cipher: CipherEngine::new(),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn key_vault(&self) -> &KeyVault {
        &self.keys
    }

    pub fn blob_store(&self) -> &dyn BlobStore {
        self.store.as_ref()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITE PATH
    // ═══════════════════════════════════════════════════════════════════════

    /// Protect and store an encoded image; returns its new identifier
    pub async fn store_photo(&self, data: Vec<u8>) -> PhotoResult<ContentId> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.store_encoded(&data)).await?
    }

    /// Protect and store an already decoded image
    pub async fn store_image(&self, img: DynamicImage) -> PhotoResult<ContentId> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.store_decoded(img)).await?
    }

    /// Store several images concurrently; results follow input order
    pub async fn store_photos(&self, images: Vec<Vec<u8>>) -> BatchReport<ContentId> {
        let count = images.len();
        let report = run_ordered(images, self.config.max_concurrency, |data| {
            let this = self.clone();
            async move { tokio::task::spawn_blocking(move || this.store_encoded(&data)).await? }
        })
        .await;

        if let Some((index, err)) = report.first_error() {
            warn!(index, count, error = %err, "photo batch store failed");
        }
        report
    }

    fn store_encoded(&self, data: &[u8]) -> PhotoResult<ContentId> {
        let size = data.len() as u64;
        if size > self.config.max_input_bytes {
            return Err(PhotoError::InputTooLarge {
                size,
                max: self.config.max_input_bytes,
            });
        }
        let img = imaging::decode(data)?;
        self.store_decoded(img)
    }

    fn store_decoded(&self, img: DynamicImage) -> PhotoResult<ContentId> {
        let compressed = imaging::prepare(img, &self.config)?;
        let plaintext = Zeroizing::new(compressed.bytes);

        let key = self.keys.get_or_create_key()?;
        let blob = self.cipher.encrypt(&plaintext, &key)?;

        let id = self.store.put(&blob)?;
        info!(%id, bytes = blob.len(), quality = compressed.quality, "photo stored");
        Ok(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // READ PATH
    // ═══════════════════════════════════════════════════════════════════════

    /// Fetch, decrypt and decode a photo
    pub async fn load_photo(&self, id: ContentId) -> PhotoResult<DynamicImage> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.load_decoded(&id)).await?
    }

    /// Fetch and decrypt a photo, returning the encoded image bytes
    pub async fn load_photo_bytes(&self, id: ContentId) -> PhotoResult<Zeroizing<Vec<u8>>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.load_plaintext(&id)).await?
    }

    /// Load several photos concurrently; results follow input order
    pub async fn load_photos(&self, ids: &[ContentId]) -> BatchReport<DynamicImage> {
        run_ordered(ids.to_vec(), self.config.max_concurrency, |id| {
            let this = self.clone();
            async move { tokio::task::spawn_blocking(move || this.load_decoded(&id)).await? }
        })
        .await
    }

    fn load_plaintext(&self, id: &ContentId) -> PhotoResult<Zeroizing<Vec<u8>>> {
        let blob = self.store.get(id)?;
        let key = self.keys.get_or_create_key()?;
        self.cipher.decrypt(&blob, &key)
    }

    fn load_decoded(&self, id: &ContentId) -> PhotoResult<DynamicImage> {
        let plaintext = self.load_plaintext(id)?;
        let img = imaging::decode(&plaintext)?;
        debug!(%id, "photo loaded");
        Ok(img)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DELETE
    // ═══════════════════════════════════════════════════════════════════════

    /// Remove a photo blob.
    ///
    /// A missing blob counts as already deleted, so repeated calls succeed.
    pub async fn delete_photo(&self, id: ContentId) -> PhotoResult<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.delete_blob(&id).map(|_| ())).await?
    }

    /// Cascading delete for a record's photos.
    ///
    /// Best-effort: failures are logged and reported, never returned as errors.
    pub async fn delete_photos(&self, reference: &PhotoReference) -> CleanupReport {
        let this = self.clone();
        let ids = reference.ids().to_vec();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut report = CleanupReport::default();
            for id in ids {
                match this.delete_blob(&id) {
                    Ok(true) => report.deleted += 1,
                    Ok(false) => report.missing += 1,
                    Err(e) => {
                        warn!(%id, error = %e, "photo cleanup failed");
                        report.failed.push((id, e.to_string()));
                    }
                }
            }
            report
        })
        .await;

        match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "photo cleanup worker failed");
                CleanupReport {
                    failed: reference.ids().iter().map(|id| (*id, e.to_string())).collect(),
                    ..CleanupReport::default()
                }
            }
        }
    }

    /// Returns `Ok(false)` when there was nothing to delete
    fn delete_blob(&self, id: &ContentId) -> PhotoResult<bool> {
        match self.store.delete(id) {
            Ok(()) => {
                debug!(%id, "photo deleted");
                Ok(true)
            }
            Err(PhotoError::NotFound(_)) => {
                debug!(%id, "photo already absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTEGRITY
    // ═══════════════════════════════════════════════════════════════════════

    /// SHA-256 of the stored (encrypted) blob
    pub async fn blob_digest(&self, id: ContentId) -> PhotoResult<String> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.store.get(&id).map(|blob| digest(blob.as_bytes()))).await?
    }

    /// Compare the stored blob with a previously recorded digest
    pub async fn verify_blob(&self, id: ContentId, expected_hex: String) -> PhotoResult<bool> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.store
                .get(&id)
                .map(|blob| verify_digest(blob.as_bytes(), &expected_hex))
        })
        .await?
    }

    /// Try to fully decrypt every listed blob and classify the outcome
    pub async fn audit(&self, ids: &[ContentId]) -> PhotoResult<IntegrityReport> {
        let this = self.clone();
        let ids = ids.to_vec();

        tokio::task::spawn_blocking(move || -> PhotoResult<IntegrityReport> {
            let key = this.keys.get_or_create_key()?;
            let mut report = IntegrityReport::default();

            for id in ids {
                let checked = this
                    .store
                    .get(&id)
                    .and_then(|blob| this.cipher.decrypt(&blob, &key));
                match checked {
                    Ok(_) => report.healthy.push(id),
                    Err(PhotoError::NotFound(_)) => report.missing.push(id),
                    Err(PhotoError::AuthenticationFailed) => report.damaged.push(id),
                    Err(e) => report.unreadable.push((id, e.to_string())),
                }
            }

            if !report.is_healthy() {
                warn!(
                    missing = report.missing.len(),
                    damaged = report.damaged.len(),
                    unreadable = report.unreadable.len(),
                    "photo integrity audit found problems"
                );
            }
            Ok(report)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::MemoryBlobStore;
    use crate::crypto::EncryptedBlob;
    use crate::keystore::MemorySecretStore;
    use image::{GenericImageView, ImageFormat};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png).unwrap();
        buffer
    }

    fn pipeline() -> (PhotoPipeline, Arc<MemoryBlobStore>, Arc<MemorySecretStore>) {
        let secrets = Arc::new(MemorySecretStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let keys = Arc::new(KeyVault::new(secrets.clone()));
        let pipeline = PhotoPipeline::new(keys, blobs.clone(), PipelineConfig::default()).unwrap();
        (pipeline, blobs, secrets)
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let (pipeline, blobs, _) = pipeline();

        let id = pipeline.store_photo(png(640, 480)).await.unwrap();
        assert_eq!(blobs.len(), 1);

        let img = pipeline.load_photo(id).await.unwrap();
        assert_eq!(img.dimensions(), (640, 480));

        let bytes = pipeline.load_photo_bytes(id).await.unwrap();
        assert_eq!(imaging::detect_format(&bytes), Some(ImageFormat::Jpeg));
    }

    #[tokio::test]
    async fn test_large_image_is_resized() {
        let (pipeline, _, _) = pipeline();

        let id = pipeline.store_image(DynamicImage::new_rgb8(3840, 2160)).await.unwrap();
        let img = pipeline.load_photo(id).await.unwrap();
        assert_eq!(img.dimensions(), (1920, 1080));
    }

    #[tokio::test]
    async fn test_stored_blob_is_not_plaintext() {
        let (pipeline, blobs, _) = pipeline();

        let id = pipeline.store_photo(png(32, 32)).await.unwrap();
        let blob = blobs.get(&id).unwrap();
        assert!(imaging::detect_format(blob.as_bytes()).is_none());
    }

    #[tokio::test]
    async fn test_invalid_input_writes_nothing() {
        let (pipeline, blobs, _) = pipeline();

        let result = pipeline.store_photo(b"not an image".to_vec()).await;
        assert!(matches!(result, Err(PhotoError::InvalidImageData(_))));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_input_rejected() {
        let secrets = Arc::new(MemorySecretStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let config = PipelineConfig {
            max_input_bytes: 16,
            ..PipelineConfig::default()
        };
        let pipeline =
            PhotoPipeline::new(Arc::new(KeyVault::new(secrets)), blobs.clone(), config).unwrap();

        let result = pipeline.store_photo(png(8, 8)).await;
        assert!(matches!(result, Err(PhotoError::InputTooLarge { max: 16, .. })));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_locked_key_store_blocks_store() {
        let (pipeline, blobs, secrets) = pipeline();
        secrets.lock();

        let result = pipeline.store_photo(png(8, 8)).await;
        assert!(matches!(result, Err(PhotoError::KeyStoreUnavailable(_))));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_tampered_blobs() {
        let (pipeline, blobs, _) = pipeline();

        let missing = ContentId::generate();
        assert!(matches!(pipeline.load_photo(missing).await, Err(PhotoError::NotFound(_))));

        // Replace a real blob's bytes with a tampered copy under a new id
        let id = pipeline.store_photo(png(16, 16)).await.unwrap();
        let mut bytes = blobs.get(&id).unwrap().into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = blobs.put(&EncryptedBlob::from_bytes(bytes)).unwrap();

        assert!(matches!(
            pipeline.load_photo(tampered).await,
            Err(PhotoError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (pipeline, blobs, _) = pipeline();
        let id = pipeline.store_photo(png(8, 8)).await.unwrap();

        pipeline.delete_photo(id).await.unwrap();
        pipeline.delete_photo(id).await.unwrap();
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_cascading_delete_report() {
        let (pipeline, blobs, _) = pipeline();

        let report = pipeline.store_photos(vec![png(8, 8), png(9, 9)]).await;
        let mut reference = PhotoReference::new();
        reference.extend_from_report(&report);
        reference.push(ContentId::generate());

        let cleanup = pipeline.delete_photos(&reference).await;
        assert_eq!(cleanup.deleted, 2);
        assert_eq!(cleanup.missing, 1);
        assert!(cleanup.is_clean());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_blob_digest_verification() {
        let (pipeline, blobs, _) = pipeline();
        let id = pipeline.store_photo(png(8, 8)).await.unwrap();

        let recorded = pipeline.blob_digest(id).await.unwrap();
        assert_eq!(recorded, digest(blobs.get(&id).unwrap().as_bytes()));
        assert!(pipeline.verify_blob(id, recorded.clone()).await.unwrap());
        assert!(!pipeline.verify_blob(id, digest(b"something else")).await.unwrap());
    }

    #[tokio::test]
    async fn test_audit_classifies_blobs() {
        let (pipeline, blobs, _) = pipeline();

        let healthy = pipeline.store_photo(png(8, 8)).await.unwrap();
        let damaged = blobs.put(&EncryptedBlob::from_bytes(vec![0u8; 64])).unwrap();
        let missing = ContentId::generate();

        let report = pipeline.audit(&[healthy, damaged, missing]).await.unwrap();
        assert_eq!(report.healthy, vec![healthy]);
        assert_eq!(report.damaged, vec![damaged]);
        assert_eq!(report.missing, vec![missing]);
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_deleted_key_invalidates_blobs() {
        let (pipeline, _, _) = pipeline();
        let id = pipeline.store_photo(png(8, 8)).await.unwrap();

        pipeline.key_vault().delete_key().unwrap();
        assert!(matches!(
            pipeline.load_photo(id).await,
            Err(PhotoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let secrets = Arc::new(MemorySecretStore::new());
        let config = PipelineConfig {
            max_concurrency: 0,
            ..PipelineConfig::default()
        };
        let result = PhotoPipeline::new(
            Arc::new(KeyVault::new(secrets)),
            Arc::new(MemoryBlobStore::new()),
            config,
        );
        assert!(matches!(result, Err(PhotoError::Config(_))));
    }
}
