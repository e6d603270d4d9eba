//! End-to-end tests over the on-disk blob store and sealed keystore.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use secrecy::SecretString;
use tempfile::tempdir;

use visit_photos_vault::keystore::KdfParams;
use visit_photos_vault::{
    BlobStore, ContentId, EncryptedBlob, FileSecretStore, FsBlobStore, KeyVault, MemorySecretStore,
    PhotoError, PhotoPipeline, PhotoReference, PhotoResult, PipelineConfig,
};

fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

fn pin(value: &str) -> SecretString {
    SecretString::new(value.to_string())
}

/// Pseudo-random pixels; compresses badly, which is the point
fn noisy_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.max(1);
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });

    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

/// Blob store that takes longer to write bigger payloads and records the
/// order in which writes complete
struct SlowStore {
    inner: FsBlobStore,
    completed: Mutex<Vec<ContentId>>,
}

impl BlobStore for SlowStore {
    fn put(&self, payload: &EncryptedBlob) -> PhotoResult<ContentId> {
        std::thread::sleep(Duration::from_millis(payload.len() as u64 / 2_000));
        let id = self.inner.put(payload)?;
        self.completed.lock().push(id);
        Ok(id)
    }

    fn get(&self, id: &ContentId) -> PhotoResult<EncryptedBlob> {
        self.inner.get(id)
    }

    fn delete(&self, id: &ContentId) -> PhotoResult<()> {
        self.inner.delete(id)
    }

    fn list(&self) -> PhotoResult<Vec<ContentId>> {
        self.inner.list()
    }
}

#[tokio::test]
async fn test_photos_survive_reopening_the_vault() {
    let dir = tempdir().unwrap();
    let blobs = dir.path().join("photos");

    let id = {
        let secrets = Arc::new(FileSecretStore::with_params(dir.path(), fast_kdf()));
        secrets.unlock(&pin("2468")).unwrap();
        let pipeline = PhotoPipeline::new(
            Arc::new(KeyVault::new(secrets)),
            Arc::new(FsBlobStore::new(&blobs)),
            PipelineConfig::default(),
        )
        .unwrap();
        pipeline.store_photo(noisy_png(320, 240, 7)).await.unwrap()
    };

    let secrets = Arc::new(FileSecretStore::with_params(dir.path(), fast_kdf()));
    assert!(matches!(secrets.unlock(&pin("1357")), Err(PhotoError::AccessDenied)));
    secrets.unlock(&pin("2468")).unwrap();

    let pipeline = PhotoPipeline::new(
        Arc::new(KeyVault::new(secrets)),
        Arc::new(FsBlobStore::new(&blobs)),
        PipelineConfig::default(),
    )
    .unwrap();

    let img = pipeline.load_photo(id).await.unwrap();
    assert_eq!(img.dimensions(), (320, 240));
}

#[tokio::test]
async fn test_locked_file_store_fails_closed() {
    let dir = tempdir().unwrap();
    let secrets = Arc::new(FileSecretStore::with_params(dir.path(), fast_kdf()));
    let pipeline = PhotoPipeline::new(
        Arc::new(KeyVault::new(secrets)),
        Arc::new(FsBlobStore::new(&dir.path().join("photos"))),
        PipelineConfig::default(),
    )
    .unwrap();

    let result = pipeline.store_photo(noisy_png(16, 16, 3)).await;
    assert!(matches!(result, Err(PhotoError::KeyStoreUnavailable(_))));
    assert!(pipeline.blob_store().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_results_follow_input_order() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SlowStore {
        inner: FsBlobStore::new(dir.path()),
        completed: Mutex::new(Vec::new()),
    });
    let pipeline = PhotoPipeline::new(
        Arc::new(KeyVault::new(Arc::new(MemorySecretStore::new()))),
        store.clone(),
        PipelineConfig::default(),
    )
    .unwrap();

    // A is the largest payload and finishes last
    let inputs = vec![
        noisy_png(1000, 750, 11),
        noisy_png(500, 375, 22),
        noisy_png(40, 30, 33),
    ];
    let ids = pipeline.store_photos(inputs).await.into_ordered().unwrap();

    let completed = store.completed.lock().clone();
    assert_eq!(completed.len(), 3);
    assert_eq!(completed.last(), Some(&ids[0]));

    let images = pipeline.load_photos(&ids).await.into_ordered().unwrap();
    let dims: Vec<_> = images.iter().map(|img| img.dimensions()).collect();
    assert_eq!(dims, vec![(1000, 750), (500, 375), (40, 30)]);
}

#[tokio::test]
async fn test_incompressible_photo_still_stored() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig {
        target_bytes: 1_000,
        ..PipelineConfig::default()
    };
    let pipeline = PhotoPipeline::new(
        Arc::new(KeyVault::new(Arc::new(MemorySecretStore::new()))),
        Arc::new(FsBlobStore::new(dir.path())),
        config,
    )
    .unwrap();

    let id = pipeline.store_photo(noisy_png(400, 300, 5)).await.unwrap();
    let img = pipeline.load_photo(id).await.unwrap();
    assert_eq!(img.dimensions(), (400, 300));
}

#[tokio::test]
async fn test_other_installation_cannot_read_blobs() {
    let dir = tempdir().unwrap();
    let open = |secrets: Arc<MemorySecretStore>| {
        PhotoPipeline::new(
            Arc::new(KeyVault::new(secrets)),
            Arc::new(FsBlobStore::new(dir.path())),
            PipelineConfig::default(),
        )
        .unwrap()
    };

    let owner = open(Arc::new(MemorySecretStore::new()));
    let stranger = open(Arc::new(MemorySecretStore::new()));

    let id = owner.store_photo(noisy_png(24, 24, 9)).await.unwrap();
    assert!(matches!(stranger.load_photo(id).await, Err(PhotoError::AuthenticationFailed)));

    let report = stranger.audit(&[id]).await.unwrap();
    assert_eq!(report.damaged, vec![id]);
}

#[tokio::test]
async fn test_record_cascade_delete_on_disk() {
    let dir = tempdir().unwrap();
    let pipeline = PhotoPipeline::new(
        Arc::new(KeyVault::new(Arc::new(MemorySecretStore::new()))),
        Arc::new(FsBlobStore::new(dir.path())),
        PipelineConfig::default(),
    )
    .unwrap();

    let report = pipeline
        .store_photos(vec![noisy_png(20, 20, 1), noisy_png(30, 30, 2)])
        .await;
    let mut reference = PhotoReference::new();
    reference.extend_from_report(&report);

    // The record model keeps identifiers as strings
    let stored = reference.to_strings();
    let reference = PhotoReference::parse(&stored).unwrap();

    let first = pipeline.delete_photos(&reference).await;
    assert_eq!(first.deleted, 2);
    assert!(first.is_clean());

    let second = pipeline.delete_photos(&reference).await;
    assert_eq!(second.deleted, 0);
    assert_eq!(second.missing, 2);
    assert!(pipeline.blob_store().list().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_batch_still_completes_started_writes() {
    let dir = tempdir().unwrap();
    let pipeline = PhotoPipeline::new(
        Arc::new(KeyVault::new(Arc::new(MemorySecretStore::new()))),
        Arc::new(FsBlobStore::new(dir.path())),
        PipelineConfig::default(),
    )
    .unwrap();

    let mut large = Vec::new();
    DynamicImage::new_rgb8(3000, 3000)
        .write_to(&mut Cursor::new(&mut large), ImageFormat::Png)
        .unwrap();
    let inputs = vec![large.clone(), large];

    // The caller gives up long before resizing finishes
    let abandoned = tokio::time::timeout(Duration::from_millis(20), pipeline.store_photos(inputs)).await;
    assert!(abandoned.is_err());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let ids = loop {
        let ids = pipeline.blob_store().list().unwrap();
        if ids.len() == 2 || tokio::time::Instant::now() >= deadline {
            break ids;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(ids.len(), 2);
    for id in ids {
        let img = pipeline.load_photo(id).await.unwrap();
        assert_eq!(img.dimensions(), (1920, 1920));
    }
}
