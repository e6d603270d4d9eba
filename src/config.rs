//! Visit Photos Vault - Configuration
//!
//! Loaded from `visit-photos.toml` in the data directory. Every field has a
//! default, so the vault works without any config file at all.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PhotoError, PhotoResult};
use crate::key_vault::DEFAULT_KEY_NAME;

/// Pipeline tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest allowed side after resizing, in pixels
    pub max_dimension: u32,
    /// Size ceiling for the compressed image, in bytes
    pub target_bytes: u64,
    /// Lowest JPEG quality the compression loop may reach (0..=1)
    pub min_quality: f32,
    /// Quality decrement per compression attempt (0..=1)
    pub quality_step: f32,
    /// Largest encoded input accepted before decoding, in bytes
    pub max_input_bytes: u64,
    /// Photos processed in parallel by batch operations
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            target_bytes: 1024 * 1024,
            min_quality: 0.1,
            quality_step: 0.1,
            max_input_bytes: 50 * 1024 * 1024,
            max_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would make the pipeline misbehave
    pub fn validate(&self) -> PhotoResult<()> {
        if self.max_dimension == 0 {
            return Err(PhotoError::Config("max_dimension must be positive".into()));
        }
        if self.target_bytes == 0 {
            return Err(PhotoError::Config("target_bytes must be positive".into()));
        }
        if !(self.min_quality > 0.0 && self.min_quality <= 1.0) {
            return Err(PhotoError::Config("min_quality must be in (0, 1]".into()));
        }
        if !(self.quality_step > 0.0 && self.quality_step <= 1.0) {
            return Err(PhotoError::Config("quality_step must be in (0, 1]".into()));
        }
        if self.max_input_bytes == 0 {
            return Err(PhotoError::Config("max_input_bytes must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(PhotoError::Config("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// Top-level settings for a vault data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// Blob directory, relative to the data directory
    pub storage_dir: String,
    /// Name of the photo key in the secret store
    pub key_name: String,
    pub pipeline: PipelineConfig,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            storage_dir: "photos".to_string(),
            key_name: DEFAULT_KEY_NAME.to_string(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl VaultSettings {
    /// Name of the config file looked up in the data directory.
    pub const FILE_NAME: &'static str = "visit-photos.toml";

    /// Load settings from `<data_dir>/visit-photos.toml`.
    ///
    /// A missing file yields defaults; an unparsable or invalid file is an error.
    pub fn load(data_dir: &Path) -> PhotoResult<Self> {
        let config_path = data_dir.join(Self::FILE_NAME);

        let contents = match std::fs::read_to_string(&config_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(PhotoError::Config(format!("{}: {e}", config_path.display()))),
        };

        let settings: VaultSettings = toml::from_str(&contents).map_err(|e| {
            PhotoError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;
        settings.pipeline.validate()?;
        Ok(settings)
    }

    /// Absolute blob directory for `data_dir`
    pub fn storage_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage_dir)
    }
}
