//! Visit Photos Vault - Image Preparation
//!
//! Resize to a bounded size, then JPEG-compress with a quality that steps
//! down until the output fits the target size or the quality floor is hit.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{
    imageops::FilterType, DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader,
    RgbImage,
};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{PhotoError, PhotoResult};

/// Result of the compression loop
#[derive(Debug, Clone)]
pub struct Compressed {
    /// Encoded JPEG bytes
    pub bytes: Vec<u8>,
    /// Quality used for `bytes`, as a percentage (1..=100)
    pub quality: u8,
    /// Number of encodings attempted
    pub attempts: u32,
}

/// Decode encoded image bytes (any format `image` recognizes).
///
/// EXIF orientation is applied, so a portrait phone photo comes out upright.
pub fn decode(data: &[u8]) -> PhotoResult<DynamicImage> {
    let invalid = |e: &dyn std::fmt::Display| PhotoError::InvalidImageData(e.to_string());

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| invalid(&e))?;
    let mut decoder = reader.into_decoder().map_err(|e| invalid(&e))?;
    let orientation = decoder.orientation().map_err(|e| invalid(&e))?;

    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| invalid(&e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Detect the container format from magic bytes
pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

/// Shrink `img` so neither side exceeds `max_dimension`, keeping the aspect ratio.
///
/// Images already within bounds are returned unchanged.
pub fn resize_to_fit(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// Encode `rgb` as JPEG at `quality` percent
pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> PhotoResult<Vec<u8>> {
    let mut output = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut output), quality.clamp(1, 100));
        encoder
            .encode_image(rgb)
            .map_err(|e| PhotoError::CompressionFailed(e.to_string()))?;
    }
    Ok(output)
}

/// Compress with decreasing quality until `target_bytes` is met.
///
/// Starts at full quality and lowers it by `quality_step` per attempt. When
/// the floor `min_quality` is reached without meeting the target, the
/// floor-quality output is accepted. The loop is bounded by the step count.
pub fn compress(img: &DynamicImage, config: &PipelineConfig) -> PhotoResult<Compressed> {
    let floor = percent(config.min_quality);
    let step = percent(config.quality_step).max(1);
    let rgb = img.to_rgb8();

    let mut quality: u8 = 100;
    let mut attempts = 0;
    loop {
        let bytes = encode_jpeg(&rgb, quality)?;
        attempts += 1;

        if bytes.len() as u64 <= config.target_bytes || quality <= floor {
            debug!(quality, attempts, bytes = bytes.len(), "photo compressed");
            return Ok(Compressed {
                bytes,
                quality,
                attempts,
            });
        }
        quality = quality.saturating_sub(step).max(floor);
    }
}

/// Full preparation: resize then compress
pub fn prepare(img: DynamicImage, config: &PipelineConfig) -> PhotoResult<Compressed> {
    let resized = resize_to_fit(img, config.max_dimension);
    compress(&resized, config)
}

fn percent(fraction: f32) -> u8 {
    (fraction * 100.0).round().clamp(1.0, 100.0) as u8
}
