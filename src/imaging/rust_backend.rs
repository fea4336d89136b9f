//! Pure Rust image backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` |
//! | Decode (JPEG, PNG, TIFF, WebP, BMP, GIF) | `image::ImageReader` with content sniffing |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the configured quality |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → others | `DynamicImage::write_to` |
//!
//! JPEG has no alpha channel, so RGBA content is flattened to RGB before
//! encoding. GIF is always written as RGBA8.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::handle::ImageHandle;
use super::params::{OutputFormat, Quality};
use image::{DynamicImage, ImageReader};
use std::io::BufWriter;
use std::path::Path;

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    quality: Quality,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_quality(Quality::default())
    }

    /// Backend encoding lossy formats at `quality`.
    pub fn with_quality(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, remembering the sniffed container.
fn load_image(path: &Path) -> Result<ImageHandle, BackendError> {
    let reader = ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?;
    let format = reader.format().and_then(OutputFormat::from_image_format);
    let image = reader.decode().map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
    })?;
    Ok(ImageHandle::new(image).with_source_format(format))
}

/// Convert pixel layout to one the target encoder accepts.
fn prepare_for(img: &DynamicImage, format: OutputFormat) -> DynamicImage {
    match (format, img) {
        (OutputFormat::Jpeg, DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)) => {
            img.clone()
        }
        (OutputFormat::Jpeg, _) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (OutputFormat::Gif, DynamicImage::ImageRgba8(_)) => img.clone(),
        (OutputFormat::Gif, _) => DynamicImage::ImageRgba8(img.to_rgba8()),
        (
            _,
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_),
        ) => img.clone(),
        _ => DynamicImage::ImageRgba8(img.to_rgba8()),
    }
}

/// Encode `img` to `path` as `format`.
fn save_image(
    img: &DynamicImage,
    path: &Path,
    format: OutputFormat,
    quality: Quality,
) -> Result<(), BackendError> {
    let prepared = prepare_for(img, format);
    let file = std::fs::File::create(path).map_err(BackendError::Io)?;
    let mut writer = BufWriter::new(file);

    let encoded = match format {
        OutputFormat::Jpeg => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality.value() as u8);
            prepared.write_with_encoder(encoder)
        }
        OutputFormat::Avif => {
            // Speed 6 keeps rav1e throughput reasonable for batch jobs
            let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                writer,
                6,
                quality.value() as u8,
            );
            prepared.write_with_encoder(encoder)
        }
        other => prepared.write_to(&mut writer, other.image_format()),
    };

    encoded.map_err(|e| {
        BackendError::ProcessingFailed(format!(
            "{} encode of {} failed: {}",
            format.extension(),
            path.display(),
            e
        ))
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn open(&self, path: &Path) -> Result<ImageHandle, BackendError> {
        load_image(path)
    }

    fn save(
        &self,
        image: &ImageHandle,
        path: &Path,
        format: Option<OutputFormat>,
    ) -> Result<(), BackendError> {
        let format = format
            .or_else(|| OutputFormat::from_path(path))
            .or_else(|| image.source_format())
            .ok_or_else(|| {
                BackendError::ProcessingFailed(format!(
                    "Cannot infer output format for {}",
                    path.display()
                ))
            })?;
        save_image(image.image(), path, format, self.quality)
    }
}
