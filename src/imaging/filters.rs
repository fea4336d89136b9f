//! Pixel transforms behind the built-in operations.
//!
//! | Function | Steps |
//! |---|---|
//! | [`resize_exact`] | Lanczos3 to exactly `width × height` |
//! | [`thumbnail`] | fit inside the box, pad with white, center |
//! | [`sketch`] | edge (r=1) → negate → normalize → grayscale → blur σ 0.5 |
//! | [`normalize`] | contrast stretch, 2% black / 1% white clip |
//! | [`charcoal`] | edge (r=1) → blur σ 1 → normalize → negate → grayscale |
//! | [`level`] | black/white percent + gamma lookup table |
//!
//! Intensity work happens on 8-bit buffers. Wider sample types are converted
//! to RGBA8 first. Alpha is never remapped.

use super::backend::BackendError;
use super::calculations::{
    NORMALIZE_BLACK_CLIP, NORMALIZE_WHITE_CLIP, center_offset, fit_within, level_lut,
    stretch_bounds, stretch_lut,
};
use super::params::LevelParams;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// 3×3 Laplacian: radius-1 edge detection.
const EDGE_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];
const SKETCH_BLUR_SIGMA: f32 = 0.5;
const CHARCOAL_BLUR_SIGMA: f32 = 1.0;
const THUMBNAIL_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Scale to exactly `width × height`; aspect ratio is not preserved.
pub fn resize_exact(img: DynamicImage, width: u32, height: u32) -> Result<DynamicImage, BackendError> {
    if width == 0 || height == 0 {
        return Err(BackendError::InvalidGeometry(format!(
            "resize to {width}x{height}"
        )));
    }
    Ok(img.resize_exact(width, height, FilterType::Lanczos3))
}

/// Fit inside `width × height`, then pad to exactly that size on a white
/// background with the content centered.
pub fn thumbnail(img: DynamicImage, width: u32, height: u32) -> Result<DynamicImage, BackendError> {
    if width == 0 || height == 0 {
        return Err(BackendError::InvalidGeometry(format!(
            "thumbnail to {width}x{height}"
        )));
    }
    let (fit_w, fit_h) = fit_within((img.width(), img.height()), (width, height));
    let fitted = img.resize_exact(fit_w, fit_h, FilterType::Lanczos3).to_rgba8();

    let mut canvas = RgbaImage::from_pixel(width, height, THUMBNAIL_BACKGROUND);
    let (x, y) = center_offset((width, height), (fit_w, fit_h));
    imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);

    Ok(DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8()))
}

pub fn sketch(img: DynamicImage) -> DynamicImage {
    let mut edges = edge(&img);
    edges.invert();
    normalize(edges).grayscale().blur(SKETCH_BLUR_SIGMA)
}

/// Stretch the intensity histogram to the full 0–255 range.
///
/// Flat images are returned unchanged.
pub fn normalize(img: DynamicImage) -> DynamicImage {
    let img = to_8bit(img);
    match stretch_bounds(&histogram(&img), NORMALIZE_BLACK_CLIP, NORMALIZE_WHITE_CLIP) {
        Some((lo, hi)) => apply_lut(img, &stretch_lut(lo, hi)),
        None => img,
    }
}

pub fn charcoal(img: DynamicImage) -> DynamicImage {
    let blurred = edge(&img).blur(CHARCOAL_BLUR_SIGMA);
    let mut stretched = normalize(blurred);
    stretched.invert();
    stretched.grayscale()
}

pub fn level(img: DynamicImage, params: &LevelParams) -> DynamicImage {
    apply_lut(img, &level_lut(params))
}

fn edge(img: &DynamicImage) -> DynamicImage {
    // The kernel sums to zero, so it must not touch an alpha channel.
    let opaque = match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    };
    opaque.filter3x3(&EDGE_KERNEL)
}

fn to_8bit(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => img,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

/// `(samples per pixel, color samples per pixel)` for 8-bit layouts.
fn layout(img: &DynamicImage) -> Option<(usize, usize)> {
    match img {
        DynamicImage::ImageLuma8(_) => Some((1, 1)),
        DynamicImage::ImageLumaA8(_) => Some((2, 1)),
        DynamicImage::ImageRgb8(_) => Some((3, 3)),
        DynamicImage::ImageRgba8(_) => Some((4, 3)),
        _ => None,
    }
}

fn histogram(img: &DynamicImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    if let Some((stride, color)) = layout(img) {
        for px in img.as_bytes().chunks_exact(stride) {
            for &v in &px[..color] {
                hist[v as usize] += 1;
            }
        }
    }
    hist
}

fn apply_lut(img: DynamicImage, lut: &[u8; 256]) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(mut buf) => {
            remap(&mut buf, 1, 1, lut);
            DynamicImage::ImageLuma8(buf)
        }
        DynamicImage::ImageLumaA8(mut buf) => {
            remap(&mut buf, 2, 1, lut);
            DynamicImage::ImageLumaA8(buf)
        }
        DynamicImage::ImageRgb8(mut buf) => {
            remap(&mut buf, 3, 3, lut);
            DynamicImage::ImageRgb8(buf)
        }
        DynamicImage::ImageRgba8(mut buf) => {
            remap(&mut buf, 4, 3, lut);
            DynamicImage::ImageRgba8(buf)
        }
        other => apply_lut(DynamicImage::ImageRgba8(other.to_rgba8()), lut),
    }
}

fn remap(samples: &mut [u8], stride: usize, color: usize, lut: &[u8; 256]) {
    for px in samples.chunks_exact_mut(stride) {
        for v in &mut px[..color] {
            *v = lut[*v as usize];
        }
    }
}
