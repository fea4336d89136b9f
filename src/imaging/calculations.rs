//! Pure calculation functions for image dimensions and intensity tables.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{LevelParams, Rect};

/// Fraction of samples clipped to black by `normalize`.
pub const NORMALIZE_BLACK_CLIP: f64 = 0.02;
/// Fraction of samples clipped to white by `normalize`.
pub const NORMALIZE_WHITE_CLIP: f64 = 0.01;

/// Scale `source` to fit inside `bounds`, preserving aspect ratio.
///
/// One edge matches the bound exactly, the other is at most its bound.
/// Both edges are at least one pixel.
///
/// # Examples
/// ```
/// # use imgpipe::imaging::calculations::fit_within;
/// assert_eq!(fit_within((800, 600), (400, 400)), (400, 300));
/// assert_eq!(fit_within((600, 800), (400, 400)), (300, 400));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    let scale = f64::min(
        max_w as f64 / src_w as f64,
        max_h as f64 / src_h as f64,
    );
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Offset that centers `inner` inside `outer`.
pub fn center_offset(outer: (u32, u32), inner: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(inner.0) / 2,
        outer.1.saturating_sub(inner.1) / 2,
    )
}

/// Size of one tile when `dims` is split into a `columns × rows` grid.
///
/// Floor division: remainder pixels on the right and bottom edges are dropped.
/// A zero tile count yields a zero-sized slice, which callers reject.
pub fn tile_slice(dims: (u32, u32), columns: u32, rows: u32) -> (u32, u32) {
    (
        dims.0.checked_div(columns).unwrap_or(0),
        dims.1.checked_div(rows).unwrap_or(0),
    )
}

/// Crop rectangle of the tile at `(column, row)`.
pub fn tile_rect(slice: (u32, u32), column: u32, row: u32) -> Rect {
    Rect {
        x: column * slice.0,
        y: row * slice.1,
        width: slice.0,
        height: slice.1,
    }
}

/// Size of the composite built from tile columns.
///
/// Each inner vector is one column, top to bottom. A column is as wide as its
/// widest tile and as tall as its tiles stacked; the composite is the columns
/// side by side.
pub fn merged_dimensions(columns: &[Vec<(u32, u32)>]) -> (u32, u32) {
    columns.iter().fold((0, 0), |(width, height), column| {
        let col_w = column.iter().map(|d| d.0).max().unwrap_or(0);
        let col_h: u32 = column.iter().map(|d| d.1).sum();
        (width + col_w, height.max(col_h))
    })
}

/// Build the lookup table for a `level` adjustment.
///
/// Input below the black point maps to 0, above the white point to 255, and
/// the span between is stretched then raised to `1 / gamma`.
pub fn level_lut(params: &LevelParams) -> [u8; 256] {
    let black = params.black_point / 100.0;
    let white = params.white_point / 100.0;
    let span = (white - black).max(f64::EPSILON);
    let exponent = 1.0 / params.gamma;

    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let x = v as f64 / 255.0;
        let y = ((x - black) / span).clamp(0.0, 1.0).powf(exponent);
        *out = (y * 255.0).round() as u8;
    }
    lut
}

/// Find the intensity bounds for a contrast stretch.
///
/// Walks the histogram from each end until more than the clip fraction of all
/// samples has been passed. Returns `None` when the image is empty or flat.
pub fn stretch_bounds(
    histogram: &[u64; 256],
    black_clip: f64,
    white_clip: f64,
) -> Option<(u8, u8)> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let black_limit = (total as f64 * black_clip) as u64;
    let white_limit = (total as f64 * white_clip) as u64;

    let mut seen = 0;
    let lo = histogram.iter().position(|&count| {
        seen += count;
        seen > black_limit
    })?;

    seen = 0;
    let hi = 255
        - histogram.iter().rev().position(|&count| {
            seen += count;
            seen > white_limit
        })?;

    (hi > lo).then_some((lo as u8, hi as u8))
}

/// Linear lookup table mapping `lo..=hi` onto `0..=255`.
pub fn stretch_lut(lo: u8, hi: u8) -> [u8; 256] {
    let (lo, hi) = (lo as f64, hi as f64);
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let y = ((v as f64 - lo) / (hi - lo)).clamp(0.0, 1.0);
        *out = (y * 255.0).round() as u8;
    }
    lut
}
