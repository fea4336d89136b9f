//! Grid tiling and merging.
//!
//! [`tile`] splits one image into a `columns × rows` grid of JPEG files;
//! [`merge`] reads such a grid back and assembles the composite.
//!
//! ## Tile Geometry
//!
//! ```text
//! slice_w = floor(W / columns)      slice_h = floor(H / rows)
//! tile (c, r) = slice_w × slice_h at (c * slice_w, r * slice_h)
//! file name   = filename_{r}_{c}.jpg
//! ```
//!
//! Remainder pixels on the right and bottom edges are dropped, so merging a
//! full grid yields `columns * slice_w × rows * slice_h`.
//!
//! Each tile is cropped from a fresh decode of the source. The grid is indexed
//! `[column][row]`, filled columns-outer, rows-inner.
//!
//! ## Merging
//!
//! Each column's tiles are stacked top to bottom, then the column strips are
//! placed left to right. A grid with any unpopulated cell, or any cell whose
//! file is missing on disk, is rejected with
//! [`PipelineError::PartialTileGrid`] before anything is decoded.

use crate::imaging::calculations::{merged_dimensions, tile_rect, tile_slice};
use crate::imaging::{BackendError, ImageBackend, ImageHandle, OutputFormat};
use crate::job::OperationKind;
use crate::paths::widen_permissions;
use crate::pipeline::PipelineError;
use image::{DynamicImage, Rgb, RgbImage, imageops};
use std::path::Path;

/// Default destination of a merge step.
pub const MERGED_FILENAME: &str = "merged_file.jpg";

/// File name of the tile at `(row, column)`.
pub fn tile_filename(row: u32, column: u32) -> String {
    format!("filename_{row}_{column}.jpg")
}

/// A `columns × rows` matrix of tile file names, indexed `[column][row]`.
///
/// Names are relative to the output directory the tiles were written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    columns: u32,
    rows: u32,
    cells: Vec<Vec<Option<String>>>,
}

impl TileGrid {
    /// An empty grid; every cell unpopulated.
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            cells: vec![vec![None; rows as usize]; columns as usize],
        }
    }

    /// The grid [`tile`] would produce, reconstructed from the naming scheme.
    pub fn expected(columns: u32, rows: u32) -> Self {
        let mut grid = Self::new(columns, rows);
        for column in 0..columns {
            for row in 0..rows {
                grid.set(column, row, tile_filename(row, column));
            }
        }
        grid
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Populate one cell. Coordinates outside the grid are ignored.
    pub fn set(&mut self, column: u32, row: u32, filename: String) {
        if let Some(cell) = self
            .cells
            .get_mut(column as usize)
            .and_then(|col| col.get_mut(row as usize))
        {
            *cell = Some(filename);
        }
    }

    pub fn get(&self, column: u32, row: u32) -> Option<&str> {
        self.cells
            .get(column as usize)?
            .get(row as usize)?
            .as_deref()
    }

    /// Populated file names, columns-outer, rows-inner.
    pub fn filenames(&self) -> Vec<String> {
        self.cells.iter().flatten().flatten().cloned().collect()
    }

    /// Cells that cannot be merged: unpopulated, or naming a file absent
    /// from `dir`.
    pub fn missing(&self, dir: &Path) -> Vec<String> {
        let mut missing = Vec::new();
        for column in 0..self.columns {
            for row in 0..self.rows {
                match self.get(column, row) {
                    None => missing.push(format!("column {column} row {row}")),
                    Some(name) if !dir.join(name).is_file() => missing.push(name.to_string()),
                    Some(_) => {}
                }
            }
        }
        missing
    }
}

fn tile_error(source: BackendError) -> PipelineError {
    PipelineError::transform(OperationKind::Tile, source)
}

fn merge_error(source: BackendError) -> PipelineError {
    PipelineError::transform(OperationKind::Merge, source)
}

/// Split `source` into a `columns × rows` grid of JPEG tiles in `output_dir`.
pub fn tile(
    backend: &dyn ImageBackend,
    source: &Path,
    output_dir: &Path,
    columns: u32,
    rows: u32,
) -> Result<TileGrid, PipelineError> {
    let dims = backend.identify(source).map_err(tile_error)?;
    let slice = tile_slice(dims.as_tuple(), columns, rows);
    if slice.0 == 0 || slice.1 == 0 {
        return Err(tile_error(BackendError::InvalidGeometry(format!(
            "{}x{} image cannot be split into {columns}x{rows} tiles",
            dims.width, dims.height
        ))));
    }

    let mut grid = TileGrid::new(columns, rows);
    for column in 0..columns {
        for row in 0..rows {
            let name = tile_filename(row, column);
            let path = output_dir.join(&name);
            let tile = backend
                .open(source)
                .and_then(|img| img.crop(tile_rect(slice, column, row)))
                .map_err(tile_error)?;
            backend
                .save(&tile, &path, Some(OutputFormat::Jpeg))
                .map_err(tile_error)?;
            widen_permissions(&path)?;
            grid.set(column, row, name);
        }
    }

    tracing::debug!(
        columns,
        rows,
        tile_width = slice.0,
        tile_height = slice.1,
        "tiled {}",
        source.display()
    );
    Ok(grid)
}

/// Assemble the tiles of `grid`, read from `output_dir`, into one image.
pub fn merge(
    backend: &dyn ImageBackend,
    output_dir: &Path,
    grid: &TileGrid,
) -> Result<ImageHandle, PipelineError> {
    let missing = grid.missing(output_dir);
    if !missing.is_empty() {
        return Err(PipelineError::PartialTileGrid { missing });
    }

    let mut strips: Vec<Vec<RgbImage>> = Vec::with_capacity(grid.columns() as usize);
    for column in 0..grid.columns() {
        let mut strip = Vec::with_capacity(grid.rows() as usize);
        for row in 0..grid.rows() {
            let name = grid.get(column, row).ok_or_else(|| PipelineError::PartialTileGrid {
                missing: vec![format!("column {column} row {row}")],
            })?;
            let tile = backend.open(&output_dir.join(name)).map_err(merge_error)?;
            strip.push(tile.into_inner().to_rgb8());
        }
        strips.push(strip);
    }

    let dims: Vec<Vec<(u32, u32)>> = strips
        .iter()
        .map(|strip| strip.iter().map(|t| t.dimensions()).collect())
        .collect();
    let (width, height) = merged_dimensions(&dims);
    if width == 0 || height == 0 {
        return Err(merge_error(BackendError::InvalidGeometry(
            "tile grid is empty".into(),
        )));
    }

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut x = 0u32;
    for strip in &strips {
        let mut y = 0u32;
        for tile in strip {
            imageops::replace(&mut canvas, tile, x as i64, y as i64);
            y += tile.height();
        }
        x += strip.iter().map(|t| t.width()).max().unwrap_or(0);
    }

    // Tiles are always JPEG, so the composite is too unless told otherwise
    Ok(ImageHandle::new(DynamicImage::ImageRgb8(canvas))
        .with_source_format(Some(OutputFormat::Jpeg)))
}
