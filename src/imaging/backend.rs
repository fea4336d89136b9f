//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between pipeline logic and pixel
//! storage: identify an image on disk, open it into an [`ImageHandle`], and
//! save a handle back out. Filters operate on handles in memory, so a backend
//! only deals with codecs and files.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use `MockBackend`, which records calls and fabricates blank
//! images of configured size.

use super::handle::ImageHandle;
use super::params::OutputFormat;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image backends.
pub trait ImageBackend: Sync {
    /// Get image dimensions without keeping the decoded pixels.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode an image from disk.
    fn open(&self, path: &Path) -> Result<ImageHandle, BackendError>;

    /// Encode `image` to `path`.
    ///
    /// With `format` set, that encoding is used regardless of the file
    /// extension. Otherwise the extension decides, and a missing or unknown
    /// extension falls back to the image's [source format](ImageHandle::source_format).
    fn save(
        &self,
        image: &ImageHandle,
        path: &Path,
        format: Option<OutputFormat>,
    ) -> Result<(), BackendError>;
}
