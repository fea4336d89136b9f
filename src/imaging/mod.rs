//! Image processing in pure Rust, no external tools.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Resize** | `DynamicImage::resize_exact` (Lanczos3) |
//! | **Thumbnail** | fit + `imageops::overlay` on a white canvas |
//! | **Sketch / Charcoal** | 3×3 Laplacian edge, invert, stretch, grayscale, blur |
//! | **Normalize / Level** | 256-entry lookup tables |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and level math (unit testable)
//! - **Parameters**: Small value types describing encodings and geometry
//! - **Handle**: [`ImageHandle`], the owned decoded image passed between stages
//! - **Filters**: Pixel transforms over `DynamicImage`
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
pub mod calculations;
pub mod filters;
pub mod handle;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use handle::ImageHandle;
pub use params::{LevelParams, OutputFormat, Quality, Rect};
pub use rust_backend::RustBackend;
