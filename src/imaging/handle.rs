//! Owned, decoded image passed between the backend and the filters.

use super::backend::{BackendError, Dimensions};
use super::params::{OutputFormat, Rect};
use image::DynamicImage;

/// One decoded image, its dimensions, and the container it was read from.
///
/// A handle is owned by exactly one pipeline step at a time. Transforms either
/// consume it and return a new handle ([`map`](Self::map), [`crop`](Self::crop))
/// or the backend opens a fresh one from disk. The source format survives
/// every transform, so an output without a format or extension keeps the
/// source's encoding.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    image: DynamicImage,
    source_format: Option<OutputFormat>,
}

impl ImageHandle {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            source_format: None,
        }
    }

    pub fn with_source_format(mut self, format: Option<OutputFormat>) -> Self {
        self.source_format = format;
        self
    }

    /// Encoding of the file this image was decoded from.
    pub fn source_format(&self) -> Option<OutputFormat> {
        self.source_format
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_inner(self) -> DynamicImage {
        self.image
    }

    /// Replace the pixels with the result of `f`.
    pub fn map(self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Self {
        Self::new(f(self.image)).with_source_format(self.source_format)
    }

    /// Like [`map`](Self::map) for transforms that can reject their input.
    pub fn try_map(
        self,
        f: impl FnOnce(DynamicImage) -> Result<DynamicImage, BackendError>,
    ) -> Result<Self, BackendError> {
        let source_format = self.source_format;
        f(self.image).map(|image| Self::new(image).with_source_format(source_format))
    }

    /// Cut out `rect`. Empty rectangles and rectangles extending past the
    /// image edge are rejected.
    pub fn crop(self, rect: Rect) -> Result<Self, BackendError> {
        if rect.width == 0 || rect.height == 0 {
            return Err(BackendError::InvalidGeometry(format!(
                "crop {}x{} is empty",
                rect.width, rect.height
            )));
        }
        let fits_x = rect.x.checked_add(rect.width).is_some_and(|r| r <= self.width());
        let fits_y = rect.y.checked_add(rect.height).is_some_and(|b| b <= self.height());
        if !fits_x || !fits_y {
            return Err(BackendError::InvalidGeometry(format!(
                "crop {}x{}+{}+{} exceeds {}x{} image",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                self.width(),
                self.height()
            )));
        }
        let cropped = self.image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        Ok(Self::new(cropped).with_source_format(self.source_format))
    }
}

impl From<DynamicImage> for ImageHandle {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(w: u32, h: u32) -> ImageHandle {
        ImageHandle::new(DynamicImage::new_rgb8(w, h))
    }

    #[test]
    fn reports_dimensions() {
        let h = handle(120, 80);
        assert_eq!(h.width(), 120);
        assert_eq!(h.height(), 80);
        assert_eq!(
            h.dimensions(),
            Dimensions {
                width: 120,
                height: 80
            }
        );
    }

    #[test]
    fn crop_inside_bounds() {
        let cropped = handle(100, 100)
            .crop(Rect {
                x: 66,
                y: 50,
                width: 33,
                height: 50,
            })
            .unwrap();
        assert_eq!((cropped.width(), cropped.height()), (33, 50));
    }

    #[test]
    fn crop_empty_rect_is_error() {
        let result = handle(10, 10).crop(Rect {
            x: 0,
            y: 0,
            width: 0,
            height: 5,
        });
        assert!(matches!(result, Err(BackendError::InvalidGeometry(_))));
    }

    #[test]
    fn crop_past_edge_is_error() {
        let result = handle(10, 10).crop(Rect {
            x: 5,
            y: 0,
            width: 6,
            height: 10,
        });
        assert!(matches!(result, Err(BackendError::InvalidGeometry(_))));
    }

    #[test]
    fn map_replaces_pixels() {
        let h = handle(10, 10).map(|img| img.resize_exact(4, 2, image::imageops::FilterType::Nearest));
        assert_eq!((h.width(), h.height()), (4, 2));
    }

    #[test]
    fn source_format_survives_transforms() {
        let h = handle(10, 10)
            .with_source_format(Some(OutputFormat::Tiff))
            .map(|img| img.grayscale())
            .try_map(Ok)
            .unwrap()
            .crop(Rect {
                x: 0,
                y: 0,
                width: 5,
                height: 5,
            })
            .unwrap();
        assert_eq!(h.source_format(), Some(OutputFormat::Tiff));
        assert_eq!(handle(1, 1).source_format(), None);
    }
}
