// ============================================================================
// PIXEL BUFFERS AND LAYERS
// ============================================================================

use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::error::EditError;

/// Fully transparent black, the initial content of every new buffer.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Fixed-size RGBA raster, row-major, 4 bytes per pixel.
///
/// The backing storage is always exactly `width * height * 4` bytes; a
/// buffer is never resized in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Create a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Result<Self, EditError> {
        Self::new_filled(width, height, TRANSPARENT)
    }

    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Result<Self, EditError> {
        if width == 0 || height == 0 {
            return Err(EditError::InvalidDimensions { width, height });
        }
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, color),
        })
    }

    /// Wrap a decoded image.  Zero-sized images are rejected.
    pub fn from_rgba_image(image: RgbaImage) -> Result<Self, EditError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 || Some(image.as_raw().len()) != byte_len(width, height) {
            return Err(EditError::InvalidDimensions { width, height });
        }
        Ok(Self { image })
    }

    /// Build from raw interleaved RGBA bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, EditError> {
        if width == 0 || height == 0 || Some(data.len()) != byte_len(width, height) {
            return Err(EditError::InvalidDimensions { width, height });
        }
        RgbaImage::from_raw(width, height, data)
            .map(|image| Self { image })
            .ok_or(EditError::InvalidDimensions { width, height })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height()
    }

    /// Read a pixel.  Out-of-range coordinates are an error, never clamped.
    pub fn get(&self, x: u32, y: u32) -> Result<Rgba<u8>, EditError> {
        self.check_bounds(x, y)?;
        Ok(*self.image.get_pixel(x, y))
    }

    /// Write a pixel.  Out-of-range coordinates are an error, never clamped.
    pub fn set(&mut self, x: u32, y: u32, color: Rgba<u8>) -> Result<(), EditError> {
        self.check_bounds(x, y)?;
        self.image.put_pixel(x, y, color);
        Ok(())
    }

    /// Unchecked read for hot loops that already clipped their coordinates.
    #[inline]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    #[inline]
    pub(crate) fn put(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        self.image.put_pixel(x, y, color);
    }

    /// Fill every pixel with `color`.
    pub fn fill(&mut self, color: Rgba<u8>) {
        for p in self.image.pixels_mut() {
            *p = color;
        }
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub(crate) fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.image
    }

    /// Bytes held by the pixel data.
    pub fn memory_bytes(&self) -> usize {
        self.image.as_raw().len()
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<(), EditError> {
        if self.contains(x, y) {
            Ok(())
        } else {
            Err(EditError::OutOfBounds {
                x,
                y,
                width: self.width(),
                height: self.height(),
            })
        }
    }
}

// ============================================================================
// LAYERS
// ============================================================================

/// Stable identity of a layer.  Never reused, never changes while the layer
/// lives, and survives reordering (unlike a stack index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The short form is enough to tell layers apart in logs.
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

/// Exact storage size of a `width × height` RGBA buffer, `None` on overflow.
fn byte_len(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(4)
}

/// A named raster in the workspace's layer stack.  Stack position is the
/// layer's index in `Workspace::layers()` (0 = bottom).
#[derive(Clone, Debug)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    pub visible: bool,
    pub pixels: PixelBuffer,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, fill_color: Rgba<u8>) -> Result<Self, EditError> {
        Ok(Self::from_pixels(name, PixelBuffer::new_filled(width, height, fill_color)?))
    }

    pub fn from_pixels(name: impl Into<String>, pixels: PixelBuffer) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: true,
            pixels,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Copy of this layer's content under a fresh identity.
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: self.visible,
            pixels: self.pixels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_has_exact_length() {
        let buf = PixelBuffer::new(7, 3).unwrap();
        assert_eq!(buf.as_raw().len(), 7 * 3 * 4);
        assert_eq!(buf.get(6, 2).unwrap(), TRANSPARENT);
    }

    #[test]
    fn zero_sized_buffer_is_rejected() {
        assert!(matches!(
            PixelBuffer::new(0, 4),
            Err(EditError::InvalidDimensions { width: 0, height: 4 })
        ));
    }

    #[test]
    fn out_of_range_access_is_a_bounds_error() {
        let mut buf = PixelBuffer::new(2, 2).unwrap();
        assert!(matches!(buf.get(2, 0), Err(EditError::OutOfBounds { x: 2, y: 0, .. })));
        assert!(buf.set(0, 5, Rgba([1, 2, 3, 4])).is_err());
        // Nothing was clamped into range.
        assert!(buf.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn set_then_get_and_clone_are_independent() {
        let mut buf = PixelBuffer::new(3, 3).unwrap();
        buf.set(1, 2, Rgba([10, 20, 30, 40])).unwrap();
        let copy = buf.clone();
        buf.fill(Rgba([255, 255, 255, 255]));
        assert_eq!(copy.get(1, 2).unwrap(), Rgba([10, 20, 30, 40]));
        assert_eq!(buf.get(1, 2).unwrap(), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 15]).is_err());
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            PixelBuffer::from_raw(2, 2, vec![7; 20]),
            Err(EditError::InvalidDimensions { width: 2, height: 2 })
        ));
    }

    #[test]
    fn oversized_image_storage_is_rejected() {
        let image = RgbaImage::from_raw(2, 2, vec![7; 20]).unwrap();
        assert_eq!(image.as_raw().len(), 20);
        assert!(PixelBuffer::from_rgba_image(image).is_err());
        let exact = RgbaImage::from_raw(2, 2, vec![7; 16]).unwrap();
        assert_eq!(PixelBuffer::from_rgba_image(exact).unwrap().as_raw().len(), 16);
    }

    #[test]
    fn duplicate_gets_fresh_identity() {
        let layer = Layer::new("Background", 2, 2, Rgba([1, 1, 1, 255])).unwrap();
        let copy = layer.duplicate("Background copy");
        assert_ne!(layer.id(), copy.id());
        assert_eq!(layer.pixels, copy.pixels);
    }
}
