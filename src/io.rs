// ============================================================================
// HOST RASTER BOUNDARY — where pixels enter and leave the editing core
// ============================================================================
//
// The core only ever sees a synchronous get/set pair.  `ImageFileSurface`
// backs it with image files for the batch binary; an embedding host can
// implement `RasterSurface` over its own canvas.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageError, ImageFormat, RgbaImage};

use crate::canvas::PixelBuffer;
use crate::error::EditError;
use crate::log_info;
use crate::workspace::Workspace;

pub trait RasterSurface {
    /// Read the surface's current pixels.
    fn get_pixel_buffer(&mut self) -> Result<PixelBuffer, EditError>;
    /// Replace the surface's pixels.
    fn set_pixel_buffer(&mut self, buffer: &PixelBuffer) -> Result<(), EditError>;
}

impl Workspace {
    /// Open a document whose single "Background" layer holds the surface's
    /// pixels.
    pub fn from_surface(surface: &mut dyn RasterSurface) -> Result<Self, EditError> {
        let pixels = surface.get_pixel_buffer()?;
        log_info!("Loaded {}x{} pixels from surface", pixels.width(), pixels.height());
        Self::from_pixels(pixels)
    }

    /// Push the composite to the surface.
    pub fn present(&self, surface: &mut dyn RasterSurface) -> Result<(), EditError> {
        surface.set_pixel_buffer(&self.composite())
    }
}

// ============================================================================
// IN-MEMORY SURFACE
// ============================================================================

/// Surface that simply holds the last buffer it was given.
#[derive(Clone, Debug, Default)]
pub struct MemorySurface {
    buffer: Option<PixelBuffer>,
}

impl MemorySurface {
    pub fn new(buffer: PixelBuffer) -> Self {
        Self { buffer: Some(buffer) }
    }

    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }
}

impl RasterSurface for MemorySurface {
    fn get_pixel_buffer(&mut self) -> Result<PixelBuffer, EditError> {
        self.buffer
            .clone()
            .ok_or_else(|| EditError::Image("surface holds no pixels".to_string()))
    }

    fn set_pixel_buffer(&mut self, buffer: &PixelBuffer) -> Result<(), EditError> {
        self.buffer = Some(buffer.clone());
        Ok(())
    }
}

// ============================================================================
// FILE-BACKED SURFACE
// ============================================================================

/// Output encodings supported by `ImageFileSurface`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Parse a format name or file extension.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpeg" | "jpg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tiff" | "tif" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }

    /// Infer from a path's extension, defaulting to PNG.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_name)
            .unwrap_or(SaveFormat::Png)
    }
}

/// Reads from one image file and writes to another (possibly the same).
#[derive(Clone, Debug)]
pub struct ImageFileSurface {
    source: PathBuf,
    target: PathBuf,
    format: SaveFormat,
    quality: u8,
}

impl ImageFileSurface {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        Self {
            format: SaveFormat::from_path(&target),
            source: source.into(),
            target,
            quality: 90,
        }
    }

    pub fn with_format(mut self, format: SaveFormat) -> Self {
        self.format = format;
        self
    }

    /// JPEG quality, 1..=100.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl RasterSurface for ImageFileSurface {
    fn get_pixel_buffer(&mut self) -> Result<PixelBuffer, EditError> {
        let img = image::open(&self.source)?;
        PixelBuffer::from_rgba_image(img.to_rgba8())
    }

    fn set_pixel_buffer(&mut self, buffer: &PixelBuffer) -> Result<(), EditError> {
        encode_and_write(buffer.as_rgba_image(), &self.target, self.format, self.quality)?;
        log_info!("Wrote {}", self.target.display());
        Ok(())
    }
}

/// Encode and write an image to a file.
pub fn encode_and_write(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
        SaveFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
        SaveFormat::Tga => {
            let encoder = TgaEncoder::new(&mut writer);
            encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
        }
        SaveFormat::Webp => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save_with_format(path, ImageFormat::WebP)?;
        }
        SaveFormat::Tiff => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save_with_format(path, ImageFormat::Tiff)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn workspace_round_trips_through_a_memory_surface() {
        let src = PixelBuffer::new_filled(3, 2, Rgba([10, 20, 30, 255])).unwrap();
        let mut surface = MemorySurface::new(src.clone());
        let ws = Workspace::from_surface(&mut surface).unwrap();
        assert_eq!(ws.dimensions(), (3, 2));

        let mut out = MemorySurface::default();
        ws.present(&mut out).unwrap();
        assert_eq!(out.buffer(), Some(&src));
        assert!(MemorySurface::default().get_pixel_buffer().is_err());
    }

    #[test]
    fn format_is_inferred_from_the_extension() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.JPG")), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("noext")), SaveFormat::Png);
        assert_eq!(SaveFormat::from_name("tif"), Some(SaveFormat::Tiff));
    }
}
