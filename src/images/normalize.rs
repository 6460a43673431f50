/// Image normalization for the catalog cache
///
/// Every fetched image is brought into one shape before it is cached:
/// - Decoded from whatever format the server sent
/// - Converted to 8-bit RGB
/// - Resized to a fixed multiple of the printed cell size
/// - Re-encoded as high quality JPEG

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, ImageResult, Rgb, RgbImage};

use crate::catalog::settings::{FetchSettings, LayoutSettings};
use crate::color::Swatch;

/// Target pixel size and encoding of cached images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl ImageSpec {
    /// Display size scaled by the upscale factor, so print stays sharp
    pub fn from_settings(layout: &LayoutSettings, fetch: &FetchSettings) -> Self {
        Self {
            width: (layout.image_width.round().max(1.0) as u32) * fetch.upscale,
            height: (layout.image_height.round().max(1.0) as u32) * fetch.upscale,
            quality: fetch.jpeg_quality,
        }
    }
}

/// Decode `bytes`, normalize, and write the JPEG to `path`
pub fn normalize_to_file(bytes: &[u8], spec: ImageSpec, path: &Path) -> ImageResult<()> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(&rgb, spec.width, spec.height, FilterType::Lanczos3);
    write_jpeg(&resized, spec.quality, path)
}

/// Solid neutral block at the cache resolution
pub fn write_placeholder(spec: ImageSpec, color: Swatch, path: &Path) -> ImageResult<()> {
    let block = RgbImage::from_pixel(spec.width, spec.height, Rgb([color.r, color.g, color.b]));
    write_jpeg(&block, spec.quality, path)
}

fn write_jpeg(img: &RgbImage, quality: u8, path: &Path) -> ImageResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, quality).encode_image(img)?;
    writer.flush()?;
    Ok(())
}
