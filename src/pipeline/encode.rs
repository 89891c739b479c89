//! Encoding: raster surface → bytes in the requested encoding.
//!
//! Quality handling per encoding:
//!
//! | Encoding | Quality factor `q` |
//! |----------|--------------------|
//! | JPEG     | `round(q * 100)`, clamped to 1–100 |
//! | WebP     | lossless container; for `q < 1` RGB is first quantized to fewer levels |
//! | PNG, BMP, GIF | ignored (lossless or palette) |
//!
//! The `image` crate only ships a lossless WebP encoder. Quantizing the
//! colour channels before encoding lets the quality knob still trade detail
//! for size without pulling in libwebp.

use crate::config::Encoding;
use crate::error::ItemError;
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use tracing::debug;

/// The drawn pixels, with or without alpha.
pub enum Surface {
    Rgba(RgbaImage),
    /// Already flattened onto a background.
    Rgb(RgbImage),
}

impl Surface {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Surface::Rgba(img) => img.dimensions(),
            Surface::Rgb(img) => img.dimensions(),
        }
    }

    fn into_rgb(self) -> RgbImage {
        match self {
            Surface::Rgb(img) => img,
            Surface::Rgba(img) => DynamicImage::ImageRgba8(img).to_rgb8(),
        }
    }

    fn into_rgba(self) -> RgbaImage {
        match self {
            Surface::Rgba(img) => img,
            Surface::Rgb(img) => DynamicImage::ImageRgb8(img).to_rgba8(),
        }
    }
}

/// Map a `[0, 1]` quality factor to the JPEG 1–100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    ((quality * 100.0).round() as i32).clamp(1, 100) as u8
}

/// Encode `surface` as `encoding` at `quality`.
pub fn encode_surface(surface: Surface, encoding: Encoding, quality: f32) -> Result<Vec<u8>, ItemError> {
    let (width, height) = surface.dimensions();
    let mut buf = Vec::new();

    let result = match encoding {
        Encoding::Jpeg => {
            let rgb = surface.into_rgb();
            JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality)).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        Encoding::Png => {
            let rgba = surface.into_rgba();
            PngEncoder::new(&mut buf).write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
        }
        Encoding::WebP => {
            let mut rgba = surface.into_rgba();
            if quality < 1.0 {
                quantize_rgb(&mut rgba, quality);
            }
            WebPEncoder::new_lossless(&mut buf).write_image(
                rgba.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )
        }
        Encoding::Bmp => {
            let rgb = surface.into_rgb();
            BmpEncoder::new(&mut buf).write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        }
        Encoding::Gif => {
            let rgba = surface.into_rgba();
            // The trailer is written when the encoder drops, so keep it scoped.
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.encode(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
        }
    };

    result.map_err(|e| ItemError::encode(format!("{} encoding failed: {e}", encoding.extension())))?;

    if buf.is_empty() {
        return Err(ItemError::encode(format!(
            "{} encoder produced no data",
            encoding.extension()
        )));
    }

    debug!("Encoded {}x{} → {} bytes {}", width, height, buf.len(), encoding);
    Ok(buf)
}

/// Snap each colour channel to one of `levels` evenly spaced values.
fn quantize_rgb(image: &mut RgbaImage, quality: f32) {
    let levels = quantize_levels(quality);
    if levels >= 256 {
        return;
    }
    let step = 255.0 / (levels as f32 - 1.0);
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Quadratic curve: fine palettes at high quality, coarse ones near zero.
fn quantize_levels(quality: f32) -> u16 {
    let q = quality.clamp(0.0, 1.0);
    (2.0 + q * q * 254.0).round().clamp(2.0, 256.0) as u16
}
