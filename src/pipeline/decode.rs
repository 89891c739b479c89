//! Decoding: encoded bytes → `DynamicImage`, under a pixel budget.
//!
//! The format is taken from the magic bytes when they are recognisable, so a
//! mislabelled file still decodes; the declared encoding is only the
//! fallback. Header dimensions are checked against the budget before the
//! pixel buffer is allocated.

use crate::error::ItemError;
use crate::output::{Dimensions, ImageAsset};
use image::{DynamicImage, ImageReader, Limits};
use std::io::Cursor;
use tracing::debug;

/// Decode `asset`, refusing images larger than `max_pixels`.
pub fn decode_asset(asset: &ImageAsset, max_pixels: u64) -> Result<DynamicImage, ItemError> {
    if asset.is_empty() {
        return Err(ItemError::decode(format!("'{}' is empty", asset.name())));
    }

    let mut reader = ImageReader::new(Cursor::new(asset.bytes()))
        .with_guessed_format()
        .map_err(|e| ItemError::decode(format!("cannot read '{}': {e}", asset.name())))?;
    if reader.format().is_none() {
        reader.set_format(asset.encoding().image_format());
    }

    let header = reader
        .into_dimensions()
        .map_err(|e| ItemError::decode(format!("cannot read '{}' header: {e}", asset.name())))?;
    check_pixel_budget(Dimensions::new(header.0, header.1), max_pixels)?;

    // `into_dimensions` consumed the reader; open a fresh one for the pixels.
    let mut reader = ImageReader::new(Cursor::new(asset.bytes()))
        .with_guessed_format()
        .map_err(|e| ItemError::decode(format!("cannot read '{}': {e}", asset.name())))?;
    if reader.format().is_none() {
        reader.set_format(asset.encoding().image_format());
    }
    reader.limits(decoder_limits(max_pixels));

    let image = reader
        .decode()
        .map_err(|e| ItemError::decode(format!("'{}' is not a valid image: {e}", asset.name())))?;

    debug!(
        "Decoded '{}' ({:?}) → {}x{}",
        asset.name(),
        asset.encoding(),
        image.width(),
        image.height()
    );
    Ok(image)
}

fn check_pixel_budget(dims: Dimensions, max_pixels: u64) -> Result<(), ItemError> {
    let pixels = dims.width as u64 * dims.height as u64;
    if pixels == 0 {
        return Err(ItemError::decode(format!("image has zero size ({dims})")));
    }
    if pixels > max_pixels {
        return Err(ItemError::decode(format!(
            "image is {dims} ({pixels} pixels), limit is {max_pixels} pixels"
        )));
    }
    Ok(())
}

/// Allocation cap for the decoder: RGBA at 16 bits per channel, plus slack.
fn decoder_limits(max_pixels: u64) -> Limits {
    let mut limits = Limits::default();
    limits.max_alloc = Some(max_pixels.saturating_mul(8).saturating_add(64 * 1024 * 1024));
    limits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn decodes_valid_png() {
        let asset = ImageAsset::new(png_bytes(7, 5), Encoding::Png, "a.png");
        let img = decode_asset(&asset, 1_000).unwrap();
        assert_eq!((img.width(), img.height()), (7, 5));
    }

    #[test]
    fn magic_bytes_win_over_declared_encoding() {
        let asset = ImageAsset::new(png_bytes(3, 3), Encoding::Jpeg, "lies.jpg");
        assert!(decode_asset(&asset, 1_000).is_ok());
    }

    #[test]
    fn empty_asset_is_decode_error() {
        let asset = ImageAsset::new(Vec::new(), Encoding::Png, "empty.png");
        let err = decode_asset(&asset, 1_000).unwrap_err();
        assert!(matches!(err, ItemError::Decode { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let asset = ImageAsset::new(b"definitely not an image".to_vec(), Encoding::Png, "x.png");
        let err = decode_asset(&asset, 1_000).unwrap_err();
        assert!(matches!(err, ItemError::Decode { .. }));
    }

    #[test]
    fn pixel_budget_enforced_from_header() {
        let asset = ImageAsset::new(png_bytes(20, 20), Encoding::Png, "big.png");
        let err = decode_asset(&asset, 399).unwrap_err();
        assert!(err.to_string().contains("limit"), "got: {err}");
        assert!(decode_asset(&asset, 400).is_ok());
    }
}
