//! Raster surface preparation for encodings without an alpha channel.
//!
//! Conceptually the surface is filled with the background colour and the
//! resampled image is drawn on top. Doing it as a per-pixel "source over"
//! blend gives the same pixels without a second full-size buffer pass.

use crate::config::BackgroundColor;
use image::{Rgb, RgbImage, RgbaImage};

/// Composite `src` over a solid `background`, dropping the alpha channel.
pub fn flatten_onto(src: &RgbaImage, background: BackgroundColor) -> RgbImage {
    let bg = [background.r, background.g, background.b];
    RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let px = src.get_pixel(x, y);
        let alpha = px[3] as u32;
        let mut out = [0u8; 3];
        for (c, slot) in out.iter_mut().enumerate() {
            let blended = px[c] as u32 * alpha + bg[c] as u32 * (255 - alpha);
            *slot = ((blended + 127) / 255) as u8;
        }
        Rgb(out)
    })
}
