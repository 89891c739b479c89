//! Target-size computation and high-quality resampling.
//!
//! Sizing is pure arithmetic and lives apart from the pixel work so it can be
//! tested exhaustively without touching a codec.
//!
//! Resampling uses `fast_image_resize` convolution filters. If it reports an
//! error the stage falls back to `image::imageops::resize` with the
//! equivalent filter rather than failing the conversion.

use crate::config::{ConversionRequest, FitMode, ResizeFilter};
use crate::error::ItemError;
use crate::output::Dimensions;
use fast_image_resize as fr;
use image::imageops::FilterType;
use image::RgbaImage;
use tracing::{debug, warn};

/// Compute the output size for a source of `src` pixels.
///
/// Never enlarges, never returns a zero dimension.
pub fn target_dimensions(src: Dimensions, request: &ConversionRequest) -> Dimensions {
    match request.fit {
        FitMode::Sequential => sequential_fit(src, request.max_width, request.max_height),
        FitMode::Contain => contain_fit(src, request.max_width, request.max_height),
    }
}

/// Two independent shrink passes: width first, then the scaled height.
fn sequential_fit(src: Dimensions, max_width: Option<u32>, max_height: Option<u32>) -> Dimensions {
    let (mut width, mut height) = (src.width, src.height);

    if let Some(max_w) = max_width {
        if width > max_w {
            height = scale_side(height, max_w, width);
            width = max_w;
        }
    }
    if let Some(max_h) = max_height {
        if height > max_h {
            width = scale_side(width, max_h, height);
            height = max_h;
        }
    }

    Dimensions::new(width, height)
}

/// Single scale factor: the tighter of the two ratios, capped at 1.
fn contain_fit(src: Dimensions, max_width: Option<u32>, max_height: Option<u32>) -> Dimensions {
    let w_ratio = max_width.map_or(1.0, |m| m as f64 / src.width as f64);
    let h_ratio = max_height.map_or(1.0, |m| m as f64 / src.height as f64);
    let scale = w_ratio.min(h_ratio);
    if scale >= 1.0 {
        return src;
    }

    // The binding side is set exactly so float error cannot push it over.
    if w_ratio <= h_ratio {
        let max_w = max_width.unwrap_or(src.width);
        Dimensions::new(max_w, scale_side(src.height, max_w, src.width))
    } else {
        let max_h = max_height.unwrap_or(src.height);
        Dimensions::new(scale_side(src.width, max_h, src.height), max_h)
    }
}

/// `round(side * num / den)`, at least 1.
fn scale_side(side: u32, num: u32, den: u32) -> u32 {
    let scaled = (side as u64 * num as u64 * 2 + den as u64) / (den as u64 * 2);
    scaled.clamp(1, u32::MAX as u64) as u32
}

/// Resample `src` to exactly `target` pixels.
///
/// Returns the input untouched when no size change is needed.
pub fn resample(src: RgbaImage, target: Dimensions, filter: ResizeFilter) -> Result<RgbaImage, ItemError> {
    if src.dimensions() == (target.width, target.height) {
        return Ok(src);
    }

    debug!(
        "Resampling {}x{} → {} ({:?})",
        src.width(),
        src.height(),
        target,
        filter
    );

    match resample_convolution(&src, target, filter) {
        Ok(resized) => Ok(resized),
        Err(detail) => {
            warn!("fast_image_resize failed, falling back to imageops: {detail}");
            Ok(image::imageops::resize(
                &src,
                target.width,
                target.height,
                to_image_filter(filter),
            ))
        }
    }
}

fn resample_convolution(src: &RgbaImage, target: Dimensions, filter: ResizeFilter) -> Result<RgbaImage, String> {
    let (src_width, src_height) = src.dimensions();
    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| format!("source buffer: {e}"))?;

    let mut dst_image = fr::images::Image::new(target.width, target.height, fr::PixelType::U8x4);

    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));
    fr::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| format!("resize: {e}"))?;

    RgbaImage::from_raw(target.width, target.height, dst_image.into_vec())
        .ok_or_else(|| "output buffer length mismatch".to_string())
}

fn to_fast_filter(filter: ResizeFilter) -> fr::FilterType {
    match filter {
        ResizeFilter::Bilinear => fr::FilterType::Bilinear,
        ResizeFilter::CatmullRom => fr::FilterType::CatmullRom,
        ResizeFilter::Mitchell => fr::FilterType::Mitchell,
        ResizeFilter::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

fn to_image_filter(filter: ResizeFilter) -> FilterType {
    match filter {
        ResizeFilter::Bilinear => FilterType::Triangle,
        ResizeFilter::CatmullRom => FilterType::CatmullRom,
        ResizeFilter::Mitchell => FilterType::Gaussian,
        ResizeFilter::Lanczos3 => FilterType::Lanczos3,
    }
}
