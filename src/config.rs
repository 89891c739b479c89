//! Configuration types for a single image conversion.
//!
//! Everything that shapes one conversion lives in [`ConversionRequest`],
//! built via its [`ConversionRequestBuilder`]. The request is a plain value:
//! it is cloned into every batch worker and never mutated by the pipeline.
//!
//! The builder rejects a bad request up front with
//! [`ImgConvError::InvalidConfig`]. Fields are public, so
//! [`crate::convert::convert`] re-checks every request and turns a violation
//! into an `InvalidRequest` outcome before any decode happens.

use crate::error::{ImgConvError, ItemError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default decode budget: 100 megapixels.
pub const DEFAULT_MAX_INPUT_PIXELS: u64 = 100_000_000;

/// Default quality factor, matching what browsers use for lossy canvas export.
pub const DEFAULT_QUALITY: f32 = 0.92;

/// Parameters for converting one image.
///
/// # Example
/// ```rust
/// use imgconv::{BackgroundColor, ConversionRequest, Encoding};
///
/// let request = ConversionRequest::builder()
///     .encoding(Encoding::Jpeg)
///     .quality(0.75)
///     .max_width(1600)
///     .background(BackgroundColor::WHITE)
///     .build()
///     .unwrap();
/// assert_eq!(request.max_width, Some(1600));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Output encoding. Default: [`Encoding::Png`].
    pub encoding: Encoding,

    /// Quality factor in `[0.0, 1.0]`. Default: 0.92.
    ///
    /// Only lossy encodings use it; PNG, BMP and GIF ignore it.
    pub quality: f32,

    /// Maximum output width in pixels (> 0). Larger images are scaled down.
    pub max_width: Option<u32>,

    /// Maximum output height in pixels (> 0). Larger images are scaled down.
    pub max_height: Option<u32>,

    /// Solid fill behind transparent pixels, used only when the target
    /// encoding cannot represent alpha.
    pub background: Option<BackgroundColor>,

    /// How `max_width` and `max_height` combine. Default: [`FitMode::Sequential`].
    pub fit: FitMode,

    /// Resampling filter used when the size changes. Default: [`ResizeFilter::CatmullRom`].
    pub filter: ResizeFilter,

    /// Decode budget in pixels (`width * height`). Default: 100 000 000.
    ///
    /// Header dimensions beyond this are refused before the pixel buffer is
    /// allocated, so a hostile file cannot exhaust memory.
    pub max_input_pixels: u64,
}

impl Default for ConversionRequest {
    fn default() -> Self {
        Self {
            encoding: Encoding::Png,
            quality: DEFAULT_QUALITY,
            max_width: None,
            max_height: None,
            background: None,
            fit: FitMode::default(),
            filter: ResizeFilter::default(),
            max_input_pixels: DEFAULT_MAX_INPUT_PIXELS,
        }
    }
}

impl ConversionRequest {
    /// Create a new builder for `ConversionRequest`.
    pub fn builder() -> ConversionRequestBuilder {
        ConversionRequestBuilder {
            request: Self::default(),
        }
    }

    /// Check the request invariants.
    ///
    /// Called by the pipeline before touching the input bytes.
    pub fn validate(&self) -> Result<(), ItemError> {
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(ItemError::invalid(format!(
                "quality must be within 0.0–1.0, got {}",
                self.quality
            )));
        }
        if self.max_width == Some(0) {
            return Err(ItemError::invalid("max_width must be greater than 0"));
        }
        if self.max_height == Some(0) {
            return Err(ItemError::invalid("max_height must be greater than 0"));
        }
        if self.max_input_pixels == 0 {
            return Err(ItemError::invalid("max_input_pixels must be greater than 0"));
        }
        Ok(())
    }

    /// Whether the background fill applies to this request.
    pub fn flattens_alpha(&self) -> bool {
        self.background.is_some() && !self.encoding.supports_alpha()
    }
}

/// Builder for [`ConversionRequest`].
#[derive(Debug)]
pub struct ConversionRequestBuilder {
    request: ConversionRequest,
}

impl ConversionRequestBuilder {
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.request.encoding = encoding;
        self
    }

    pub fn quality(mut self, quality: f32) -> Self {
        self.request.quality = quality;
        self
    }

    pub fn max_width(mut self, px: u32) -> Self {
        self.request.max_width = Some(px);
        self
    }

    pub fn max_height(mut self, px: u32) -> Self {
        self.request.max_height = Some(px);
        self
    }

    pub fn background(mut self, color: BackgroundColor) -> Self {
        self.request.background = Some(color);
        self
    }

    pub fn fit(mut self, fit: FitMode) -> Self {
        self.request.fit = fit;
        self
    }

    pub fn filter(mut self, filter: ResizeFilter) -> Self {
        self.request.filter = filter;
        self
    }

    pub fn max_input_pixels(mut self, pixels: u64) -> Self {
        self.request.max_input_pixels = pixels;
        self
    }

    /// Build the request, validating constraints.
    pub fn build(self) -> Result<ConversionRequest, ImgConvError> {
        self.request
            .validate()
            .map_err(|e| ImgConvError::InvalidConfig(e.to_string()))?;
        Ok(self.request)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The closed set of raster encodings the pipeline reads and writes.
///
/// Every dispatch on an encoding is an exhaustive `match`, so adding a
/// variant fails to compile until each stage handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Png,
    Jpeg,
    WebP,
    Bmp,
    Gif,
}

impl Encoding {
    pub const ALL: [Encoding; 5] = [
        Encoding::Png,
        Encoding::Jpeg,
        Encoding::WebP,
        Encoding::Bmp,
        Encoding::Gif,
    ];

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Png => "png",
            Encoding::Jpeg => "jpg",
            Encoding::WebP => "webp",
            Encoding::Bmp => "bmp",
            Encoding::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Encoding::Png => "image/png",
            Encoding::Jpeg => "image/jpeg",
            Encoding::WebP => "image/webp",
            Encoding::Bmp => "image/bmp",
            Encoding::Gif => "image/gif",
        }
    }

    /// Whether encoded output can keep an alpha channel.
    pub fn supports_alpha(self) -> bool {
        match self {
            Encoding::Png | Encoding::WebP | Encoding::Gif => true,
            Encoding::Jpeg | Encoding::Bmp => false,
        }
    }

    /// Whether the quality factor affects the encoded output.
    pub fn is_lossy(self) -> bool {
        match self {
            Encoding::Jpeg | Encoding::WebP => true,
            Encoding::Png | Encoding::Bmp | Encoding::Gif => false,
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            Encoding::Png => image::ImageFormat::Png,
            Encoding::Jpeg => image::ImageFormat::Jpeg,
            Encoding::WebP => image::ImageFormat::WebP,
            Encoding::Bmp => image::ImageFormat::Bmp,
            Encoding::Gif => image::ImageFormat::Gif,
        }
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(Encoding::Png),
            image::ImageFormat::Jpeg => Some(Encoding::Jpeg),
            image::ImageFormat::WebP => Some(Encoding::WebP),
            image::ImageFormat::Bmp => Some(Encoding::Bmp),
            image::ImageFormat::Gif => Some(Encoding::Gif),
            _ => None,
        }
    }
}

impl FromStr for Encoding {
    type Err = ImgConvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "png" => Ok(Encoding::Png),
            "jpg" | "jpeg" => Ok(Encoding::Jpeg),
            "webp" => Ok(Encoding::WebP),
            "bmp" => Ok(Encoding::Bmp),
            "gif" => Ok(Encoding::Gif),
            _ => Err(ImgConvError::UnsupportedEncoding {
                name: s.trim().to_string(),
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How the two maximum dimensions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Clamp width first, then clamp the already-scaled height. (default)
    ///
    /// Two independent shrink passes, each rounding on its own. Kept as the
    /// default so output sizes match the established behaviour.
    #[default]
    Sequential,
    /// One scale factor, the smaller of the two ratios.
    Contain,
}

/// Convolution filter used for resampling. Nearest-neighbour is deliberately
/// not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Bilinear,
    /// Bicubic, sharp and fast. (default)
    #[default]
    CatmullRom,
    Mitchell,
    Lanczos3,
}

/// An opaque RGB fill colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const WHITE: BackgroundColor = BackgroundColor::rgb(255, 255, 255);
    pub const BLACK: BackgroundColor = BackgroundColor::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for BackgroundColor {
    type Err = ImgConvError;

    /// Accepts `#rgb`, `#rrggbb` (the hash is optional), `white` and `black`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ImgConvError::InvalidConfig(format!("invalid background colour '{trimmed}'"));

        match trimmed.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            _ => {}
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}
