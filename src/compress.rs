//! Size-targeting compression: trade JPEG quality for a byte budget.
//!
//! The compressor re-runs [`crate::convert::convert`] at decreasing quality
//! until the output fits `target_bytes`. Dimensions never change, so there
//! is a floor below which the image cannot shrink; reaching it is a
//! best-effort result, not an error.
//!
//! Quality is tracked in integer hundredths so repeated `0.8 - 0.1 - 0.1 …`
//! lands on exact values instead of `0.20000005`.

use crate::batch::{run_items, BatchOptions};
use crate::config::{BackgroundColor, ConversionRequest, Encoding, DEFAULT_MAX_INPUT_PIXELS};
use crate::convert::convert;
use crate::error::ItemError;
use crate::output::ImageAsset;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default attempts before giving up on the target.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Knobs for [`compress_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressOptions {
    /// First quality tried. Default: 0.8.
    pub initial_quality: f32,

    /// Quality removed after each oversized attempt. Default: 0.1.
    pub step: f32,

    /// Lowest quality used; one final attempt runs here. Default: 0.1.
    pub floor: f32,

    /// Attempts before the floor is reached (0 is treated as 1). Default: 10.
    pub max_iterations: u32,

    /// Fill behind transparent pixels. Default: white.
    pub background: BackgroundColor,

    /// Decode budget for every attempt, in pixels. Default: 100 000 000.
    pub max_input_pixels: u64,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            initial_quality: 0.8,
            step: 0.1,
            floor: 0.1,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            background: BackgroundColor::WHITE,
            max_input_pixels: DEFAULT_MAX_INPUT_PIXELS,
        }
    }
}

impl CompressOptions {
    fn validate(&self) -> Result<(), ItemError> {
        let in_unit = |q: f32| q.is_finite() && (0.0..=1.0).contains(&q);
        if !in_unit(self.initial_quality) || !in_unit(self.floor) {
            return Err(ItemError::invalid(format!(
                "compression qualities must be within 0.0–1.0 (initial {}, floor {})",
                self.initial_quality, self.floor
            )));
        }
        if hundredths(self.initial_quality) < hundredths(self.floor) {
            return Err(ItemError::invalid(format!(
                "initial quality {} is below the floor {}",
                self.initial_quality, self.floor
            )));
        }
        if !self.step.is_finite() || hundredths(self.step) <= 0 {
            return Err(ItemError::invalid(format!(
                "compression step must be at least 0.01, got {}",
                self.step
            )));
        }
        if self.max_input_pixels == 0 {
            return Err(ItemError::invalid("decode budget must be at least 1 pixel"));
        }
        Ok(())
    }
}

/// Result of a compression run.
#[derive(Debug, Clone)]
pub struct Compressed {
    /// The JPEG produced by the last attempt.
    pub asset: ImageAsset,
    /// Quality of the returned asset.
    pub quality: f32,
    /// Number of conversions performed.
    pub attempts: u32,
    /// Whether `asset.len() <= target_bytes`.
    pub met_target: bool,
}

/// Compress `asset` to JPEG of at most `target_bytes`, best effort.
///
/// Starts at quality 0.8 and steps down by 0.1. Returns the first result
/// that fits. Once the next quality would be 0.1 or lower, one final
/// conversion at 0.1 is returned whatever its size.
///
/// Only a decode or encode failure is an `Err`; an unreachable target yields
/// `Ok` with `met_target == false`.
pub fn compress_to_target(
    asset: &ImageAsset,
    target_bytes: u64,
    max_iterations: u32,
) -> Result<Compressed, ItemError> {
    compress_with(
        asset,
        target_bytes,
        &CompressOptions {
            max_iterations,
            ..CompressOptions::default()
        },
    )
}

/// [`compress_to_target`] with explicit options.
pub fn compress_with(
    asset: &ImageAsset,
    target_bytes: u64,
    options: &CompressOptions,
) -> Result<Compressed, ItemError> {
    options.validate()?;

    let step = hundredths(options.step);
    let floor = hundredths(options.floor);
    let max_iterations = options.max_iterations.max(1);
    let mut quality = hundredths(options.initial_quality);
    let mut attempts = 0u32;
    let mut last: Option<Compressed> = None;

    info!(
        "Compressing '{}' ({} bytes) toward {} bytes",
        asset.name(),
        asset.len(),
        target_bytes
    );

    while attempts < max_iterations {
        if quality <= floor {
            debug!("'{}': reached quality floor", asset.name());
            return attempt(asset, floor, target_bytes, attempts + 1, options);
        }

        attempts += 1;
        let result = attempt(asset, quality, target_bytes, attempts, options)?;
        if result.met_target {
            return Ok(result);
        }
        last = Some(result);
        quality -= step;
    }

    match last {
        Some(result) => {
            debug!(
                "'{}': iterations exhausted at quality {:.2} ({} bytes)",
                asset.name(),
                result.quality,
                result.asset.len()
            );
            Ok(result)
        }
        // max_iterations >= 1 guarantees at least one attempt or floor return.
        None => attempt(asset, floor, target_bytes, 1, options),
    }
}

/// Run [`compress_with`] on the blocking thread pool.
pub async fn compress_to_target_async(
    asset: ImageAsset,
    target_bytes: u64,
    options: CompressOptions,
) -> Result<Compressed, ItemError> {
    tokio::task::spawn_blocking(move || compress_with(&asset, target_bytes, &options))
        .await
        .unwrap_or_else(|e| {
            Err(ItemError::Internal {
                detail: format!("compression task panicked: {e}"),
            })
        })
}

/// Compress every asset toward `target_bytes` under batch scheduling.
///
/// Concurrency, per-item timeout, cancellation and progress callbacks
/// behave exactly as in [`crate::batch::run_batch`]. Returns one result per
/// input, in input order.
pub async fn compress_batch(
    inputs: Vec<ImageAsset>,
    target_bytes: u64,
    options: &CompressOptions,
    batch: &BatchOptions,
) -> Vec<Result<Compressed, ItemError>> {
    let start = Instant::now();
    let total = inputs.len();
    info!(
        "Starting compression batch: {} images → ≤{} bytes each (concurrency {})",
        total, target_bytes, batch.concurrency
    );

    let options = options.clone();
    let work = move |asset: ImageAsset| compress_with(&asset, target_bytes, &options);
    let results: Vec<_> = run_items(inputs, batch, work)
        .await
        .into_iter()
        .map(|(_, result)| result)
        .collect();

    let met = results.iter().filter(|r| matches!(r, Ok(c) if c.met_target)).count();
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed == 0 {
        info!(
            "Compression batch complete: {}/{} met the target in {}ms",
            met,
            total,
            start.elapsed().as_millis()
        );
    } else {
        warn!(
            "Compression batch complete with {} failures ({}/{} met the target) in {}ms",
            failed,
            met,
            total,
            start.elapsed().as_millis()
        );
    }

    results
}

fn attempt(
    asset: &ImageAsset,
    quality_hundredths: i32,
    target_bytes: u64,
    attempts: u32,
    options: &CompressOptions,
) -> Result<Compressed, ItemError> {
    let quality = quality_hundredths as f32 / 100.0;
    let request = ConversionRequest {
        encoding: Encoding::Jpeg,
        quality,
        background: Some(options.background),
        max_input_pixels: options.max_input_pixels,
        ..ConversionRequest::default()
    };

    let (converted, _) = convert(asset, &request).into_result()?;
    let met_target = converted.len() as u64 <= target_bytes;
    debug!(
        "'{}': attempt {} at quality {:.2} → {} bytes",
        asset.name(),
        attempts,
        quality,
        converted.len()
    );

    Ok(Compressed {
        asset: converted,
        quality,
        attempts,
        met_target,
    })
}

fn hundredths(q: f32) -> i32 {
    (q * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::output::Dimensions;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn noisy_png(w: u32, h: u32) -> ImageAsset {
        let img = RgbaImage::from_fn(w, h, |x, y| {
            let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) as u8;
            Rgba([v, v.wrapping_mul(3), v.wrapping_add(91), 255])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        ImageAsset::new(buf, Encoding::Png, "noise.png")
    }

    #[test]
    fn generous_target_met_on_first_attempt() {
        let out = compress_to_target(&noisy_png(32, 32), u64::MAX, 10).unwrap();
        assert!(out.met_target);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.quality, 0.8);
        assert_eq!(out.asset.encoding(), Encoding::Jpeg);
    }

    #[test]
    fn unreachable_target_terminates_at_floor() {
        let out = compress_to_target(&noisy_png(32, 32), 1, 10).unwrap();
        assert!(!out.met_target);
        assert_eq!(out.quality, 0.1);
        // 0.8 … 0.2 is seven attempts, then the final one at 0.1.
        assert_eq!(out.attempts, 8);
        assert!(!out.asset.is_empty());
    }

    #[test]
    fn iteration_cap_returns_last_attempt() {
        let out = compress_to_target(&noisy_png(16, 16), 1, 3).unwrap();
        assert_eq!(out.attempts, 3);
        assert!((out.quality - 0.6).abs() < 1e-6);
    }

    #[test]
    fn zero_iterations_still_converts_once() {
        let out = compress_to_target(&noisy_png(8, 8), 1, 0).unwrap();
        assert_eq!(out.attempts, 1);
    }

    #[test]
    fn dimensions_are_preserved() {
        let out = compress_to_target(&noisy_png(40, 20), 1, 10).unwrap();
        assert_eq!(out.asset.dimensions(), Some(Dimensions::new(40, 20)));
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let junk = ImageAsset::new(b"nope".to_vec(), Encoding::Png, "x.png");
        let err = compress_to_target(&junk, 1000, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let opts = CompressOptions {
            step: 0.0,
            ..CompressOptions::default()
        };
        let err = compress_with(&noisy_png(4, 4), 10, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn async_variant_runs_on_blocking_pool() {
        let out = compress_to_target_async(noisy_png(16, 16), u64::MAX, CompressOptions::default())
            .await
            .unwrap();
        assert!(out.met_target);
    }

    #[test]
    fn initial_quality_below_floor_is_rejected() {
        let opts = CompressOptions {
            initial_quality: 0.05,
            floor: 0.1,
            ..CompressOptions::default()
        };
        let err = compress_with(&noisy_png(4, 4), 10, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn initial_quality_at_floor_makes_one_attempt() {
        let opts = CompressOptions {
            initial_quality: 0.1,
            ..CompressOptions::default()
        };
        let out = compress_with(&noisy_png(8, 8), 1, &opts).unwrap();
        assert_eq!(out.attempts, 1);
        assert!((out.quality - 0.1).abs() < 1e-6);
    }

    #[test]
    fn decode_budget_applies_to_every_attempt() {
        let opts = CompressOptions {
            max_input_pixels: 100,
            ..CompressOptions::default()
        };
        let err = compress_with(&noisy_png(20, 20), u64::MAX, &opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        let fits = compress_with(&noisy_png(10, 10), u64::MAX, &opts).unwrap();
        assert!(fits.met_target);
    }

    #[tokio::test]
    async fn batch_keeps_order_and_isolates_failures() {
        let junk = ImageAsset::new(b"nope".to_vec(), Encoding::Png, "junk.png");
        let inputs = vec![noisy_png(16, 16), junk, noisy_png(24, 8)];
        let batch = BatchOptions::builder().concurrency(3).build().unwrap();

        let results = compress_batch(inputs, u64::MAX, &CompressOptions::default(), &batch).await;

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap().asset.dimensions(),
            Some(Dimensions::new(16, 16))
        );
        assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::DecodeError);
        assert_eq!(
            results[2].as_ref().unwrap().asset.dimensions(),
            Some(Dimensions::new(24, 8))
        );
    }

    #[tokio::test]
    async fn batch_honours_cancellation() {
        let token = crate::batch::CancelToken::new();
        token.cancel();
        let batch = BatchOptions::builder().cancel_token(token).build().unwrap();

        let results = compress_batch(vec![noisy_png(8, 8)], 1, &CompressOptions::default(), &batch).await;
        assert_eq!(results[0].as_ref().unwrap_err().kind(), ErrorKind::Cancelled);
    }
}
