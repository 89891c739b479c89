//! Single-image conversion entry points.
//!
//! [`convert`] is the whole pipeline for one asset: validate, decode, size,
//! resample, flatten, encode. It never returns `Err` and a panic inside a
//! codec is caught; every failure becomes a [`ConversionOutcome::Failure`]
//! carrying the reason.
//!
//! Decoding and encoding are CPU-bound. [`convert_async`] moves the work onto
//! Tokio's blocking pool so async callers don't stall a worker thread.

use crate::config::ConversionRequest;
use crate::error::ItemError;
use crate::output::{output_name, ConversionOutcome, Dimensions, ImageAsset};
use crate::pipeline::encode::{encode_surface, Surface};
use crate::pipeline::{decode, resize, surface};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, warn};

/// Convert one asset according to `request`.
///
/// The request is validated before the input bytes are looked at, so an
/// invalid request fails with `InvalidRequest` even for undecodable input.
/// All intermediate buffers are owned by this call and dropped before it
/// returns.
///
/// # Example
/// ```rust,no_run
/// use imgconv::{convert, ConversionOutcome, ConversionRequest, Encoding, ImageAsset};
///
/// let bytes = std::fs::read("photo.png").unwrap();
/// let asset = ImageAsset::new(bytes, Encoding::Png, "photo.png");
/// let request = ConversionRequest::builder()
///     .encoding(Encoding::Jpeg)
///     .quality(0.8)
///     .max_width(800)
///     .build()
///     .unwrap();
///
/// match convert(&asset, &request) {
///     ConversionOutcome::Success { asset, output_name } => {
///         std::fs::write(output_name, asset.bytes()).unwrap();
///     }
///     ConversionOutcome::Failure { input_name, error } => eprintln!("{input_name}: {error}"),
/// }
/// ```
pub fn convert(asset: &ImageAsset, request: &ConversionRequest) -> ConversionOutcome {
    let start = Instant::now();
    match contain_panics(|| run_pipeline(asset, request)) {
        Ok(converted) => {
            debug!(
                "Converted '{}' → {} ({} bytes) in {}ms",
                asset.name(),
                request.encoding,
                converted.len(),
                start.elapsed().as_millis()
            );
            ConversionOutcome::Success {
                output_name: output_name(asset.name(), request.encoding),
                asset: converted,
            }
        }
        Err(error) => {
            warn!("Conversion of '{}' failed: {}", asset.name(), error);
            ConversionOutcome::Failure {
                input_name: asset.name().to_string(),
                error,
            }
        }
    }
}

/// Run [`convert`] on the blocking thread pool.
///
/// A panic inside the worker is reported as an `Internal` failure instead of
/// unwinding into the caller.
pub async fn convert_async(asset: ImageAsset, request: ConversionRequest) -> ConversionOutcome {
    let input_name = asset.name().to_string();
    tokio::task::spawn_blocking(move || convert(&asset, &request))
        .await
        .unwrap_or_else(|e| ConversionOutcome::Failure {
            input_name,
            error: ItemError::Internal {
                detail: format!("conversion task panicked: {e}"),
            },
        })
}

/// Run `stage`, turning a panic into an `Internal` item error.
///
/// Codec and resampler bugs must not unwind through a batch.
fn contain_panics<T>(stage: impl FnOnce() -> Result<T, ItemError>) -> Result<T, ItemError> {
    panic::catch_unwind(AssertUnwindSafe(stage)).unwrap_or_else(|payload| {
        Err(ItemError::Internal {
            detail: format!("conversion panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

fn run_pipeline(asset: &ImageAsset, request: &ConversionRequest) -> Result<ImageAsset, ItemError> {
    // ── Step 1: Validate request before any decode ───────────────────────
    request.validate()?;

    // ── Step 2: Decode ───────────────────────────────────────────────────
    let decoded = decode::decode_asset(asset, request.max_input_pixels)?;
    let natural = Dimensions::new(decoded.width(), decoded.height());

    // ── Step 3: Target size ──────────────────────────────────────────────
    let target = resize::target_dimensions(natural, request);
    if target != natural {
        debug!("'{}': {} → {}", asset.name(), natural, target);
    }

    // ── Step 4: Resample onto the surface ────────────────────────────────
    let rgba = decoded.into_rgba8();
    let drawn = resize::resample(rgba, target, request.filter)?;

    // ── Step 5: Background fill for alpha-less encodings ─────────────────
    let surface = match request.background {
        Some(bg) if request.flattens_alpha() => Surface::Rgb(surface::flatten_onto(&drawn, bg)),
        _ => Surface::Rgba(drawn),
    };

    // ── Step 6: Encode ───────────────────────────────────────────────────
    let bytes = encode_surface(surface, request.encoding, request.quality)?;

    Ok(ImageAsset::new(bytes, request.encoding, output_name(asset.name(), request.encoding))
        .with_dimensions(target))
}
