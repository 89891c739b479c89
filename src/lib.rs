//! # imgconv
//!
//! Safe, bounded, batchable raster image conversion.
//!
//! ## Why this crate?
//!
//! Converting user-supplied images is deceptively risky: a 2 KB file can
//! declare a 100 000 × 100 000 canvas, one corrupt upload can abort a whole
//! batch, and naive quality loops never terminate. This crate decodes under
//! a pixel budget, shrinks with a real convolution filter, re-encodes at a
//! chosen quality, and reports every item of a batch as its own success or
//! failure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ImageAsset (bytes + encoding + name)
//!  │
//!  ├─ 1. Validate  reject bad quality / zero bounds before decoding
//!  ├─ 2. Decode    magic-byte sniffing, decode budget (spawn_blocking)
//!  ├─ 3. Size      max width, then max height, aspect preserved
//!  ├─ 4. Resample  fast_image_resize convolution filter
//!  ├─ 5. Surface   background fill for JPEG / BMP
//!  └─ 6. Encode    PNG · JPEG · WebP · BMP · GIF at the requested quality
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgconv::{load_asset, run_batch, BatchOptions, ConversionRequest, Encoding};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inputs = vec![load_asset("a.png").await?, load_asset("b.jpg").await?];
//!     let request = ConversionRequest::builder()
//!         .encoding(Encoding::WebP)
//!         .quality(0.8)
//!         .max_width(1280)
//!         .build()?;
//!
//!     for outcome in run_batch(inputs, &request, &BatchOptions::default()).await {
//!         match outcome.into_result() {
//!             Ok((asset, name)) => println!("{name}: {} bytes", asset.len()),
//!             Err(e) => eprintln!("failed: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgconv` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! imgconv = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing an Encoding
//!
//! | Encoding | Alpha | Lossy | Quality used |
//! |----------|-------|-------|--------------|
//! | `png`  | yes | no  | ignored |
//! | `jpeg` | no  | yes | 1–100 |
//! | `webp` | yes | no* | colour quantization below 1.0 |
//! | `bmp`  | no  | no  | ignored |
//! | `gif`  | yes | palette | ignored |
//!
//! \* WebP output is always a lossless container.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod compress;
pub mod config;
pub mod convert;
pub mod error;
pub mod files;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run_batch, run_batch_sync, BatchOptions, BatchOptionsBuilder, CancelToken};
pub use compress::{
    compress_batch, compress_to_target, compress_to_target_async, compress_with, CompressOptions, Compressed,
};
pub use config::{BackgroundColor, ConversionRequest, ConversionRequestBuilder, Encoding, FitMode, ResizeFilter};
pub use convert::{convert, convert_async};
pub use error::{ErrorKind, ImgConvError, ItemError};
pub use files::{load_asset, load_assets, save_asset};
pub use output::{output_name, BatchStats, ConversionOutcome, Dimensions, ImageAsset, OutputNames};
pub use progress::{progress_fn, BatchProgress, BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{run_batch_stream, OutcomeStream};
