//! Integration tests for imgconv.
//!
//! Every fixture is generated in memory with the `image` crate, so these
//! run offline without sample files.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imgconv::{
    compress_batch, compress_to_target, convert, load_asset, progress_fn, run_batch, run_batch_stream,
    save_asset, BackgroundColor, BatchOptions, BatchProgress, BatchStats, CompressOptions, ConversionOutcome,
    ConversionRequest, Dimensions, Encoding, ErrorKind, FitMode, ImageAsset, ImgConvError, ItemError,
    OutputNames,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn jpeg_asset(w: u32, h: u32, name: &str) -> ImageAsset {
    let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    ImageAsset::new(encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg), Encoding::Jpeg, name)
}

fn png_asset(w: u32, h: u32, name: &str) -> ImageAsset {
    let img = RgbaImage::from_pixel(w, h, Rgba([10, 200, 30, 255]));
    ImageAsset::new(encode(DynamicImage::ImageRgba8(img), ImageFormat::Png), Encoding::Png, name)
}

fn corrupt_asset(name: &str) -> ImageAsset {
    ImageAsset::new(vec![0x89, b'P', b'N', b'G', 0, 0, 0], Encoding::Png, name)
}

fn success(outcome: ConversionOutcome) -> (ImageAsset, String) {
    outcome
        .into_result()
        .unwrap_or_else(|e| panic!("expected success, got {e}"))
}

fn decoded_dims(asset: &ImageAsset) -> (u32, u32) {
    let img = image::load_from_memory(asset.bytes()).expect("output must decode");
    (img.width(), img.height())
}

// ── Single conversion ────────────────────────────────────────────────────────

#[test]
fn test_large_jpeg_to_png_max_width() {
    let input = jpeg_asset(4000, 3000, "camera.jpg");
    let request = ConversionRequest::builder()
        .encoding(Encoding::Png)
        .max_width(800)
        .build()
        .unwrap();

    let (out, name) = success(convert(&input, &request));

    assert_eq!(name, "camera.png");
    assert_eq!(
        image::guess_format(out.bytes()).unwrap(),
        ImageFormat::Png,
        "output must be a real PNG"
    );
    assert_eq!(decoded_dims(&out), (800, 600));
    assert_eq!(out.dimensions(), Some(Dimensions::new(800, 600)));
}

#[test]
fn test_opaque_png_to_jpeg_with_background() {
    let input = png_asset(100, 100, "logo.png");
    let request = ConversionRequest::builder()
        .encoding(Encoding::Jpeg)
        .quality(0.5)
        .background("#ffffff".parse::<BackgroundColor>().unwrap())
        .build()
        .unwrap();

    let (out, _) = success(convert(&input, &request));
    let img = image::load_from_memory(out.bytes()).unwrap();

    assert_eq!(image::guess_format(out.bytes()).unwrap(), ImageFormat::Jpeg);
    assert!(img.width() <= 100 && img.height() <= 100);
    assert!(!img.color().has_alpha());
}

#[test]
fn test_no_bounds_keeps_dimensions() {
    for enc in Encoding::ALL {
        let request = ConversionRequest::builder().encoding(enc).build().unwrap();
        let (out, _) = success(convert(&png_asset(37, 23, "odd.png"), &request));
        assert_eq!(decoded_dims(&out), (37, 23), "{enc}");
    }
}

#[test]
fn test_max_width_rounds_height() {
    let request = ConversionRequest::builder().max_width(100).build().unwrap();
    let (out, _) = success(convert(&png_asset(333, 200, "a.png"), &request));
    // round(200 * 100 / 333) = round(60.06) = 60
    assert_eq!(decoded_dims(&out), (100, 60));
}

#[test]
fn test_sequential_fit_applies_both_passes() {
    let request = ConversionRequest::builder()
        .max_width(400)
        .max_height(100)
        .build()
        .unwrap();
    let (out, _) = success(convert(&png_asset(800, 400, "wide.png"), &request));
    // 800x400 → 400x200 → 200x100
    assert_eq!(decoded_dims(&out), (200, 100));
}

#[test]
fn test_contain_fit_stays_within_bounds() {
    let request = ConversionRequest::builder()
        .max_width(64)
        .max_height(64)
        .fit(FitMode::Contain)
        .build()
        .unwrap();
    let (out, _) = success(convert(&png_asset(300, 97, "strip.png"), &request));
    let (w, h) = decoded_dims(&out);
    assert!(w <= 64 && h <= 64, "{w}x{h}");
    assert_eq!(w, 64);
}

#[test]
fn test_reconversion_is_idempotent_in_size() {
    let request = ConversionRequest::builder()
        .encoding(Encoding::Jpeg)
        .quality(0.8)
        .max_width(120)
        .max_height(90)
        .build()
        .unwrap();

    let (first, _) = success(convert(&jpeg_asset(640, 480, "p.jpg"), &request));
    let (second, _) = success(convert(&first, &request));

    assert_eq!(decoded_dims(&first), decoded_dims(&second));
}

#[test]
fn test_invalid_quality_is_invalid_request() {
    for q in [-0.1_f32, 1.5, f32::NAN] {
        let request = ConversionRequest {
            quality: q,
            ..ConversionRequest::default()
        };
        // Corrupt input: a DecodeError here would mean decode ran first.
        let outcome = convert(&corrupt_asset("x.png"), &request);
        assert_eq!(
            outcome.error().map(ItemError::kind),
            Some(ErrorKind::InvalidRequest),
            "q={q}"
        );
    }
}

#[test]
fn test_decode_budget_refuses_oversized_input() {
    let request = ConversionRequest::builder()
        .max_input_pixels(100)
        .build()
        .unwrap();
    let outcome = convert(&png_asset(20, 20, "big.png"), &request);
    assert_eq!(outcome.error().map(ItemError::kind), Some(ErrorKind::DecodeError));
}

#[test]
fn test_data_url_round_trip_prefix() {
    let (out, _) = success(convert(&png_asset(2, 2, "d.png"), &ConversionRequest::default()));
    assert!(out.to_data_url().starts_with("data:image/png;base64,"));
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_corrupt_item_keeps_order() {
    let inputs = vec![png_asset(8, 8, "a.png"), corrupt_asset("b.png"), png_asset(8, 8, "c.png")];
    let outcomes = run_batch(inputs, &ConversionRequest::default(), &BatchOptions::default()).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_success());
    assert!(!outcomes[1].is_success());
    assert!(outcomes[2].is_success());
    match &outcomes[1] {
        ConversionOutcome::Failure { input_name, error } => {
            assert_eq!(input_name, "b.png");
            assert_eq!(error.kind(), ErrorKind::DecodeError);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_batch_progress_strictly_increasing() {
    for concurrency in [1, 4] {
        let seen = Arc::new(Mutex::new(Vec::<BatchProgress>::new()));
        let sink = Arc::clone(&seen);
        let options = BatchOptions::builder()
            .concurrency(concurrency)
            .progress_callback(progress_fn(move |p| sink.lock().unwrap().push(p.clone())))
            .build()
            .unwrap();

        let inputs: Vec<_> = (0..7).map(|i| png_asset(5 + i, 5, &format!("{i}.png"))).collect();
        let outcomes = run_batch(inputs, &ConversionRequest::default(), &options).await;
        assert_eq!(outcomes.len(), 7);

        let seen = seen.lock().unwrap();
        let counts: Vec<usize> = seen.iter().map(|p| p.items_completed).collect();
        assert_eq!(counts, (1..=7).collect::<Vec<_>>(), "concurrency {concurrency}");
        assert!(seen.iter().all(|p| p.items_total == 7));
        assert_eq!(seen[3].current_label, "3.png");
    }
}

#[tokio::test]
async fn test_batch_concurrency_preserves_outcome_order() {
    // Mixed sizes so workers finish out of order.
    let inputs: Vec<_> = [400u32, 10, 250, 5, 120, 60]
        .iter()
        .enumerate()
        .map(|(i, &w)| jpeg_asset(w, w, &format!("img{i}.jpg")))
        .collect();
    let options = BatchOptions::builder().concurrency(3).build().unwrap();
    let request = ConversionRequest::builder().encoding(Encoding::WebP).build().unwrap();

    let outcomes = run_batch(inputs, &request, &options).await;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let (_, name) = success(outcome);
        assert_eq!(name, format!("img{i}.webp"));
    }
}

#[tokio::test]
async fn test_batch_generous_timeout_lets_items_finish() {
    let options = BatchOptions::builder()
        .item_timeout(Duration::from_secs(60))
        .build()
        .unwrap();
    let outcomes = run_batch(
        vec![jpeg_asset(300, 300, "a.jpg"), corrupt_asset("b.png")],
        &ConversionRequest::default(),
        &options,
    )
    .await;
    assert!(outcomes[0].is_success());
    assert_eq!(outcomes[1].error().map(ItemError::kind), Some(ErrorKind::DecodeError));
}

#[tokio::test]
async fn test_stream_matches_batch() {
    let inputs = vec![png_asset(4, 4, "a.png"), corrupt_asset("b.png")];
    let pairs: Vec<_> = run_batch_stream(inputs, ConversionRequest::default(), BatchOptions::default())
        .collect()
        .await;

    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0, 0);
    assert!(pairs[0].1.is_success());
    assert_eq!(pairs[1].0, 1);
    assert!(!pairs[1].1.is_success());
}

#[tokio::test]
async fn test_batch_stats_summary() {
    let inputs = vec![png_asset(4, 4, "a.png"), corrupt_asset("b.png")];
    let input_bytes: u64 = inputs.iter().map(|a| a.len() as u64).sum();
    let outcomes = run_batch(inputs, &ConversionRequest::default(), &BatchOptions::default()).await;

    let stats = BatchStats::from_outcomes(&outcomes, input_bytes, 5);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert!(stats.output_bytes > 0);
}

// ── Compressor ───────────────────────────────────────────────────────────────

#[test]
fn test_compress_unreachable_target_terminates() {
    let input = jpeg_asset(64, 64, "photo.jpg");
    let out = compress_to_target(&input, 1, 10).unwrap();

    assert!(!out.met_target);
    assert!(out.attempts <= 10);
    assert_eq!(out.asset.encoding(), Encoding::Jpeg);
    assert_eq!(decoded_dims(&out.asset), (64, 64));
}

#[test]
fn test_compress_transparent_source_gets_white() {
    let img = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0]));
    let input = ImageAsset::new(encode(DynamicImage::ImageRgba8(img), ImageFormat::Png), Encoding::Png, "t.png");
    let out = compress_to_target(&input, u64::MAX, 10).unwrap();

    let px = image::load_from_memory(out.asset.bytes()).unwrap().to_rgb8();
    assert!(px.get_pixel(8, 8).0.iter().all(|&c| c > 240));
}

#[tokio::test]
async fn test_compress_batch_respects_decode_budget() {
    let options = CompressOptions {
        max_input_pixels: 50 * 50,
        ..CompressOptions::default()
    };
    let batch = BatchOptions::builder().concurrency(2).build().unwrap();
    let inputs = vec![jpeg_asset(40, 40, "small.jpg"), jpeg_asset(80, 80, "big.jpg")];

    let results = compress_batch(inputs, u64::MAX, &options, &batch).await;
    assert!(results[0].as_ref().unwrap().met_target);
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::DecodeError);
}

// ── Files ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("in.png");
    std::fs::write(&src, png_asset(9, 9, "in.png").bytes()).unwrap();

    let asset = load_asset(&src).await.unwrap();
    let request = ConversionRequest::builder().encoding(Encoding::Bmp).build().unwrap();
    let (out, name) = success(convert(&asset, &request));
    let path = save_asset(&out, &name, dir.path().join("out"), false).await.unwrap();

    assert!(path.ends_with("out/in.bmp"));
    let reloaded = load_asset(&path).await.unwrap();
    assert_eq!(reloaded.encoding(), Encoding::Bmp);
}

#[tokio::test]
async fn test_converting_in_place_keeps_original() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("photo.png");
    let original = png_asset(32, 32, "photo.png");
    std::fs::write(&src, original.bytes()).unwrap();

    let asset = load_asset(&src).await.unwrap();
    let request = ConversionRequest::builder().max_width(8).build().unwrap();
    let (out, name) = success(convert(&asset, &request));
    assert_eq!(name, "photo.png");

    let err = save_asset(&out, &name, dir.path(), false).await.unwrap_err();
    assert!(matches!(err, ImgConvError::OutputExists { .. }), "got {err:?}");
    assert_eq!(std::fs::read(&src).unwrap(), original.bytes());
}

#[tokio::test]
async fn test_colliding_stems_are_all_written() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = vec![png_asset(4, 4, "a.png"), jpeg_asset(6, 6, "a.jpg")];
    let outcomes = run_batch(inputs, &ConversionRequest::default(), &BatchOptions::default()).await;

    let mut names = OutputNames::new();
    let mut written = Vec::new();
    for outcome in outcomes {
        let (asset, name) = success(outcome);
        let file_name = names.claim(&name);
        written.push(save_asset(&asset, &file_name, dir.path(), false).await.unwrap());
    }

    assert_eq!(written, vec![dir.path().join("a.png"), dir.path().join("a-2.png")]);
    assert_eq!(decoded_dims(&load_asset(&written[0]).await.unwrap()), (4, 4));
    assert_eq!(decoded_dims(&load_asset(&written[1]).await.unwrap()), (6, 6));
}
