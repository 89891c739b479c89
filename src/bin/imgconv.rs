//! CLI binary for imgconv.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `ConversionRequest`, runs the batch and writes the results.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use imgconv::{
    compress_batch, load_asset, run_batch_stream, save_asset, BackgroundColor, BatchOptions, BatchProgress,
    BatchProgressCallback, BatchStats, CompressOptions, ConversionOutcome, ConversionRequest, Encoding,
    FitMode, ImageAsset, ItemError, OutputNames, ProgressCallback, ResizeFilter,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_items} images…"))
        ));
    }

    fn on_item_failed(&self, index: usize, label: &str, error: &ItemError) {
        let error = error.to_string();
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} {:>3}  {}  {}",
            red("✗"),
            index + 1,
            label,
            red(&msg)
        ));
    }

    fn on_progress(&self, progress: &BatchProgress) {
        self.bar.set_message(progress.current_label.clone());
        self.bar.set_position(progress.items_completed as u64);
    }

    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let failed = total_items.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images converted  ({} failed)",
                if failed == total_items {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert PNGs to JPEG in ./out (white behind transparency)
  imgconv --to jpeg --background white -o out *.png

  # Shrink to fit 1600x1200, keep the format as WebP
  imgconv --to webp --max-width 1600 --max-height 1200 photos/*.jpg

  # One combined scale factor instead of width-then-height
  imgconv --fit contain --max-width 800 --max-height 800 big.png

  # Hit a byte budget (JPEG, quality steps down from 0.8)
  imgconv --target-size 200000 scan.png

  # Convert in place, replacing existing files of the same name
  imgconv --to webp --overwrite *.png

  # Four images at a time, give up on any single image after 30s
  imgconv --concurrency 4 --timeout 30 -o out raw/*

  # Machine-readable report
  imgconv --json --to png *.gif > report.json

SUPPORTED ENCODINGS:
  Encoding   Alpha   Quality
  ────────   ─────   ───────────────────────────────
  png        ✓       ignored
  jpeg       ✗       1–100 (from --quality × 100)
  webp       ✓       lossless; colour quantization below 1.0
  bmp        ✗       ignored
  gif        ✓       ignored (palette)

OUTPUT FILES:
  Output is <input stem>.<extension> in --out-dir. Existing files are never
  replaced unless --overwrite is given. Inputs sharing a stem (a.png, a.gif)
  are written as a.png, a-2.png, … in input order.

ENVIRONMENT VARIABLES:
  Every flag has an IMGCONV_* override, e.g. IMGCONV_TO=webp,
  IMGCONV_QUALITY=0.8, IMGCONV_OUT_DIR=out. RUST_LOG overrides -v/-q.
"#;

/// Convert raster images between PNG, JPEG, WebP, BMP and GIF.
#[derive(Parser, Debug)]
#[command(
    name = "imgconv",
    version,
    about = "Convert, resize and compress raster images",
    long_about = "Convert raster images between PNG, JPEG, WebP, BMP and GIF, optionally \
shrinking them to a maximum size or compressing them to a byte budget. Corrupt inputs are \
reported individually; the rest of the batch still converts.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input image files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory converted images are written to.
    #[arg(short, long, env = "IMGCONV_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Replace files that already exist in the output directory.
    #[arg(long, env = "IMGCONV_OVERWRITE")]
    overwrite: bool,

    /// Output encoding.
    #[arg(short = 't', long = "to", env = "IMGCONV_TO", value_enum, default_value = "png")]
    encoding: EncodingArg,

    /// Quality factor for lossy encodings (0.0–1.0).
    #[arg(long, env = "IMGCONV_QUALITY", default_value_t = 0.92)]
    quality: f32,

    /// Maximum output width in pixels.
    #[arg(long, env = "IMGCONV_MAX_WIDTH",
          value_parser = clap::value_parser!(u32).range(1..))]
    max_width: Option<u32>,

    /// Maximum output height in pixels.
    #[arg(long, env = "IMGCONV_MAX_HEIGHT",
          value_parser = clap::value_parser!(u32).range(1..))]
    max_height: Option<u32>,

    /// Fill behind transparency for JPEG/BMP: white, black, #rgb or #rrggbb.
    #[arg(long, env = "IMGCONV_BACKGROUND")]
    background: Option<BackgroundColor>,

    /// How max width and height combine.
    #[arg(long, env = "IMGCONV_FIT", value_enum, default_value = "sequential")]
    fit: FitArg,

    /// Resampling filter.
    #[arg(long, env = "IMGCONV_FILTER", value_enum, default_value = "catmull-rom")]
    filter: FilterArg,

    /// Refuse inputs larger than this many pixels.
    #[arg(long, env = "IMGCONV_MAX_PIXELS", default_value_t = imgconv::config::DEFAULT_MAX_INPUT_PIXELS)]
    max_pixels: u64,

    /// Number of images converted at the same time.
    #[arg(short, long, env = "IMGCONV_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..=64))]
    concurrency: u32,

    /// Per-image timeout in seconds.
    #[arg(long, env = "IMGCONV_TIMEOUT")]
    timeout: Option<u64>,

    /// Compress each image to JPEG of at most this many bytes.
    #[arg(long, env = "IMGCONV_TARGET_SIZE",
          conflicts_with_all = ["max_width", "max_height", "encoding", "quality", "fit", "filter"])]
    target_size: Option<u64>,

    /// Attempts before the compressor settles (with --target-size).
    #[arg(long, env = "IMGCONV_MAX_ITERATIONS", default_value_t = 10)]
    max_iterations: u32,

    /// Print a JSON report to stdout.
    #[arg(long, env = "IMGCONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMGCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMGCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMGCONV_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EncodingArg {
    Png,
    #[value(alias = "jpg")]
    Jpeg,
    Webp,
    Bmp,
    Gif,
}

impl From<EncodingArg> for Encoding {
    fn from(v: EncodingArg) -> Self {
        match v {
            EncodingArg::Png => Encoding::Png,
            EncodingArg::Jpeg => Encoding::Jpeg,
            EncodingArg::Webp => Encoding::WebP,
            EncodingArg::Bmp => Encoding::Bmp,
            EncodingArg::Gif => Encoding::Gif,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FitArg {
    Sequential,
    Contain,
}

impl From<FitArg> for FitMode {
    fn from(v: FitArg) -> Self {
        match v {
            FitArg::Sequential => FitMode::Sequential,
            FitArg::Contain => FitMode::Contain,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FilterArg {
    Bilinear,
    CatmullRom,
    Mitchell,
    Lanczos3,
}

impl From<FilterArg> for ResizeFilter {
    fn from(v: FilterArg) -> Self {
        match v {
            FilterArg::Bilinear => ResizeFilter::Bilinear,
            FilterArg::CatmullRom => ResizeFilter::CatmullRom,
            FilterArg::Mitchell => ResizeFilter::Mitchell,
            FilterArg::Lanczos3 => ResizeFilter::Lanczos3,
        }
    }
}

/// One line of the `--json` report.
#[derive(Serialize)]
struct ItemReport {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    /// Only set when the output encoding is lossy.
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ItemReport {
    fn failed(input: String, error: String) -> Self {
        Self {
            input,
            output: None,
            bytes: None,
            width: None,
            height: None,
            quality: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct Report {
    items: Vec<ItemReport>,
    stats: BatchStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let start = Instant::now();

    // ── Load inputs ──────────────────────────────────────────────────────
    // Unreadable files are reported and skipped; they count as failures.
    // Every report carries its position in `cli.inputs`.
    let mut assets = Vec::with_capacity(cli.inputs.len());
    let mut asset_positions = Vec::with_capacity(cli.inputs.len());
    let mut reports: Vec<(usize, ItemReport)> = Vec::new();
    for (position, path) in cli.inputs.iter().enumerate() {
        match load_asset(path).await {
            Ok(asset) => {
                assets.push(asset);
                asset_positions.push(position);
            }
            Err(e) => {
                if !cli.quiet {
                    eprintln!("{} {}", red("✗"), e);
                }
                reports.push((position, ItemReport::failed(path.display().to_string(), e.to_string())));
            }
        }
    }
    let unreadable = reports.len();
    let input_bytes: u64 = assets.iter().map(|a| a.len() as u64).sum();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let mut writer = OutputWriter::new(&cli);
    let (outcomes, item_reports) = if let Some(target) = cli.target_size {
        compress_all(&cli, assets, target, progress, &mut writer).await?
    } else {
        convert_all(&cli, assets, progress, &mut writer).await?
    };
    reports.extend(asset_positions.into_iter().zip(item_reports));
    reports.sort_by_key(|(position, _)| *position);

    // ── Report ───────────────────────────────────────────────────────────
    let stats = BatchStats::from_outcomes(&outcomes, input_bytes, start.elapsed().as_millis() as u64);
    let failed = stats.failed + unreadable + writer.failed;

    if cli.json {
        let report = Report {
            items: reports.into_iter().map(|(_, item)| item).collect(),
            stats,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {}/{} images  {} → {} bytes  {}ms  →  {}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            stats.succeeded - writer.failed,
            stats.total + unreadable,
            dim(&stats.input_bytes.to_string()),
            dim(&stats.output_bytes.to_string()),
            stats.duration_ms,
            bold(&cli.out_dir.display().to_string()),
        );
    }

    if failed > 0 {
        anyhow::bail!("{} of {} images failed", failed, cli.inputs.len());
    }
    Ok(())
}

/// Run the batch and save each result as it arrives.
///
/// Returns outcomes and reports in the order of `assets`.
async fn convert_all(
    cli: &Cli,
    assets: Vec<ImageAsset>,
    progress: Option<ProgressCallback>,
    writer: &mut OutputWriter<'_>,
) -> Result<(Vec<ConversionOutcome>, Vec<ItemReport>)> {
    let request = build_request(cli)?;
    let options = build_options(cli, progress.clone())?;
    let quality = request.encoding.is_lossy().then_some(request.quality);
    let total = assets.len();

    let names: Vec<String> = assets.iter().map(|a| a.name().to_string()).collect();
    let mut stream = run_batch_stream(assets, request, options);
    let mut outcomes = Vec::with_capacity(total);
    let mut reports = Vec::with_capacity(total);

    while let Some((index, outcome)) = stream.next().await {
        let mut report = writer.save(&names[index], &outcome).await;
        if report.error.is_none() {
            report.quality = quality;
        }
        reports.push(report);
        outcomes.push(outcome);
    }

    if let Some(cb) = progress {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        cb.on_batch_complete(total, succeeded - writer.failed);
    }
    Ok((outcomes, reports))
}

/// Compress each asset to the byte budget under the same batch options.
///
/// Returns outcomes and reports in the order of `assets`.
async fn compress_all(
    cli: &Cli,
    assets: Vec<ImageAsset>,
    target: u64,
    progress: Option<ProgressCallback>,
    writer: &mut OutputWriter<'_>,
) -> Result<(Vec<ConversionOutcome>, Vec<ItemReport>)> {
    let options = CompressOptions {
        max_iterations: cli.max_iterations,
        background: cli.background.unwrap_or(BackgroundColor::WHITE),
        max_input_pixels: cli.max_pixels,
        ..CompressOptions::default()
    };
    let batch = build_options(cli, progress)?;

    let names: Vec<String> = assets.iter().map(|a| a.name().to_string()).collect();
    let results = compress_batch(assets, target, &options, &batch).await;
    let mut outcomes = Vec::with_capacity(results.len());
    let mut reports = Vec::with_capacity(results.len());

    for (label, result) in names.into_iter().zip(results) {
        let (outcome, quality) = match result {
            Ok(compressed) => {
                if !compressed.met_target && !cli.quiet && !cli.json {
                    eprintln!(
                        "  {} {} is {} bytes at quality {:.1}, above the {} byte target",
                        cyan("⚠"),
                        label,
                        compressed.asset.len(),
                        compressed.quality,
                        target
                    );
                }
                let output_name = compressed.asset.name().to_string();
                (
                    ConversionOutcome::Success {
                        asset: compressed.asset,
                        output_name,
                    },
                    Some(compressed.quality),
                )
            }
            Err(error) => (
                ConversionOutcome::Failure {
                    input_name: label.clone(),
                    error,
                },
                None,
            ),
        };

        let mut report = writer.save(&label, &outcome).await;
        if report.error.is_none() {
            report.quality = quality;
        }
        reports.push(report);
        outcomes.push(outcome);
    }
    Ok((outcomes, reports))
}

/// Writes successful outcomes to the output directory.
///
/// Output names are made unique across the run, and a file that cannot be
/// written becomes a failed report instead of aborting the remaining saves.
struct OutputWriter<'a> {
    cli: &'a Cli,
    names: OutputNames,
    failed: usize,
}

impl<'a> OutputWriter<'a> {
    fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            names: OutputNames::new(),
            failed: 0,
        }
    }

    async fn save(&mut self, input: &str, outcome: &ConversionOutcome) -> ItemReport {
        let (asset, output_name) = match outcome {
            ConversionOutcome::Success { asset, output_name } => (asset, output_name),
            ConversionOutcome::Failure { error, .. } => {
                return ItemReport::failed(input.to_string(), error.to_string());
            }
        };

        let file_name = self.names.claim(output_name);
        if file_name != *output_name && !self.cli.quiet && !self.cli.json {
            eprintln!(
                "  {} {} shares the name {}; writing {}",
                cyan("⚠"),
                input,
                output_name,
                file_name
            );
        }

        match save_asset(asset, &file_name, &self.cli.out_dir, self.cli.overwrite).await {
            Ok(path) => {
                let dims = asset.dimensions();
                ItemReport {
                    input: input.to_string(),
                    output: Some(path),
                    bytes: Some(asset.len()),
                    width: dims.map(|d| d.width),
                    height: dims.map(|d| d.height),
                    quality: None,
                    error: None,
                }
            }
            Err(e) => {
                self.failed += 1;
                if !self.cli.quiet {
                    eprintln!("{} {}: {}", red("✗"), input, e);
                }
                ItemReport::failed(input.to_string(), e.to_string())
            }
        }
    }
}

/// Map CLI args to `ConversionRequest`.
fn build_request(cli: &Cli) -> Result<ConversionRequest> {
    let mut builder = ConversionRequest::builder()
        .encoding(cli.encoding.into())
        .quality(cli.quality)
        .fit(cli.fit.into())
        .filter(cli.filter.into())
        .max_input_pixels(cli.max_pixels);

    if let Some(w) = cli.max_width {
        builder = builder.max_width(w);
    }
    if let Some(h) = cli.max_height {
        builder = builder.max_height(h);
    }
    if let Some(bg) = cli.background {
        builder = builder.background(bg);
    }

    builder.build().context("Invalid conversion options")
}

/// Map CLI args to `BatchOptions`.
fn build_options(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchOptions> {
    let mut builder = BatchOptions::builder().concurrency(cli.concurrency as usize);

    if let Some(secs) = cli.timeout {
        builder = builder.item_timeout(Duration::from_secs(secs));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid batch options")
}
