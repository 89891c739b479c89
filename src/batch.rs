//! Batch conversion: one request applied to an ordered list of assets.
//!
//! ## Guarantees
//!
//! * `outcomes.len() == inputs.len()` and `outcomes[i]` belongs to `inputs[i]`.
//! * A failing item never stops the batch; it becomes a `Failure` outcome.
//! * Progress is reported once per processed item, in input order, with a
//!   count that rises from 1 to `inputs.len()`.
//!
//! ## Scheduling
//!
//! With the default `concurrency = 1` each image is decoded, resized and
//! encoded completely, progress is reported, and only then does the next
//! image start. Higher concurrency runs several items on independent
//! blocking workers. Results still come back through an order-preserving
//! buffer, so ordering and progress semantics are identical.

use crate::config::ConversionRequest;
use crate::convert::convert;
use crate::error::{ImgConvError, ItemError};
use crate::output::{ConversionOutcome, ImageAsset};
use crate::progress::{BatchProgress, ProgressCallback};
use futures::stream::{self, Stream, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared between a caller and a running batch.
///
/// Checked at the start of every item. Items already running finish
/// normally; items not yet started become `Cancelled` failures.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a batch is scheduled and observed.
#[derive(Clone)]
pub struct BatchOptions {
    /// Items converted at the same time. Default: 1 (strictly sequential).
    pub concurrency: usize,

    /// Upper bound on one item's wall-clock time. Default: none.
    ///
    /// A decoder that never returns would otherwise block the batch forever.
    /// The timed-out worker is abandoned, not killed; it finishes in the
    /// background and its result is discarded.
    pub item_timeout: Option<Duration>,

    /// Cancellation flag checked before each item. Default: none.
    pub cancel: Option<CancelToken>,

    /// Observer for start, per-item and completion events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            item_timeout: None,
            cancel: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("concurrency", &self.concurrency)
            .field("item_timeout", &self.item_timeout)
            .field("cancel", &self.cancel)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchOptions {
    /// Create a new builder for `BatchOptions`.
    pub fn builder() -> BatchOptionsBuilder {
        BatchOptionsBuilder {
            options: Self::default(),
        }
    }
}

/// Builder for [`BatchOptions`].
#[derive(Debug)]
pub struct BatchOptionsBuilder {
    options: BatchOptions,
}

impl BatchOptionsBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.options.concurrency = n.max(1);
        self
    }

    pub fn item_timeout(mut self, timeout: Duration) -> Self {
        self.options.item_timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.options.cancel = Some(token);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.options.progress_callback = Some(cb);
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<BatchOptions, ImgConvError> {
        if self.options.concurrency == 0 {
            return Err(ImgConvError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if self.options.item_timeout == Some(Duration::ZERO) {
            return Err(ImgConvError::InvalidConfig(
                "Item timeout must be greater than zero".into(),
            ));
        }
        Ok(self.options)
    }
}

/// Convert every asset in `inputs` with the same `request`.
///
/// Always returns one outcome per input, in input order.
///
/// # Example
/// ```rust,no_run
/// use imgconv::{run_batch, BatchOptions, ConversionRequest, Encoding, ImageAsset};
///
/// # #[tokio::main]
/// # async fn main() {
/// let inputs = vec![
///     ImageAsset::new(std::fs::read("a.png").unwrap(), Encoding::Png, "a.png"),
///     ImageAsset::new(std::fs::read("b.png").unwrap(), Encoding::Png, "b.png"),
/// ];
/// let request = ConversionRequest::builder().encoding(Encoding::WebP).build().unwrap();
/// let outcomes = run_batch(inputs, &request, &BatchOptions::default()).await;
/// assert_eq!(outcomes.len(), 2);
/// # }
/// ```
pub async fn run_batch(
    inputs: Vec<ImageAsset>,
    request: &ConversionRequest,
    options: &BatchOptions,
) -> Vec<ConversionOutcome> {
    let start = Instant::now();
    let total = inputs.len();
    info!(
        "Starting batch: {} images → {} (concurrency {})",
        total, request.encoding, options.concurrency
    );
    let request = request.clone();

    let work = move |asset: ImageAsset| convert(&asset, &request).into_result();
    let outcomes: Vec<ConversionOutcome> = run_items(inputs, options, work)
        .await
        .into_iter()
        .map(|(label, result)| ConversionOutcome::from_result(label, result))
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    if succeeded == total {
        info!(
            "Batch complete: {}/{} images in {}ms",
            succeeded,
            total,
            start.elapsed().as_millis()
        );
    } else {
        warn!(
            "Batch complete with failures: {}/{} images succeeded in {}ms",
            succeeded,
            total,
            start.elapsed().as_millis()
        );
    }

    outcomes
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(
    inputs: Vec<ImageAsset>,
    request: &ConversionRequest,
    options: &BatchOptions,
) -> Result<Vec<ConversionOutcome>, ImgConvError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| ImgConvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(inputs, request, options)))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Per-item work run on the blocking pool.
pub(crate) trait ItemWork<T>: Fn(ImageAsset) -> Result<T, ItemError> + Send + Sync + 'static {}

impl<T, F> ItemWork<T> for F where F: Fn(ImageAsset) -> Result<T, ItemError> + Send + Sync + 'static {}

/// One finished (or skipped) item, tagged with its input position.
pub(crate) struct ItemResult<T> {
    pub index: usize,
    pub label: String,
    pub result: Result<T, ItemError>,
    /// False when the item was cancelled before it started.
    pub processed: bool,
}

/// Drive `work` over every input, firing all batch callbacks.
///
/// Returns `(label, result)` per input, in input order.
pub(crate) async fn run_items<T, W>(
    inputs: Vec<ImageAsset>,
    options: &BatchOptions,
    work: W,
) -> Vec<(String, Result<T, ItemError>)>
where
    T: Send + 'static,
    W: ItemWork<T>,
{
    let total = inputs.len();
    if let Some(ref cb) = options.progress_callback {
        cb.on_batch_start(total);
    }

    let mut results = Vec::with_capacity(total);
    let mut items = Box::pin(item_results(inputs, options, work));

    while let Some(item) = items.next().await {
        debug_assert_eq!(item.index, results.len(), "results must arrive in input order");
        report_item(options, &item, total);
        results.push((item.label, item.result));
    }

    if let Some(ref cb) = options.progress_callback {
        let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
        cb.on_batch_complete(total, succeeded);
    }

    results
}

/// Ordered stream of item results.
///
/// `buffered` keeps up to `concurrency` items in flight but yields them
/// strictly in input order.
pub(crate) fn item_results<T, W>(
    inputs: Vec<ImageAsset>,
    options: &BatchOptions,
    work: W,
) -> impl Stream<Item = ItemResult<T>> + Send + 'static
where
    T: Send + 'static,
    W: ItemWork<T>,
{
    let cancel = options.cancel.clone();
    let timeout = options.item_timeout;
    let work = Arc::new(work);

    stream::iter(inputs.into_iter().enumerate())
        .map(move |(index, asset)| process_item(index, asset, Arc::clone(&work), cancel.clone(), timeout))
        .buffered(options.concurrency.max(1))
}

async fn process_item<T, W>(
    index: usize,
    asset: ImageAsset,
    work: Arc<W>,
    cancel: Option<CancelToken>,
    timeout: Option<Duration>,
) -> ItemResult<T>
where
    T: Send + 'static,
    W: ItemWork<T>,
{
    let label = asset.name().to_string();

    if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
        debug!("Skipping '{}' (batch cancelled)", label);
        return ItemResult {
            index,
            label,
            result: Err(ItemError::Cancelled),
            processed: false,
        };
    }

    let task = tokio::task::spawn_blocking(move || (*work)(asset));
    let joined = async {
        task.await.unwrap_or_else(|e| {
            Err(ItemError::Internal {
                detail: format!("worker task panicked: {e}"),
            })
        })
    };

    let result = match timeout {
        None => joined.await,
        Some(limit) => match tokio::time::timeout(limit, joined).await {
            Ok(result) => result,
            Err(_) => {
                warn!("'{}' timed out after {}ms", label, limit.as_millis());
                Err(ItemError::Timeout {
                    millis: limit.as_millis() as u64,
                })
            }
        },
    };

    ItemResult {
        index,
        label,
        result,
        processed: true,
    }
}

/// Fire per-item callbacks for a processed item.
pub(crate) fn report_item<T>(options: &BatchOptions, item: &ItemResult<T>, total: usize) {
    if !item.processed {
        return;
    }
    let Some(ref cb) = options.progress_callback else {
        return;
    };

    if let Err(ref error) = item.result {
        cb.on_item_failed(item.index, &item.label, error);
    }
    cb.on_progress(&BatchProgress {
        items_completed: item.index + 1,
        items_total: total,
        current_label: item.label.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use crate::error::ErrorKind;
    use crate::progress::progress_fn;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    fn png(name: &str) -> ImageAsset {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([1, 2, 3])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        ImageAsset::new(buf, Encoding::Png, name)
    }

    fn corrupt(name: &str) -> ImageAsset {
        ImageAsset::new(b"not an image".to_vec(), Encoding::Png, name)
    }

    #[test]
    fn builder_clamps_concurrency() {
        let opts = BatchOptions::builder().concurrency(0).build().unwrap();
        assert_eq!(opts.concurrency, 1);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(BatchOptions::builder().item_timeout(Duration::ZERO).build().is_err());
    }

    #[tokio::test]
    async fn empty_batch_yields_nothing() {
        let outcomes = run_batch(Vec::new(), &ConversionRequest::default(), &BatchOptions::default()).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn failure_in_middle_keeps_siblings() {
        let inputs = vec![png("a.png"), corrupt("b.png"), png("c.png")];
        let outcomes = run_batch(inputs, &ConversionRequest::default(), &BatchOptions::default()).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].error().map(ItemError::kind), Some(ErrorKind::DecodeError));
        assert!(outcomes[2].is_success());
    }

    #[tokio::test]
    async fn progress_reports_each_item_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let opts = BatchOptions::builder()
            .progress_callback(progress_fn(move |p| {
                sink.lock()
                    .unwrap()
                    .push((p.items_completed, p.items_total, p.current_label.clone()));
            }))
            .build()
            .unwrap();

        let inputs = vec![png("a.png"), corrupt("b.png"), png("c.png")];
        run_batch(inputs, &ConversionRequest::default(), &opts).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, 3, "a.png".to_string()),
                (2, 3, "b.png".to_string()),
                (3, 3, "c.png".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_everything() {
        let token = CancelToken::new();
        token.cancel();
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let opts = BatchOptions::builder()
            .cancel_token(token)
            .progress_callback(progress_fn(move |_| *counter.lock().unwrap() += 1))
            .build()
            .unwrap();

        let outcomes = run_batch(vec![png("a.png"), png("b.png")], &ConversionRequest::default(), &opts).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| o.error().map(ItemError::kind) == Some(ErrorKind::Cancelled)));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_from_progress_stops_remaining_items() {
        let token = CancelToken::new();
        let trigger = token.clone();
        let opts = BatchOptions::builder()
            .cancel_token(token)
            .progress_callback(progress_fn(move |_| trigger.cancel()))
            .build()
            .unwrap();

        let inputs = vec![png("a.png"), png("b.png"), png("c.png")];
        let outcomes = run_batch(inputs, &ConversionRequest::default(), &opts).await;

        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].error().map(ItemError::kind), Some(ErrorKind::Cancelled));
        assert_eq!(outcomes[2].error().map(ItemError::kind), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn sync_wrapper_runs_batch() {
        let outcomes = run_batch_sync(
            vec![png("a.png")],
            &ConversionRequest::default(),
            &BatchOptions::default(),
        )
        .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
    }

    #[tokio::test]
    async fn stalled_item_times_out_and_batch_continues() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let opts = BatchOptions::builder()
            .item_timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let work = move |asset: ImageAsset| -> Result<usize, ItemError> {
            if asset.name() == "stuck.png" {
                // Blocks until the test releases it, long after the timeout.
                let _ = gate.lock().unwrap().recv();
            }
            Ok(asset.len())
        };
        let inputs = vec![png("a.png"), png("stuck.png"), png("c.png")];
        let results = run_items(inputs, &opts, work).await;
        release.send(()).unwrap();

        let labels: Vec<&str> = results.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["a.png", "stuck.png", "c.png"]);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1, Err(ItemError::Timeout { millis: 20 }));
        assert!(results[2].1.is_ok());
    }

    #[tokio::test]
    async fn panicking_worker_becomes_internal_failure() {
        let work = |asset: ImageAsset| -> Result<(), ItemError> {
            if asset.name() == "bad.png" {
                panic!("worker blew up");
            }
            Ok(())
        };
        let inputs = vec![png("bad.png"), png("ok.png")];
        let results = run_items(inputs, &BatchOptions::default(), work).await;

        assert_eq!(results[0].1.as_ref().unwrap_err().kind(), ErrorKind::Internal);
        assert!(results[1].1.is_ok());
    }
}
