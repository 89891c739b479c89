//! Streaming batch API: emit outcomes as items complete.
//!
//! Large batches take a while. A stream lets callers write each converted
//! file to disk the moment it is ready instead of holding every encoded
//! buffer until the last image finishes.
//!
//! Unlike the eager [`crate::batch::run_batch`], [`run_batch_stream`] yields
//! `(index, outcome)` pairs one by one. Items are still produced in input
//! order, whatever the concurrency, so `index` always counts up from 0.
//!
//! Per-item progress events (`on_item_failed`, `on_progress`) fire as each
//! pair is yielded. `on_batch_start` fires when the stream is created.
//! `on_batch_complete` is only emitted by [`crate::batch::run_batch`]; a
//! stream consumer knows the batch is over when the stream ends.

use crate::batch::{item_results, report_item, BatchOptions};
use crate::config::ConversionRequest;
use crate::convert::convert;
use crate::output::{ConversionOutcome, ImageAsset};
use futures::stream::StreamExt;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of `(input index, outcome)` pairs.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = (usize, ConversionOutcome)> + Send>>;

/// Convert `inputs` lazily, yielding each outcome as soon as it is ready.
///
/// Nothing is decoded until the stream is polled.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use imgconv::{run_batch_stream, BatchOptions, ConversionRequest, ImageAsset};
///
/// # #[tokio::main]
/// # async fn main() {
/// let inputs: Vec<ImageAsset> = Vec::new();
/// let mut stream = run_batch_stream(inputs, ConversionRequest::default(), BatchOptions::default());
/// while let Some((index, outcome)) = stream.next().await {
///     println!("#{index}: success={}", outcome.is_success());
/// }
/// # }
/// ```
pub fn run_batch_stream(
    inputs: Vec<ImageAsset>,
    request: ConversionRequest,
    options: BatchOptions,
) -> OutcomeStream {
    let total = inputs.len();
    info!(
        "Starting streaming batch: {} images → {} (concurrency {})",
        total, request.encoding, options.concurrency
    );

    if let Some(ref cb) = options.progress_callback {
        cb.on_batch_start(total);
    }

    let work = move |asset: ImageAsset| convert(&asset, &request).into_result();
    let items = item_results(inputs, &options, work);
    let stream = items.map(move |item| {
        report_item(&options, &item, total);
        (item.index, ConversionOutcome::from_result(item.label, item.result))
    });

    Box::pin(stream)
}
