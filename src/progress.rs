//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::batch::BatchOptionsBuilder::progress_callback`] to receive
//! events as the batch runner works through its inputs.
//!
//! Callers can forward events to a channel, a terminal progress bar or a UI
//! without the library knowing how the host application communicates. For
//! the common "just tell me the counts" case, [`progress_fn`] wraps a closure.
//!
//! # Example
//!
//! ```rust
//! use imgconv::{progress_fn, BatchOptions, BatchProgress};
//!
//! let options = BatchOptions::builder()
//!     .progress_callback(progress_fn(|p: &BatchProgress| {
//!         eprintln!("{}/{} {}", p.items_completed, p.items_total, p.current_label);
//!     }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ItemError;
use std::sync::Arc;

/// Snapshot emitted once per processed item, success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based count of items finished so far.
    pub items_completed: usize,
    pub items_total: usize,
    /// Name of the item that just finished.
    pub current_label: String,
}

/// Called by the batch runner as it processes each item.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the runner
/// lives on a Tokio worker, though events are still delivered one at a time
/// and in input order. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first item starts.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called after each item completes, before the next one is reported.
    fn on_progress(&self, progress: &BatchProgress) {
        let _ = progress;
    }

    /// Called right before `on_progress` when the item failed.
    fn on_item_failed(&self, index: usize, label: &str, error: &ItemError) {
        let _ = (index, label, error);
    }

    /// Called once after every item has an outcome.
    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::batch::BatchOptions`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// Adapter turning a closure into a progress callback.
pub struct FnProgress<F>(F);

impl<F> BatchProgressCallback for FnProgress<F>
where
    F: Fn(&BatchProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &BatchProgress) {
        (self.0)(progress)
    }
}

/// Wrap a closure that only cares about [`BatchProgress`] snapshots.
pub fn progress_fn<F>(f: F) -> ProgressCallback
where
    F: Fn(&BatchProgress) + Send + Sync + 'static,
{
    Arc::new(FnProgress(f))
}
