//! Progress-callback trait for per-phase and per-item run events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the run moves through its phases. The library itself never
//! prints; the `svgstack` binary turns these events into a progress bar.
//!
//! # Example
//!
//! ```rust
//! use svgstack::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     secured: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_resource_secured(&self, index: u32, bytes: u64) {
//!         self.secured.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("resource {index}: {bytes} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { secured: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder("https://example.com/pages/")
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::run::RunState;
use std::sync::Arc;

/// Called by the pipeline as it moves through a run.
///
/// Implementations must be `Send + Sync`: conversion events arrive from
/// worker threads, possibly concurrently and out of index order. All methods
/// have default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// The run entered a new state.
    fn on_state_change(&self, state: RunState) {
        let _ = state;
    }

    /// Resource `index` was fetched and persisted.
    fn on_resource_secured(&self, index: u32, bytes: u64) {
        let _ = (index, bytes);
    }

    /// Conversion is about to start for `total` resources.
    fn on_conversion_start(&self, total: usize) {
        let _ = total;
    }

    /// Resource `index` was converted into a bitmap of `bytes` bytes.
    fn on_item_complete(&self, index: u32, total: usize, bytes: u64) {
        let _ = (index, total, bytes);
    }

    /// Resource `index` failed to convert and is dropped.
    fn on_item_error(&self, index: u32, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Every conversion task has settled.
    fn on_conversion_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
