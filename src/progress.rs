//! Progress-callback trait for per-chunk parse events.
//!
//! The authoritative progress record is the counter pair on the stored
//! document (polled by whoever displays it). The callback is a push-style
//! mirror of the same events for in-process consumers such as the CLI
//! progress bar. Inject one via
//! [`crate::config::PipelineConfigBuilder::progress_callback`].
//!
//! # Example
//!
//! ```rust
//! use exam_extract::{ParseProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counting(AtomicUsize);
//!
//! impl ParseProgressCallback for Counting {
//!     fn on_chunk_complete(&self, _chunk: usize, _total: usize, _items: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Counting(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the coordinator as chunks move through extraction.
///
/// Chunks run concurrently, so `on_chunk_*` may be called from several tasks
/// at once. All methods default to no-ops.
pub trait ParseProgressCallback: Send + Sync {
    /// Called once after segmentation, before any chunk is dispatched.
    fn on_parse_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called when a chunk acquires the concurrency gate.
    ///
    /// `chunk` is 0-based.
    fn on_chunk_start(&self, chunk: usize, total_chunks: usize) {
        let _ = (chunk, total_chunks);
    }

    /// Called when a chunk produced a valid payload.
    ///
    /// `items` is the number of top-level records extracted (questions,
    /// modules, sections or formulas).
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, items: usize) {
        let _ = (chunk, total_chunks, items);
    }

    /// Called when a chunk failed after exhausting its retries.
    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        let _ = (chunk, total_chunks, error);
    }

    /// Called once after the merge, only on success.
    fn on_parse_complete(&self, total_chunks: usize, merged_items: usize) {
        let _ = (total_chunks, merged_items);
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl ParseProgressCallback for NoopProgressCallback {}

/// Alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ParseProgressCallback>;
