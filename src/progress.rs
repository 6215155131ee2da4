//! Progress-callback trait for per-page export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] or
//! [`crate::export::ExportPipeline::with_progress`] to receive events as the
//! pipeline works through its target pages.
//!
//! The export pipeline renders one page at a time, so events for a run
//! arrive in page order. Retries reuse the same page events and report the
//! run's unchanged progress percentage.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2img::{ConversionConfig, ExportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, progress: u8, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page_num} of {total_pages}: {bytes} bytes ({progress}%)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the export pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`; the
/// pipeline may run inside a spawned task.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once when a run starts.
    ///
    /// # Arguments
    /// * `total_pages`: number of target pages in the run
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before a page is dispatched to the renderer.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page rendered successfully.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: number of target pages in the run
    /// * `progress`: run progress in percent after this page
    /// * `bytes`: size of the encoded image
    fn on_page_complete(&self, page_num: usize, total_pages: usize, progress: u8, bytes: usize) {
        let _ = (page_num, total_pages, progress, bytes);
    }

    /// Called when a page failed to render or encode.
    fn on_page_error(&self, page_num: usize, total_pages: usize, progress: u8, error: &str) {
        let _ = (page_num, total_pages, progress, error);
    }

    /// Called when the cancel flag stopped the run before all pages were dispatched.
    fn on_run_cancelled(&self, processed: usize, total_pages: usize) {
        let _ = (processed, total_pages);
    }

    /// Called once after every target page has been attempted.
    ///
    /// # Arguments
    /// * `total_pages`: number of target pages in the run
    /// * `success_count`: pages that rendered without error
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }

    /// Called when the archive writer produced the final payload.
    fn on_archive_ready(&self, file_name: &str, entries: usize, bytes: usize) {
        let _ = (file_name, entries, bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        started_total: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl ExportProgressCallback for TrackingCallback {
        fn on_run_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page: usize, _total: usize, _progress: u8, _bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: usize, _total: usize, _progress: u8, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total_pages: usize, success_count: usize) {
            self.completed_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 20, 42);
        cb.on_page_error(2, 5, 40, "some error");
        cb.on_run_cancelled(2, 5);
        cb.on_run_complete(5, 4);
        cb.on_archive_ready("doc_exported.zip", 4, 1024);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_run_start(3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_page_start(1, 3);
        tracker.on_page_complete(1, 3, 33, 100);
        tracker.on_page_start(2, 3);
        tracker.on_page_complete(2, 3, 67, 200);
        tracker.on_page_start(3, 3);
        tracker.on_page_error(3, 3, 100, "unsupported shading");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_run_complete(3, 2);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_page_start(1, 10);
        cb.on_page_complete(1, 10, 10, 512);
    }
}
