//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline resolves each PDF page. Non-PDF inputs (DOCX, text)
//! only fire the document-level events.
//!
//! # Example
//!
//! ```rust
//! use bidtext::{ExtractionConfig, ExtractionProgressCallback, ExtractionSource};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct OcrCounter {
//!     ocr_pages: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for OcrCounter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, source: ExtractionSource, _len: usize) {
//!         if source == ExtractionSource::Ocr {
//!             self.ocr_pages.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(OcrCounter { ocr_pages: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ExtractionSource;
use std::sync::Arc;

/// Called by the extraction pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages of one document are resolved sequentially,
/// but several documents may be extracted concurrently through one engine,
/// so implementations must be `Send + Sync`.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once a PDF has been opened and its selected pages counted.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page's structural extraction starts (1-indexed).
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called right before the OCR cascade runs for a page.
    fn on_page_ocr(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page resolved with usable text.
    ///
    /// # Arguments
    /// * `source`   — where the final text came from
    /// * `text_len` — length of the final text in characters
    fn on_page_complete(
        &self,
        page_num: usize,
        total_pages: usize,
        source: ExtractionSource,
        text_len: usize,
    ) {
        let _ = (page_num, total_pages, source, text_len);
    }

    /// Called when a page resolved to the failure placeholder.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been resolved.
    fn on_document_complete(&self, total_pages: usize, recovered_pages: usize) {
        let _ = (total_pages, recovered_pages);
    }
}

/// Shared handle type used by [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// A no-op implementation, handy as a placeholder.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}
