//! Progress-callback trait for per-document batch events.
//!
//! Hand an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::workflow::InvoiceBatchService::with_progress`] to receive events
//! as the batch works through its documents.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal progress bar, a channel or a
//! database record without the library knowing how the host communicates.
//! The trait is `Send + Sync` because documents are processed concurrently.
//!
//! # Example
//!
//! ```rust
//! use ai_document_pipeline::BatchProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, _index: usize, _total: usize, document: &str, is_valid: bool) {
//!         if !is_valid {
//!             self.failed.fetch_add(1, Ordering::SeqCst);
//!             eprintln!("{document} needs review");
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

/// One step of the per-document workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStep {
    Converted,
    Extracted,
    Stored,
    Validated,
}

/// Called by the batch workflow as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_document_*` may be called concurrently for
/// different documents; protect shared state accordingly.
///
/// Events are not emitted for steps replayed from checkpoints.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery.
    ///
    /// # Arguments
    /// * `total_documents` — documents that will be processed
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document's sub-workflow starts.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in discovery order
    fn on_document_start(&self, index: usize, total: usize, document: &str) {
        let _ = (index, total, document);
    }

    /// Called after each completed step of a document.
    fn on_document_step(&self, document: &str, step: DocumentStep) {
        let _ = (document, step);
    }

    /// Called when a document's sub-workflow finishes, successfully or not.
    fn on_document_complete(&self, index: usize, total: usize, document: &str, is_valid: bool) {
        let _ = (index, total, document, is_valid);
    }

    /// Called once after every document has been attempted.
    ///
    /// # Arguments
    /// * `total_documents` — documents attempted
    /// * `valid_count`     — documents whose result is valid
    fn on_batch_complete(&self, total_documents: usize, valid_count: usize) {
        let _ = (total_documents, valid_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback type.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        started: AtomicUsize,
        steps: AtomicUsize,
        completed: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_document_start(&self, _: usize, _: usize, _: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_document_step(&self, _: &str, _: DocumentStep) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }
        fn on_document_complete(&self, _: usize, _: usize, _: &str, _: bool) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_compiles() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(3);
        cb.on_document_start(1, 3, "a.pdf");
        cb.on_document_step("a.pdf", DocumentStep::Extracted);
        cb.on_document_complete(1, 3, "a.pdf", true);
        cb.on_batch_complete(3, 3);
    }

    #[test]
    fn tracking_callback_counts() {
        let cb = TrackingCallback {
            started: AtomicUsize::new(0),
            steps: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        };
        for i in 1..=4 {
            cb.on_document_start(i, 4, "doc");
            cb.on_document_step("doc", DocumentStep::Stored);
            cb.on_document_complete(i, 4, "doc", i % 2 == 0);
        }
        assert_eq!(cb.started.load(Ordering::SeqCst), 4);
        assert_eq!(cb.steps.load(Ordering::SeqCst), 4);
        assert_eq!(cb.completed.load(Ordering::SeqCst), 4);
    }
}
