//! Progress-callback trait for extraction and translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::TranslatorConfigBuilder::progress_callback`] to follow a
//! translation as it moves through the pipeline. The CLI uses it to drive a
//! busy spinner; an embedding application could forward events to a
//! WebSocket or a log sink instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_translate::{TranslationProgressCallback, TranslatorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RetryCounter {
//!     retries: AtomicUsize,
//! }
//!
//! impl TranslationProgressCallback for RetryCounter {
//!     fn on_retry(&self, attempt: u32, max_retries: u32, error: &str, backoff_ms: u64) {
//!         self.retries.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("retry {attempt}/{max_retries} in {backoff_ms}ms: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(RetryCounter { retries: AtomicUsize::new(0) });
//! let config = TranslatorConfig::builder()
//!     .progress_callback(counter as Arc<dyn TranslationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline at each stage boundary.
///
/// All methods default to no-ops so callers only override what they need.
pub trait TranslationProgressCallback: Send + Sync {
    /// An uploaded document is about to be converted.
    fn on_extraction_start(&self, filename: &str, size_bytes: usize) {
        let _ = (filename, size_bytes);
    }

    /// Conversion produced `text_len` bytes of text.
    fn on_extraction_complete(&self, filename: &str, text_len: usize) {
        let _ = (filename, text_len);
    }

    /// Conversion failed; `error` is the user-facing reason.
    fn on_extraction_error(&self, filename: &str, error: &str) {
        let _ = (filename, error);
    }

    /// The chat-completion request is about to be sent.
    fn on_request_start(&self, model: &str, target_language: &str) {
        let _ = (model, target_language);
    }

    /// A transient failure will be retried after `backoff_ms`.
    fn on_retry(&self, attempt: u32, max_retries: u32, error: &str, backoff_ms: u64) {
        let _ = (attempt, max_retries, error, backoff_ms);
    }

    /// The sanitized Markdown is ready.
    fn on_translation_complete(&self, markdown_len: usize) {
        let _ = markdown_len;
    }

    /// The request failed for good.
    fn on_translation_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TranslatorConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        retries: AtomicUsize,
        completed_len: AtomicUsize,
        errors: Mutex<Vec<String>>,
    }

    impl TranslationProgressCallback for TrackingCallback {
        fn on_retry(&self, _attempt: u32, _max: u32, _error: &str, _backoff_ms: u64) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_translation_complete(&self, markdown_len: usize) {
            self.completed_len.store(markdown_len, Ordering::SeqCst);
        }

        fn on_translation_error(&self, error: &str) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start("a.docx", 10);
        cb.on_extraction_complete("a.docx", 5);
        cb.on_extraction_error("b.docx", "corrupt");
        cb.on_request_start("gpt-4o-mini", "French");
        cb.on_retry(1, 2, "timeout", 500);
        cb.on_translation_complete(42);
        cb.on_translation_error("boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_retry(1, 2, "HTTP 503", 500);
        tracker.on_retry(2, 2, "HTTP 503", 1000);
        tracker.on_translation_error("HTTP 503");
        tracker.on_translation_complete(128);

        assert_eq!(tracker.retries.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completed_len.load(Ordering::SeqCst), 128);
        assert_eq!(tracker.errors.lock().unwrap().as_slice(), ["HTTP 503"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_request_start("gpt-4o-mini", "Somali");
    }
}
