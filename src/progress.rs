//! Progress notifications for document processing.
//!
//! Inject an [`Arc<dyn ProgressSink>`] into
//! [`crate::service::DocumentService`] (or pass a `&dyn ProgressSink` to
//! [`crate::pipeline::orchestrator::Orchestrator::run`]) to receive
//! `(current, total, message)` events as pages complete.
//!
//! # Serialised delivery
//!
//! Pages are recognised by concurrent workers, but the sink is only ever
//! invoked from the orchestrator's collection loop, one call at a time and
//! in completion order. Implementations need no locking of their
//! own to keep their state consistent.
//!
//! # Example
//!
//! ```rust
//! use docparse::progress::ProgressSink;
//! use std::sync::Arc;
//!
//! let sink: Arc<dyn ProgressSink> = Arc::new(|current: usize, total: usize, message: &str| {
//!     eprintln!("[{current}/{total}] {message}");
//! });
//! sink.on_progress(0, 3, "dispatching 3 pages");
//! ```

use std::sync::Arc;

/// Receives `(current, total, message)` progress notifications.
///
/// For an orchestrated document the sequence is: one `(0, N)` when pages
/// are dispatched, then exactly one `(k, N)` per completed page for
/// `k = 1..=N`. Nothing is emitted for a document with zero pages.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, current: usize, total: usize, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn on_progress(&self, current: usize, total: usize, message: &str) {
        self(current, total, message)
    }
}

/// A sink that drops every notification.
///
/// This is the default when no sink is configured.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _current: usize, _total: usize, _message: &str) {}
}

/// Convenience alias for the shared sink type.
pub type SharedProgress = Arc<dyn ProgressSink>;
