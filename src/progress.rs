//! Progress-callback trait for per-page task events.
//!
//! Pass a `&dyn TaskProgressCallback` to
//! [`crate::task::TaskRunner::run`] to hear about each page as it completes.
//! Callbacks run synchronously on the task's own flow, after the matching
//! state record has been persisted and before the next page starts, so a
//! slow callback slows the task down.
//!
//! # Example
//!
//! ```rust
//! use pageocr::{ProgressFn, TaskProgressCallback};
//!
//! let cb = ProgressFn(|percent: u8| eprintln!("{percent}%"));
//! cb.on_page_complete(1, 4, 25);
//! ```

use std::sync::Arc;

/// Receives task progress events. All methods default to no-ops.
pub trait TaskProgressCallback: Send + Sync {
    /// Called once, after rendering, when the page count is known.
    fn on_task_start(&self, task_id: &str, total_pages: usize) {
        let _ = (task_id, total_pages);
    }

    /// Called just before a page is sent for recognition.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages in the input
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been recognised and its state persisted.
    ///
    /// `progress` is `floor(page_num / total_pages * 100)`, the same value
    /// written to the state record.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, progress: u8) {
        let _ = (page_num, total_pages, progress);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TaskProgressCallback for NoopProgressCallback {}

/// Adapts a plain `Fn(u8)` percentage callback.
pub struct ProgressFn<F>(pub F);

impl<F> TaskProgressCallback for ProgressFn<F>
where
    F: Fn(u8) + Send + Sync,
{
    fn on_page_complete(&self, _page_num: usize, _total_pages: usize, progress: u8) {
        (self.0)(progress)
    }
}

/// Convenience alias for shared callbacks.
pub type ProgressCallback = Arc<dyn TaskProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_task_start("t", 5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 20);
    }

    #[test]
    fn progress_fn_forwards_percentages_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = ProgressFn(move |p: u8| sink.lock().unwrap().push(p));

        cb.on_task_start("t", 3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 33);
        cb.on_page_complete(2, 3, 66);

        assert_eq!(*seen.lock().unwrap(), vec![33, 66]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        struct Counting(AtomicUsize);
        impl TaskProgressCallback for Counting {
            fn on_page_complete(&self, _: usize, _: usize, _: u8) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let cb: ProgressCallback = counter.clone();
        cb.on_page_complete(1, 2, 50);
        cb.on_page_complete(2, 2, 100);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
