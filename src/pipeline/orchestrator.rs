//! Fan-out/fan-in over the pages of one document.
//!
//! Every page is spawned as its own tokio task, in index order, and gated by
//! a semaphore so at most `concurrency` recognition calls are in flight.
//! Results come back in completion order and are slotted by page index;
//! progress is reported from the single collecting loop, so a
//! [`ProgressSink`] never sees two calls at once.
//!
//! The verdict is all-or-nothing. If any page failed, the outcome carries
//! the failure with the lowest page index (not the first to complete) and no
//! content. Otherwise the pages are joined in index order, each under a
//! `## Page n` heading.

use super::worker::PageWorker;
use crate::error::PageError;
use crate::output::{BatchFailure, BatchOutcome, BatchStats, PageResult, PageUnit};
use crate::progress::ProgressSink;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Heading placed before page `page_num` (1-based) in the combined document.
pub fn page_heading(page_num: usize) -> String {
    format!("\n\n## Page {}\n\n", page_num)
}

/// Runs the page workers of one document under a concurrency bound.
#[derive(Clone)]
pub struct Orchestrator {
    worker: PageWorker,
    concurrency: usize,
}

impl Orchestrator {
    /// `concurrency` is clamped to at least 1.
    pub fn new(worker: PageWorker, concurrency: usize) -> Self {
        Self {
            worker,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn worker(&self) -> &PageWorker {
        &self.worker
    }

    /// Process every unit and reassemble the document.
    ///
    /// Units must be numbered `0..units.len()`; a unit whose index is out of
    /// range is ignored and its slot reported as [`PageError::Missing`].
    pub async fn run(&self, units: Vec<PageUnit>, progress: &dyn ProgressSink) -> BatchOutcome {
        let start = Instant::now();
        let total = units.len();
        if total == 0 {
            return BatchOutcome {
                content: String::new(),
                first_error: None,
                stats: BatchStats::default(),
            };
        }

        info!(
            "Dispatching {} pages (concurrency: {})",
            total, self.concurrency
        );
        progress.on_progress(
            0,
            total,
            &format!("dispatching {} pages (concurrency: {})", total, self.concurrency),
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for unit in units {
            let worker = self.worker.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let index = unit.index;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return PageResult::failure(index, PageError::Missing, 0);
                };
                match AssertUnwindSafe(worker.process(unit)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => PageResult::failure(
                        index,
                        PageError::Panicked {
                            detail: panic_detail(payload.as_ref()),
                        },
                        0,
                    ),
                }
            });
        }

        let mut slots: Vec<Option<PageResult>> = vec![None; total];
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    // Panics are caught inside the task; only an aborted task lands here.
                    warn!("Page task did not finish: {}", e);
                    continue;
                }
            };
            let index = result.index;
            let Some(slot) = slots.get_mut(index) else {
                warn!("Result for out-of-range page {} ignored", index + 1);
                continue;
            };
            if slot.is_some() {
                warn!("Duplicate result for page {} ignored", index + 1);
                continue;
            }
            *slot = Some(result);
            completed += 1;
            progress.on_progress(completed, total, &format!("completed {}/{}", completed, total));
        }

        let results: Vec<PageResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| PageResult::failure(index, PageError::Missing, 0))
            })
            .collect();

        let outcome = reassemble(&results, start.elapsed().as_millis() as u64);
        match &outcome.first_error {
            None => info!(
                "All {} pages recognised in {}ms",
                total, outcome.stats.duration_ms
            ),
            Some(failure) => warn!(
                "{} of {} pages failed; {}",
                outcome.stats.failed_pages,
                total,
                failure.message()
            ),
        }
        outcome
    }
}

/// Build the outcome from results already sorted by index.
fn reassemble(results: &[PageResult], duration_ms: u64) -> BatchOutcome {
    let failed_pages = results.iter().filter(|r| !r.is_success()).count();
    let stats = BatchStats {
        total_pages: results.len(),
        succeeded_pages: results.len() - failed_pages,
        failed_pages,
        duration_ms,
    };

    let first_error = results.iter().find_map(|r| {
        r.error.clone().map(|error| BatchFailure {
            index: r.index,
            error,
        })
    });
    if first_error.is_some() {
        return BatchOutcome {
            content: String::new(),
            first_error,
            stats,
        };
    }

    let mut content = String::new();
    for page in results {
        content.push_str(&page_heading(page.index + 1));
        content.push_str(&page.content);
    }
    debug!("Reassembled {} pages into {} chars", results.len(), content.len());

    BatchOutcome {
        content,
        first_error: None,
        stats,
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(index: usize, text: &str) -> PageResult {
        PageResult::success(index, text.to_string(), 1)
    }

    fn bad(index: usize, detail: &str) -> PageResult {
        PageResult::failure(
            index,
            PageError::Recognition {
                detail: detail.to_string(),
            },
            1,
        )
    }

    #[test]
    fn headings_are_one_based() {
        assert_eq!(page_heading(1), "\n\n## Page 1\n\n");
    }

    #[test]
    fn joins_pages_in_index_order() {
        let outcome = reassemble(&[ok(0, "alpha"), ok(1, "beta")], 5);
        assert_eq!(outcome.content, "\n\n## Page 1\n\nalpha\n\n## Page 2\n\nbeta");
        assert!(outcome.is_success());
        assert_eq!(outcome.stats.succeeded_pages, 2);
        assert_eq!(outcome.stats.duration_ms, 5);
    }

    #[test]
    fn lowest_failing_index_is_reported() {
        let outcome = reassemble(&[ok(0, "a"), bad(1, "first"), bad(2, "second")], 0);
        let failure = outcome.first_error.unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.message(), "page 2 failed: first");
        assert!(outcome.content.is_empty());
        assert_eq!(outcome.stats.failed_pages, 2);
    }

    #[test]
    fn empty_page_text_still_gets_heading() {
        let outcome = reassemble(&[ok(0, "")], 0);
        assert_eq!(outcome.content, "\n\n## Page 1\n\n");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_detail(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_detail(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_detail(boxed.as_ref()), "unknown panic payload");
    }
}
