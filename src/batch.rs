//! Resumable batch execution over a fixed-size worker pool.
//!
//! Partitioning is static (item `i` goes to worker `i mod n`), so the split
//! is deterministic for a given listing and worker count and no work
//! stealing happens. Per-item failures and panics are captured with the
//! item's context and never cross an item boundary; the pool is joined
//! before a stage is declared complete.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PrepError;
use crate::logsink::LogHandle;

/// What the per-item closure did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    /// Output artifacts already existed; nothing was recomputed.
    Skipped,
    /// Input failed a data-quality gate and was dropped on purpose. The
    /// stage logs its own line for these; they are not failures.
    Rejected,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub done: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Striding partition: item `i` -> partition `i mod n`. The union of all
/// partitions is the item set, each item exactly once, for any `n >= 1`.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    let workers = workers.max(1);
    let mut parts = vec![Vec::new(); workers];
    for (i, item) in items.iter().enumerate() {
        parts[i % workers].push(item.clone());
    }
    parts
}

pub struct BatchRunner {
    workers: usize,
    /// Progress lines per worker: every `max(len / divisor, 1)` items.
    progress_divisor: usize,
}

impl BatchRunner {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            progress_divisor: 5,
        }
    }

    pub fn with_progress_divisor(mut self, divisor: usize) -> Self {
        self.progress_divisor = divisor.max(1);
        self
    }

    /// Run `process` over all items. Blocks until every worker finished its
    /// partition. `process` must be callable from multiple threads; one
    /// worker's pathological item stalls only that worker's partition.
    pub fn run<T, F>(&self, stage: &str, items: &[T], log: &LogHandle, process: F) -> BatchSummary
    where
        T: Clone + Send + Sync + std::fmt::Debug,
        F: Fn(&T) -> Result<ItemOutcome, PrepError> + Send + Sync,
    {
        if items.is_empty() {
            log.log(format!("{stage}: nothing to do"));
            return BatchSummary::default();
        }
        log.log(format!("{stage}: todo {}", items.len()));

        let done = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let rejected = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let parts = partition(items, self.workers);

        std::thread::scope(|scope| {
            for (w, part) in parts.iter().enumerate() {
                let log = log.clone();
                let process = &process;
                let (done, skipped, rejected, failed) = (&done, &skipped, &rejected, &failed);
                let every = (part.len() / self.progress_divisor).max(1);
                scope.spawn(move || {
                    for (k, item) in part.iter().enumerate() {
                        if k % every == 0 {
                            log.log(format!(
                                "{stage}: worker {w} at {k}/{} {item:?}",
                                part.len()
                            ));
                        }
                        match catch_unwind(AssertUnwindSafe(|| process(item))) {
                            Ok(Ok(ItemOutcome::Done)) => {
                                done.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Ok(ItemOutcome::Skipped)) => {
                                skipped.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Ok(ItemOutcome::Rejected)) => {
                                rejected.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Err(err)) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                log.log(format!(
                                    "{stage}: item {k} of worker {w} failed ({item:?}): {err}"
                                ));
                            }
                            Err(panic) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                let msg = panic_message(&panic);
                                log.log(format!(
                                    "{stage}: item {k} of worker {w} panicked ({item:?}): {msg}"
                                ));
                            }
                        }
                    }
                });
            }
        });

        let summary = BatchSummary {
            done: done.into_inner(),
            skipped: skipped.into_inner(),
            rejected: rejected.into_inner(),
            failed: failed.into_inner(),
        };
        log.log(format!(
            "{stage}: finished, done {} skipped {} rejected {} failed {}",
            summary.done, summary.skipped, summary.rejected, summary.failed
        ));
        summary
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
