//! Worker pool for per-module translation.
//!
//! Jobs are independent, so workers simply pull the next index from a
//! shared cursor until the list is exhausted. With `fail_fast`, the first
//! failure stops workers from taking further jobs; jobs already running
//! finish normally.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;

/// Fixed-size pool of scoped worker threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    nthreads: usize,
    fail_fast: bool,
}

impl WorkerPool {
    pub fn new(nthreads: usize, fail_fast: bool) -> Self {
        Self {
            nthreads: nthreads.max(1),
            fail_fast,
        }
    }

    /// Run `work` over every job. Results are returned in job order; jobs
    /// skipped after a fail-fast stop are `None`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run<T, R, E, F>(&self, jobs: &[T], work: F) -> Vec<Option<Result<R, E>>>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        let cursor = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let results: Mutex<Vec<Option<Result<R, E>>>> =
            Mutex::new((0..jobs.len()).map(|_| None).collect());
        let workers = self.nthreads.min(jobs.len());

        thread::scope(|scope| {
            for worker in 0..workers {
                let (cursor, stop, results, work) = (&cursor, &stop, &results, &work);
                scope.spawn(move || {
                    let mut done = 0usize;
                    while !stop.load(Ordering::Acquire) {
                        let index = cursor.fetch_add(1, Ordering::AcqRel);
                        let Some(job) = jobs.get(index) else {
                            break;
                        };
                        let result = work(job);
                        if result.is_err() && self.fail_fast {
                            stop.store(true, Ordering::Release);
                        }
                        results.lock()[index] = Some(result);
                        done += 1;
                    }
                    tracing::trace!(worker, jobs = done, "worker finished");
                });
            }
        });

        results.into_inner()
    }
}
