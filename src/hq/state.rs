// src/hq/state.rs
// =============================================================================
// Crawl-wide flags shared by the bridge loops and the workers.
//
// All fields are atomics so any loop can read them at any time without
// locking, and no reader ever sees a half-updated value.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct CrawlState {
    finished: AtomicBool,
    paused: AtomicBool,
    active_workers: AtomicUsize,
    workers: usize,
}

impl CrawlState {
    /// `workers` is the size of the fetch pool, the capacity the feed
    /// consumer sizes its requests and its throttle against.
    pub fn new(workers: usize) -> Self {
        Self {
            finished: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            workers,
        }
    }

    /// One-way: once finished, the crawl never resumes.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Counts a worker as busy until the returned guard is dropped.
    pub fn worker_started(&self) -> ActiveWorker<'_> {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
        ActiveWorker { state: self }
    }

    /// True once busy workers reach `ratio` of the pool.
    pub fn is_saturated(&self, ratio: f64) -> bool {
        self.active_workers() as f64 >= self.workers as f64 * ratio
    }
}

#[must_use = "the worker counts as active only while the guard lives"]
#[derive(Debug)]
pub struct ActiveWorker<'a> {
    state: &'a CrawlState,
}

impl Drop for ActiveWorker<'_> {
    fn drop(&mut self) {
        self.state.active_workers.fetch_sub(1, Ordering::AcqRel);
    }
}
