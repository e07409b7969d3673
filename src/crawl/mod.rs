// src/crawl/mod.rs
// =============================================================================
// Reference fetch workers for the frontier.
//
// The frontier itself only decides what to fetch next. This module is the
// simplest pool that actually drains it:
// - worker: dequeue, fetch, report outlinks, report completion
// - links: pull absolute http(s) outlinks out of an HTML page
// =============================================================================

mod links;
mod worker;

pub use links::extract_outlinks;
pub use worker::{run_workers, WorkerChannels};
