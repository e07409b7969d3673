// src/lib.rs
// =============================================================================
// hq-frontier: a durable, host-aware crawl frontier.
//
// Modules:
// - queue: the persistent grouped queue (item log, host fairness index,
//   stats, metadata checkpoints)
// - hq: the bridge that makes the queue one shard of an HQ-coordinated crawl
// - crawl: reference fetch workers that drain the queue
// - config: tunables for all of the above
// - logging: tracing subscriber setup for the binary
// =============================================================================

pub mod config;
pub mod crawl;
pub mod hq;
pub mod logging;
pub mod queue;

pub use config::{HqConfig, QueueConfig, WorkerConfig};
pub use queue::{Item, ItemType, PersistentGroupedQueue, QueueError, QueueStats};
