// src/config.rs
// =============================================================================
// Tunables for the queue, the HQ bridge and the reference workers.
//
// Every struct has a Default matching the behaviour crawl HQ deployments
// expect (5s dequeue timeout, 1s discovery retry, throttle at 90% of
// workers). The CLI builds these from its flags.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FEED_THROTTLE_RATIO: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding `queue.log` and `queue.meta`
    pub dir: PathBuf,
    /// How long Dequeue waits on an empty queue before reporting a timeout
    pub dequeue_timeout: Duration,
}

impl QueueConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("jobs/queue"),
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HqConfig {
    pub address: String,
    pub key: String,
    pub secret: String,
    pub project: String,
    /// Fixed pause between attempts to push a discovered URL
    pub discovery_retry_delay: Duration,
    /// Stop pulling work once active workers reach this share of capacity
    pub feed_throttle_ratio: f64,
    /// Pause while throttled
    pub throttle_delay: Duration,
    /// Pause while the crawl is paused
    pub pause_delay: Duration,
    /// Pause after a failed feed request
    pub feed_error_delay: Duration,
    /// Pause after HQ returned an empty batch
    pub empty_feed_delay: Duration,
}

impl Default for HqConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            key: String::new(),
            secret: String::new(),
            project: String::new(),
            discovery_retry_delay: Duration::from_secs(1),
            feed_throttle_ratio: DEFAULT_FEED_THROTTLE_RATIO,
            throttle_delay: Duration::from_millis(100),
            pause_delay: Duration::from_secs(1),
            feed_error_delay: Duration::from_secs(1),
            empty_feed_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    /// Outlinks beyond this many hops are not reported; 0 means no limit
    pub max_hops: u8,
    pub fetch_timeout: Duration,
    pub user_agent: String,
}

impl WorkerConfig {
    pub fn allows_hop(&self, hop: u8) -> bool {
        self.max_hops == 0 || hop <= self.max_hops
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_hops: 0,
            fetch_timeout: Duration::from_secs(10),
            user_agent: concat!("hq-frontier/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let queue = QueueConfig::new("/tmp/q");
        assert_eq!(queue.dir, PathBuf::from("/tmp/q"));
        assert_eq!(queue.dequeue_timeout, Duration::from_secs(5));

        let hq = HqConfig::default();
        assert_eq!(hq.discovery_retry_delay, Duration::from_secs(1));
        assert_eq!(hq.feed_throttle_ratio, 0.9);
    }

    #[test]
    fn test_max_hops_zero_is_unlimited() {
        let mut workers = WorkerConfig::default();
        assert!(workers.allows_hop(u8::MAX));

        workers.max_hops = 2;
        assert!(workers.allows_hop(2));
        assert!(!workers.allows_hop(3));
    }
}
