// src/queue/mod.rs
// =============================================================================
// The persistent grouped queue: the crawl frontier.
//
// Pieces:
// - log: append-only item records on disk, addressed by byte offset
// - index: per-host FIFOs of pending offsets plus a round-robin cursor
// - stats: counters, behind their own lock
// - metadata: checkpoint of index + stats, rewritten after every mutation
//
// Dequeue serves hosts round-robin so one busy host can't starve the rest,
// and keeps each host's items in the order they were enqueued.
//
// One process owns a queue directory at a time: open takes an exclusive
// advisory lock on queue.lock and holds it until the queue is dropped.
// Readers that only want numbers go through read_stats, which never touches
// the log.
// =============================================================================

mod error;
mod index;
mod item;
mod log;
mod metadata;
mod stats;

pub use error::{QueueError, Result};
pub use index::HostIndex;
pub use item::{Item, ItemType};
pub use log::ItemLog;
pub use metadata::QueueMetadata;
pub use stats::QueueStats;

use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Notify;
use tokio::task;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;

pub const LOG_FILE: &str = "queue.log";
pub const METADATA_FILE: &str = "queue.meta";
pub const LOCK_FILE: &str = "queue.lock";

// Everything a scheduling decision touches, guarded together
struct Inner {
    log: ItemLog,
    index: HostIndex,
}

pub struct PersistentGroupedQueue {
    inner: Mutex<Inner>,
    stats: Mutex<QueueStats>,
    available: Notify,
    closed: AtomicBool,
    metadata_path: PathBuf,
    dequeue_timeout: Duration,
    // Held for the queue's lifetime, unlocked when the file is closed
    _lock: File,
}

impl PersistentGroupedQueue {
    /// Opens the queue in `config.dir`, recovering pending work from the
    /// last checkpoint if there is one.
    pub fn open(config: &QueueConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)
            .map_err(|e| QueueError::io("failed to create queue directory", e))?;
        let lock = lock_dir(&config.dir)?;

        let log = ItemLog::open(config.dir.join(LOG_FILE))?;
        let metadata_path = config.dir.join(METADATA_FILE);

        let (index, stats) = match QueueMetadata::load(&metadata_path)? {
            Some(QueueMetadata { mut index, mut stats }) => {
                let dropped = index.sanitize(log.len());
                if dropped > 0 {
                    warn!(dropped, "queue metadata referenced offsets past the end of the log");
                }
                stats.rebuild_pending(index.counts());
                info!(
                    pending = stats.total_elements,
                    hosts = stats.unique_hosts,
                    "recovered queue from metadata"
                );
                (index, stats)
            }
            None => (HostIndex::new(), QueueStats::default()),
        };

        Ok(Self {
            inner: Mutex::new(Inner { log, index }),
            stats: Mutex::new(stats),
            available: Notify::new(),
            closed: AtomicBool::new(false),
            metadata_path,
            dequeue_timeout: config.dequeue_timeout,
            _lock: lock,
        })
    }

    /// Reads the last checkpointed stats without opening the queue.
    ///
    /// Safe to call while another process owns the directory: the log is
    /// only measured, never written, and the snapshot is replaced atomically.
    pub fn read_stats(config: &QueueConfig) -> Result<QueueStats> {
        let Some(QueueMetadata { mut index, mut stats }) =
            QueueMetadata::load(&config.dir.join(METADATA_FILE))?
        else {
            return Ok(QueueStats::default());
        };

        let log_end = match fs::metadata(config.dir.join(LOG_FILE)) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(QueueError::io("failed to inspect item log", e)),
        };
        index.sanitize(log_end);
        stats.rebuild_pending(index.counts());
        Ok(stats)
    }

    /// Appends `item` and makes it available to one waiting consumer.
    pub fn enqueue(&self, item: &Item) -> Result<()> {
        run_blocking(|| self.append(item))?;
        self.available.notify_one();
        Ok(())
    }

    fn append(&self, item: &Item) -> Result<()> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let host = item
            .host()
            .ok_or_else(|| QueueError::MissingHost(item.url.to_string()))?;

        let mut inner = self.lock_inner();
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let offset = inner.log.append(item)?;
        inner.index.push(&host, offset);

        let mut stats = self.stats();
        stats.record_enqueue(&host, Utc::now());
        if let Err(e) = metadata::save_parts(&inner.index, &stats, &self.metadata_path) {
            inner.index.undo_push(&host, offset);
            return Err(e);
        }
        *self.lock_stats() = stats;
        drop(inner);

        debug!(host = %host, offset, url = %item.url, "enqueued item");
        Ok(())
    }

    /// Takes the next item, rotating across hosts.
    ///
    /// Waits up to the configured timeout when nothing is pending. Returns
    /// `QueueError::Timeout` if nothing arrived and `QueueError::Closed` if
    /// the queue was closed, before or during the wait.
    pub async fn dequeue(&self) -> Result<Item> {
        let deadline = Instant::now() + self.dequeue_timeout;

        loop {
            // Register interest before looking, so an enqueue or close that
            // lands between the check and the wait still wakes us
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            if let Some(item) = run_blocking(|| self.try_dequeue())? {
                return Ok(item);
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                return Err(if self.is_closed() {
                    QueueError::Closed
                } else {
                    QueueError::Timeout
                });
            }
        }
    }

    /// Non-blocking half of `dequeue`. None means no host had pending work.
    fn try_dequeue(&self) -> Result<Option<Item>> {
        let mut guard = self.lock_inner();
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let Inner { log, index } = &mut *guard;

        let Some(candidate) = index.next_candidate() else {
            return Ok(None);
        };

        let item = match log.read_at(candidate.offset) {
            Ok(item) => item,
            Err(QueueError::Decode { offset, source }) => {
                // An unreadable record would block its host forever
                let popped = index.pop(&candidate);
                let mut stats = self.stats();
                stats.record_discard(&popped.host);
                if let Err(e) = metadata::save_parts(index, &stats, &self.metadata_path) {
                    index.restore(popped);
                    return Err(e);
                }
                *self.lock_stats() = stats;
                error!(host = %candidate.host, offset, error = %source, "discarded unreadable queue record");
                return Err(QueueError::Decode { offset, source });
            }
            // Transient: leave the offset where it is
            Err(e) => return Err(e),
        };

        let popped = index.pop(&candidate);
        let mut stats = self.stats();
        stats.record_dequeue(&popped.host, Utc::now());
        if let Err(e) = metadata::save_parts(index, &stats, &self.metadata_path) {
            index.restore(popped);
            return Err(e);
        }
        *self.lock_stats() = stats;

        debug!(host = %popped.host, offset = popped.offset, url = %item.url, "dequeued item");
        Ok(Some(item))
    }

    /// Closes the queue. Blocked and future calls fail with `QueueError::Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.available.notify_waiters();
        info!(pending = self.len(), "queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pending items across all hosts.
    pub fn len(&self) -> u64 {
        self.lock_stats().total_elements
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current counters.
    pub fn stats(&self) -> QueueStats {
        self.lock_stats().clone()
    }

    /// Hosts in their current rotation order.
    pub fn hosts(&self) -> Vec<String> {
        self.lock_inner().index.hosts().to_vec()
    }

    pub fn dequeue_timeout(&self) -> Duration {
        self.dequeue_timeout
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, QueueStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_dir(dir: &Path) -> Result<File> {
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE))
        .map_err(|e| QueueError::io("failed to open queue lock", e))?;

    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(QueueError::Locked(dir.to_path_buf()))
        }
        Err(e) => Err(QueueError::io("failed to lock queue directory", e)),
    }
}

// File I/O and fsync happen under the index lock. On a multi-threaded
// runtime, hand the worker's other tasks to another thread while we block.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::io::{Seek, SeekFrom, Write};
    use std::sync::Arc;
    use url::Url;

    fn item(url: &str) -> Item {
        Item::seed(Url::parse(url).unwrap())
    }

    fn open(dir: &tempfile::TempDir) -> PersistentGroupedQueue {
        PersistentGroupedQueue::open(&QueueConfig::new(dir.path())).unwrap()
    }

    async fn drain(queue: &PersistentGroupedQueue) -> Vec<String> {
        let mut urls = Vec::new();
        while !queue.is_empty() {
            urls.push(queue.dequeue().await.unwrap().url.to_string());
        }
        urls
    }

    fn assert_stats_consistent(queue: &PersistentGroupedQueue) {
        let stats = queue.stats();
        assert_eq!(stats.total_elements, stats.elements_per_host.values().sum::<u64>());
        assert_eq!(
            stats.unique_hosts,
            stats.elements_per_host.values().filter(|c| **c > 0).count() as u64
        );
    }

    #[tokio::test]
    async fn test_fifo_per_host() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        for path in ["1", "2", "3"] {
            queue.enqueue(&item(&format!("https://a.example/{}", path))).unwrap();
        }

        assert_eq!(
            drain(&queue).await,
            vec!["https://a.example/1", "https://a.example/2", "https://a.example/3"]
        );
    }

    #[tokio::test]
    async fn test_round_robin_across_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/1")).unwrap();
        queue.enqueue(&item("https://a.example/2")).unwrap();
        queue.enqueue(&item("https://a.example/3")).unwrap();
        queue.enqueue(&item("https://b.example/1")).unwrap();

        assert_eq!(
            drain(&queue).await,
            vec![
                "https://a.example/1",
                "https://b.example/1",
                "https://a.example/2",
                "https://a.example/3",
            ]
        );
    }

    #[tokio::test]
    async fn test_drained_host_rejoins_at_end_of_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/1")).unwrap();
        queue.enqueue(&item("https://b.example/1")).unwrap();
        queue.enqueue(&item("https://b.example/2")).unwrap();

        assert_eq!(queue.dequeue().await.unwrap().url.as_str(), "https://a.example/1");
        assert_eq!(queue.hosts(), vec!["b.example"]);

        queue.enqueue(&item("https://a.example/2")).unwrap();
        assert_eq!(queue.hosts(), vec!["b.example", "a.example"]);
        assert_eq!(
            drain(&queue).await,
            vec!["https://b.example/1", "https://a.example/2", "https://b.example/2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);

        let started = Instant::now();
        let result = queue.dequeue().await;
        assert!(matches!(result, Err(QueueError::Timeout)));
        assert!(result.unwrap_err().is_retriable());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_closed_queue_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/1")).unwrap();

        queue.close();
        queue.close();
        assert!(queue.is_closed());

        let result = queue.dequeue().await;
        assert!(matches!(result, Err(QueueError::Closed)));
        assert!(!result.unwrap_err().is_retriable());
        assert!(matches!(
            queue.enqueue(&item("https://a.example/2")),
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_wakes_blocked_dequeue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(open(&dir));

        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        time::sleep(Duration::from_secs(1)).await;

        let started = Instant::now();
        queue.close();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(QueueError::Closed)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_wakes_blocked_dequeue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(open(&dir));

        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        time::sleep(Duration::from_secs(2)).await;

        queue.enqueue(&item("https://a.example/late")).unwrap();
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.url.as_str(), "https://a.example/late");
    }

    #[tokio::test]
    async fn test_recovery_resumes_pending_work() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = ["a.example", "b.example", "c.example:8080"];

        {
            let queue = open(&dir);
            for n in 0..4 {
                for host in hosts {
                    queue.enqueue(&item(&format!("http://{}/{}", host, n))).unwrap();
                }
            }
            // Serve a few before the "crash"
            for _ in 0..5 {
                queue.dequeue().await.unwrap();
            }
        }

        let queue = open(&dir);
        assert_eq!(queue.len(), 7);
        assert_stats_consistent(&queue);

        let mut served: HashMap<String, Vec<String>> = HashMap::new();
        for url in drain(&queue).await {
            let host = item(&url).host().unwrap();
            served.entry(host).or_default().push(url);
        }

        assert_eq!(served.values().map(Vec::len).sum::<usize>(), 7);
        assert_eq!(served["a.example"], vec!["http://a.example/2", "http://a.example/3"]);
        assert_eq!(served["b.example"], vec!["http://b.example/2", "http://b.example/3"]);
        assert_eq!(
            served["c.example:8080"],
            vec!["http://c.example:8080/1", "http://c.example:8080/2", "http://c.example:8080/3"]
        );
    }

    #[tokio::test]
    async fn test_recovery_keeps_rotation_position() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = open(&dir);
            queue.enqueue(&item("https://a.example/1")).unwrap();
            queue.enqueue(&item("https://a.example/2")).unwrap();
            queue.enqueue(&item("https://b.example/1")).unwrap();
            assert_eq!(queue.dequeue().await.unwrap().url.as_str(), "https://a.example/1");
        }

        let queue = open(&dir);
        assert_eq!(
            drain(&queue).await,
            vec!["https://b.example/1", "https://a.example/2"]
        );
        assert_eq!(queue.stats().dequeue_count, 3);
    }

    #[tokio::test]
    async fn test_stats_stay_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);

        for (n, host) in ["a", "b", "a", "c", "a", "b"].iter().enumerate() {
            queue.enqueue(&item(&format!("https://{}.example/{}", host, n))).unwrap();
            assert_stats_consistent(&queue);
        }
        assert_eq!(queue.stats().unique_hosts, 3);

        for _ in 0..4 {
            queue.dequeue().await.unwrap();
            assert_stats_consistent(&queue);
        }
        let stats = queue.stats();
        assert_eq!(stats.total_elements, 2);
        assert_eq!(stats.enqueue_count, 6);
        assert_eq!(stats.dequeue_count, 4);
        assert!(stats.first_dequeue_time.is_some());
    }

    #[tokio::test]
    async fn test_failed_checkpoint_rolls_back_enqueue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/1")).unwrap();

        // A non-empty directory where the snapshot goes makes the rename fail
        let meta = dir.path().join(METADATA_FILE);
        fs::remove_file(&meta).unwrap();
        fs::create_dir(&meta).unwrap();
        fs::write(meta.join("blocker"), b"").unwrap();

        let result = queue.enqueue(&item("https://b.example/1"));
        assert!(matches!(result, Err(QueueError::Io { .. })));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.hosts(), vec!["a.example"]);

        let result = queue.dequeue().await;
        assert!(matches!(result, Err(QueueError::Io { .. })));
        assert_eq!(queue.len(), 1);

        fs::remove_dir_all(&meta).unwrap();
        assert_eq!(queue.dequeue().await.unwrap().url.as_str(), "https://a.example/1");
        assert_stats_consistent(&queue);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/bad")).unwrap();
        queue.enqueue(&item("https://a.example/good")).unwrap();

        // Corrupt the first record in place
        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join(LOG_FILE))
            .unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(b"X").unwrap();

        assert!(matches!(queue.dequeue().await, Err(QueueError::Decode { offset: 0, .. })));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue().await.unwrap().url.as_str(), "https://a.example/good");
    }

    #[tokio::test]
    async fn test_second_open_of_held_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/1")).unwrap();

        let second = PersistentGroupedQueue::open(&QueueConfig::new(dir.path()));
        assert!(matches!(second, Err(QueueError::Locked(_))));

        drop(queue);
        let reopened = open(&dir);
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_reading_stats_leaves_live_log_alone() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        queue.enqueue(&item("https://a.example/1")).unwrap();
        queue.enqueue(&item("https://b.example/1")).unwrap();
        queue.dequeue().await.unwrap();

        // The owner is part way through appending the next record
        let log_path = dir.path().join(LOG_FILE);
        let mut file = fs::OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(br#"{"url":"ht"#).unwrap();
        let before = fs::read(&log_path).unwrap();

        let stats = PersistentGroupedQueue::read_stats(&QueueConfig::new(dir.path())).unwrap();
        assert_eq!(stats.total_elements, 1);
        assert_eq!(stats.enqueue_count, 2);
        assert_eq!(stats.dequeue_count, 1);
        assert_eq!(fs::read(&log_path).unwrap(), before);
    }

    #[test]
    fn test_reading_stats_of_missing_queue_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig::new(dir.path().join("never-created"));
        let stats = PersistentGroupedQueue::read_stats(&config).unwrap();
        assert_eq!(stats, QueueStats::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_and_consumers_lose_nothing() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 6;
        const PER_PRODUCER: usize = 100;
        const HOSTS: usize = 7;
        let total = PRODUCERS * PER_PRODUCER;

        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig::new(dir.path()).with_dequeue_timeout(Duration::from_secs(30));
        let queue = Arc::new(PersistentGroupedQueue::open(&config).unwrap());
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = queue.clone();
                let delivered = delivered.clone();
                tokio::spawn(async move {
                    loop {
                        match queue.dequeue().await {
                            Ok(item) => delivered.lock().unwrap().push(item.url.to_string()),
                            Err(QueueError::Closed) => return,
                            Err(e) => panic!("consumer stopped with work pending: {}", e),
                        }
                    }
                })
            })
            .collect();

        // Every consumer is parked on the empty queue before work arrives
        tokio::time::sleep(Duration::from_millis(50)).await;

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for n in 0..PER_PRODUCER {
                        let url = format!("https://h{}.example/{}/{}", n % HOSTS, producer, n);
                        queue.enqueue(&item(&url)).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(20), async {
            while delivered.lock().unwrap().len() < total {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("items were left undelivered");

        queue.close();
        for consumer in consumers {
            consumer.await.unwrap();
        }

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), total);
        assert_eq!(delivered.iter().collect::<HashSet<_>>().len(), total);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().dequeue_count, total as u64);
        assert_stats_consistent(&queue);
    }

    #[tokio::test]
    async fn test_urls_without_host_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let queue = open(&dir);
        let result = queue.enqueue(&item("mailto:someone@example.com"));
        assert!(matches!(result, Err(QueueError::MissingHost(_))));
        assert!(queue.is_empty());
    }
}
