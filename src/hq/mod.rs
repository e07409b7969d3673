// src/hq/mod.rs
// =============================================================================
// The crawl HQ bridge: makes the local queue one shard of a crawl that a
// central service coordinates.
//
// Three loops run next to the fetch workers:
// - producer: pushes URLs we discovered up to HQ, retrying forever
// - consumer: pulls batches of URLs assigned to us into the local queue
// - reporter: tells HQ which of its URLs we finished, best effort
//
// Each loop is a plain async method on a cheap-to-clone HqBridge, so any of
// them can be spawned again if it dies.
// =============================================================================

mod client;
mod consumer;
mod finished;
mod hops;
mod producer;
mod state;

pub use client::{FeedBatch, HqClient, HqError, HqUrl, HttpHqClient};
pub use consumer::parse_feed_url;
pub use hops::{decode_hops, encode_hops, HOP_MARKER};
pub use producer::discovered_url;
pub use state::{ActiveWorker, CrawlState};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::HqConfig;
use crate::queue::{Item, PersistentGroupedQueue};

#[derive(Clone)]
pub struct HqBridge {
    client: Arc<dyn HqClient>,
    state: Arc<CrawlState>,
    config: Arc<HqConfig>,
}

/// The running loops and the channels that feed them.
pub struct BridgeHandles {
    /// Newly discovered items for the producer
    pub discovered: mpsc::Sender<Item>,
    /// Processed items for the reporter
    pub finished: mpsc::Sender<Item>,
    pub producer: JoinHandle<()>,
    pub consumer: JoinHandle<()>,
    pub reporter: JoinHandle<()>,
}

impl HqBridge {
    pub fn new(client: Arc<dyn HqClient>, state: Arc<CrawlState>, config: HqConfig) -> Self {
        Self {
            client,
            state,
            config: Arc::new(config),
        }
    }

    pub fn state(&self) -> &Arc<CrawlState> {
        &self.state
    }

    /// Starts all three loops. `capacity` bounds each channel.
    pub fn spawn(&self, queue: Arc<PersistentGroupedQueue>, capacity: usize) -> BridgeHandles {
        let (discovered, discovered_rx) = mpsc::channel(capacity);
        let (finished, finished_rx) = mpsc::channel(capacity);

        BridgeHandles {
            discovered,
            finished,
            producer: tokio::spawn(self.clone().run_producer(discovered_rx)),
            consumer: tokio::spawn(self.clone().run_consumer(queue)),
            reporter: tokio::spawn(self.clone().run_reporter(finished_rx)),
        }
    }
}

impl BridgeHandles {
    /// Closes the channels and waits for every loop to stop.
    ///
    /// The producer only gives up on a failing send once the crawl is
    /// finished, so mark it finished first.
    pub async fn join(self) {
        let BridgeHandles {
            discovered,
            finished,
            producer,
            consumer,
            reporter,
        } = self;
        drop(discovered);
        drop(finished);

        let (producer, consumer, reporter) = futures::join!(producer, consumer, reporter);
        for (name, result) in [("producer", producer), ("consumer", consumer), ("reporter", reporter)] {
            if let Err(e) = result {
                warn!(task = name, error = %e, "HQ loop ended abnormally");
            }
        }
    }
}
