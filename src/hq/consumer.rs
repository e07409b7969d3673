// src/hq/consumer.rs
// =============================================================================
// Feed consumer: pulls URLs assigned to this shard from crawl HQ into the
// local queue.
//
// Each pass:
// 1. finished? stop
// 2. paused? wait and look again
// 3. busy workers at or over the throttle share of the pool? wait, don't
//    ask for more than the workers can take
// 4. ask for a batch sized to the pool and enqueue every URL as a seed that
//    carries HQ's identifier, with hop depth read back from `path`
//
// Failed requests and unparsable URLs are logged and skipped.
// =============================================================================

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use super::client::HqUrl;
use super::hops::decode_hops;
use super::HqBridge;
use crate::queue::{Item, ItemType, PersistentGroupedQueue, QueueError};

/// Rebuilds a queue item from a URL handed out by HQ.
pub fn parse_feed_url(url: &HqUrl) -> Result<Item, url::ParseError> {
    let parsed = Url::parse(&url.value)?;
    let id = (!url.id.is_empty()).then(|| url.id.clone());
    Ok(Item::new(parsed, None, ItemType::Seed, decode_hops(&url.path), id))
}

impl HqBridge {
    pub async fn run_consumer(self, queue: Arc<PersistentGroupedQueue>) {
        loop {
            if self.state.is_finished() {
                break;
            }

            if self.state.is_paused() {
                tokio::time::sleep(self.config.pause_delay).await;
                continue;
            }

            if self.state.is_saturated(self.config.feed_throttle_ratio) {
                tokio::time::sleep(self.config.throttle_delay).await;
                continue;
            }

            let batch = match self.client.feed(self.state.workers()).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(
                        project = %self.config.project,
                        address = %self.config.address,
                        error = %e,
                        "error getting new URLs from crawl HQ"
                    );
                    tokio::time::sleep(self.config.feed_error_delay).await;
                    continue;
                }
            };

            if batch.urls.is_empty() {
                tokio::time::sleep(self.config.empty_feed_delay).await;
                continue;
            }
            debug!(urls = batch.urls.len(), "received batch from crawl HQ");

            for url in &batch.urls {
                let item = match parse_feed_url(url) {
                    Ok(item) => item,
                    Err(e) => {
                        warn!(
                            project = %self.config.project,
                            address = %self.config.address,
                            url = %url.value,
                            error = %e,
                            "unable to parse URL received from crawl HQ, discarding"
                        );
                        continue;
                    }
                };

                match queue.enqueue(&item) {
                    Ok(()) => {}
                    Err(QueueError::Closed) => {
                        info!("queue closed, feed consumer stopping");
                        return;
                    }
                    Err(e) => {
                        error!(url = %item.url, hq_id = ?item.id, error = %e, "failed to enqueue URL from crawl HQ");
                    }
                }
            }
        }
        info!("feed consumer stopped");
    }
}
