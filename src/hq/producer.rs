// src/hq/producer.rs
// =============================================================================
// Discovery producer: forwards every URL the workers discover to crawl HQ.
//
// A discovered URL is never dropped. If HQ can't be reached the same URL is
// retried after a fixed delay, for as long as it takes, and nothing behind it
// moves. The only way out is the crawl being marked finished, which is
// checked before every attempt and stops the producer for good.
// =============================================================================

use tokio::sync::mpsc;
use tracing::{error, info};

use super::client::HqUrl;
use super::hops::encode_hops;
use super::HqBridge;
use crate::queue::Item;

/// The wire form of a locally discovered item.
pub fn discovered_url(item: &Item) -> HqUrl {
    HqUrl {
        id: String::new(),
        value: item.url.to_string(),
        via: item
            .parent_url
            .as_ref()
            .map(|parent| parent.to_string())
            .unwrap_or_default(),
        path: encode_hops(item.hop),
    }
}

impl HqBridge {
    pub async fn run_producer(self, mut discovered: mpsc::Receiver<Item>) {
        'items: while let Some(item) = discovered.recv().await {
            let url = discovered_url(&item);

            loop {
                if self.state.is_finished() {
                    break 'items;
                }

                match self
                    .client
                    .discovered(vec![url.clone()], item.item_type.as_str(), false)
                    .await
                {
                    Ok(()) => break,
                    Err(e) => {
                        error!(
                            project = %self.config.project,
                            address = %self.config.address,
                            url = %url.value,
                            error = %e,
                            "error sending payload to crawl HQ, waiting then retrying"
                        );
                        tokio::time::sleep(self.config.discovery_retry_delay).await;
                    }
                }
            }
        }
        info!("discovery producer stopped");
    }
}
