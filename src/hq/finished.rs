// src/hq/finished.rs
// =============================================================================
// Completion reporter: tells crawl HQ an item it handed us is done.
//
// Fire and forget. A failed report is logged and dropped; HQ re-delivers
// anything it never heard back about.
// =============================================================================

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::client::HqUrl;
use super::HqBridge;
use crate::queue::Item;

impl HqBridge {
    pub async fn report_finished(&self, item: &Item) {
        // Locally discovered items were never assigned by HQ
        let Some(id) = item.id.as_deref() else {
            debug!(url = %item.url, "item has no HQ id, not reporting");
            return;
        };

        let url = HqUrl {
            id: id.to_string(),
            value: item.url.to_string(),
            ..HqUrl::default()
        };
        if let Err(e) = self.client.finished(vec![url]).await {
            error!(
                project = %self.config.project,
                address = %self.config.address,
                url = %item.url,
                hq_id = id,
                error = %e,
                "error submitting finished url to crawl HQ"
            );
        }
    }

    /// Reports every item sent on `finished` until the channel closes.
    pub async fn run_reporter(self, mut finished: mpsc::Receiver<Item>) {
        while let Some(item) = finished.recv().await {
            self.report_finished(&item).await;
        }
        info!("completion reporter stopped");
    }
}
