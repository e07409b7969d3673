// src/crawl/worker.rs
// =============================================================================
// A small fetch worker pool that drains the frontier.
//
// Each worker loops:
// 1. Dequeue the next item (round-robin across hosts)
// 2. Fetch it with reqwest
// 3. Pull outlinks out of HTML pages and hand them to the discovery producer
// 4. Hand the item to the completion reporter
//
// A dequeue timeout just means there is nothing to do yet; the closed error
// means shutdown and ends the worker.
// =============================================================================

use anyhow::{anyhow, Result};
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::links::extract_outlinks;
use crate::config::WorkerConfig;
use crate::hq::CrawlState;
use crate::queue::{Item, PersistentGroupedQueue, QueueError};

const PAUSED_POLL: Duration = Duration::from_secs(1);

/// Where workers send their output.
#[derive(Clone)]
pub struct WorkerChannels {
    pub discovered: mpsc::Sender<Item>,
    pub finished: mpsc::Sender<Item>,
}

/// Runs `config.workers` workers until the queue is closed.
pub async fn run_workers(
    queue: Arc<PersistentGroupedQueue>,
    state: Arc<CrawlState>,
    config: WorkerConfig,
    channels: WorkerChannels,
) -> Result<()> {
    let client = Client::builder()
        .timeout(config.fetch_timeout)
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;
    let config = Arc::new(config);

    let workers = (0..config.workers).map(|id| {
        tokio::spawn(worker_loop(
            id,
            queue.clone(),
            state.clone(),
            config.clone(),
            client.clone(),
            channels.clone(),
        ))
    });

    for result in join_all(workers).await {
        result.map_err(|e| anyhow!("worker task failed: {}", e))?;
    }
    info!("all workers stopped");
    Ok(())
}

async fn worker_loop(
    id: usize,
    queue: Arc<PersistentGroupedQueue>,
    state: Arc<CrawlState>,
    config: Arc<WorkerConfig>,
    client: Client,
    channels: WorkerChannels,
) {
    debug!(worker = id, "worker started");
    loop {
        if state.is_paused() && !queue.is_closed() {
            tokio::time::sleep(PAUSED_POLL).await;
            continue;
        }

        let item = match queue.dequeue().await {
            Ok(item) => item,
            Err(QueueError::Timeout) => continue,
            Err(QueueError::Closed) => break,
            Err(e) => {
                warn!(worker = id, error = %e, "failed to dequeue item");
                continue;
            }
        };

        {
            let _active = state.worker_started();
            process_item(&client, &config, &item, &channels.discovered).await;
        }

        if channels.finished.send(item).await.is_err() {
            debug!(worker = id, "completion reporter is gone");
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn process_item(
    client: &Client,
    config: &WorkerConfig,
    item: &Item,
    discovered: &mpsc::Sender<Item>,
) {
    let html = match fetch_page(client, item).await {
        Ok(Some(html)) => html,
        Ok(None) => return,
        Err(e) => {
            warn!(url = %item.url, error = %e, "failed to fetch");
            return;
        }
    };

    let outlinks = extract_outlinks(&html, &item.url);
    debug!(url = %item.url, hop = item.hop, outlinks = outlinks.len(), "fetched page");

    for link in outlinks {
        let child = item.outlink(link);
        if !config.allows_hop(child.hop) {
            continue;
        }
        if discovered.send(child).await.is_err() {
            debug!(url = %item.url, "discovery producer is gone, dropping outlinks");
            return;
        }
    }
}

// Fetches a page; Ok(None) for successful responses that are not HTML
async fn fetch_page(client: &Client, item: &Item) -> Result<Option<String>> {
    let response = client.get(item.url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(anyhow!("HTTP {}", response.status()));
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.contains("html"));
    if !is_html {
        return Ok(None);
    }

    Ok(Some(response.text().await?))
}
