// src/main.rs
// =============================================================================
// This is the entry point of the hq-frontier binary.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging
// 3. Dispatch to the appropriate subcommand handler
// 4. Exit with proper code (0 = success, 2 = error)
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use cli::{Cli, Commands, CrawlArgs, QueueArgs};
use hq_frontier::crawl::{self, WorkerChannels};
use hq_frontier::hq::{CrawlState, HqBridge, HttpHqClient};
use hq_frontier::logging;
use hq_frontier::{HqConfig, Item, PersistentGroupedQueue, QueueConfig, QueueStats, WorkerConfig};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    match cli.command {
        Commands::Crawl(args) => handle_crawl(args).await,
        Commands::Seed { queue, urls } => handle_seed(&queue, &urls),
        Commands::Stats { queue, json } => handle_stats(&queue, json),
    }
}

fn queue_config(args: &QueueArgs) -> QueueConfig {
    QueueConfig::new(&args.queue_dir)
        .with_dequeue_timeout(Duration::from_secs(args.dequeue_timeout_secs))
}

fn open_queue(args: &QueueArgs) -> Result<PersistentGroupedQueue> {
    PersistentGroupedQueue::open(&queue_config(args))
        .with_context(|| format!("failed to open queue in {}", args.queue_dir.display()))
}

// Handles the 'crawl' subcommand
//
// Runs until Ctrl-C, then marks the crawl finished, closes the queue so the
// workers drain out, and waits for the HQ loops to stop.
async fn handle_crawl(args: CrawlArgs) -> Result<i32> {
    let queue = Arc::new(open_queue(&args.queue)?);

    let hq_config = HqConfig {
        address: args.hq_address,
        key: args.hq_key,
        secret: args.hq_secret,
        project: args.hq_project,
        feed_throttle_ratio: args.feed_throttle,
        ..HqConfig::default()
    };
    let worker_config = WorkerConfig {
        workers: args.workers,
        max_hops: args.max_hops,
        ..WorkerConfig::default()
    };

    let client = HttpHqClient::new(&hq_config, &worker_config.user_agent)
        .context("failed to build crawl HQ client")?;
    let state = Arc::new(CrawlState::new(worker_config.workers));
    let bridge = HqBridge::new(Arc::new(client), state.clone(), hq_config);

    let handles = bridge.spawn(queue.clone(), worker_config.workers.max(1) * 16);
    let channels = WorkerChannels {
        discovered: handles.discovered.clone(),
        finished: handles.finished.clone(),
    };

    info!(
        workers = worker_config.workers,
        pending = queue.len(),
        "crawl started, press Ctrl-C to stop"
    );
    let pool = tokio::spawn(crawl::run_workers(
        queue.clone(),
        state.clone(),
        worker_config,
        channels,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutting down");

    state.finish();
    queue.close();
    pool.await.context("worker pool panicked")??;
    handles.join().await;

    print_stats(&queue.stats());
    Ok(0)
}

// Handles the 'seed' subcommand
fn handle_seed(args: &QueueArgs, urls: &[String]) -> Result<i32> {
    let queue = open_queue(args)?;

    for raw in urls {
        let url = Url::parse(raw).with_context(|| format!("invalid URL '{}'", raw))?;
        queue
            .enqueue(&Item::seed(url))
            .with_context(|| format!("failed to enqueue {}", raw))?;
    }

    println!("🌱 Enqueued {} seed(s), {} pending", urls.len(), queue.len());
    queue.close();
    Ok(0)
}

// Handles the 'stats' subcommand
//
// Reads the checkpoint only, so it is safe to run next to a live crawl
fn handle_stats(args: &QueueArgs, json: bool) -> Result<i32> {
    let stats = PersistentGroupedQueue::read_stats(&queue_config(args))
        .with_context(|| format!("failed to read queue stats in {}", args.queue_dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(0)
}

// Prints stats as a human-readable table in the terminal
fn print_stats(stats: &QueueStats) {
    let time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };
    let interval = |d: Option<Duration>| {
        d.map(|d| format!("{:.3}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string())
    };

    println!("📊 Queue:");
    println!("   📋 Pending: {}", stats.total_elements);
    println!("   🌐 Hosts: {}", stats.unique_hosts);
    println!("   ➕ Enqueued: {} (first {}, last {}, every {})",
        stats.enqueue_count,
        time(stats.first_enqueue_time),
        time(stats.last_enqueue_time),
        interval(stats.average_enqueue_interval()),
    );
    println!("   ➖ Dequeued: {} (first {}, last {}, every {})",
        stats.dequeue_count,
        time(stats.first_dequeue_time),
        time(stats.last_dequeue_time),
        interval(stats.average_dequeue_interval()),
    );

    let top = stats.top_hosts(10);
    if top.is_empty() {
        return;
    }

    println!();
    println!("{:<60} {:>10}", "HOST", "PENDING");
    println!("{}", "=".repeat(71));
    for (host, count) in top {
        // Truncate host if too long for display
        let host_display = if host.len() > 57 {
            format!("{}...", &host[..57])
        } else {
            host
        };
        println!("{:<60} {:>10}", host_display, count);
    }
}
