// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Subcommands:
// - crawl: run the frontier as one shard of an HQ-coordinated crawl
// - seed:  push URLs straight into a local queue
// - stats: show what is waiting in a queue directory
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hq-frontier",
    version,
    about = "A durable, host-aware crawl frontier driven by crawl HQ",
    long_about = "hq-frontier keeps a crash-safe queue of URLs on disk, serves them round-robin \
                  across hosts, and exchanges work with a crawl HQ instance."
)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull work from crawl HQ, fetch it, and report back
    ///
    /// Example: hq-frontier crawl --hq-address https://hq.example --hq-project wide ...
    Crawl(CrawlArgs),

    /// Enqueue seed URLs into a local queue
    ///
    /// Example: hq-frontier seed https://example.com https://example.org
    Seed {
        #[command(flatten)]
        queue: QueueArgs,

        /// URLs to enqueue
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Print queue statistics
    Stats {
        #[command(flatten)]
        queue: QueueArgs,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Directory holding the queue log and metadata
    #[arg(long, default_value = "jobs/queue")]
    pub queue_dir: PathBuf,

    /// Seconds a dequeue waits on an empty queue
    #[arg(long, default_value_t = 5)]
    pub dequeue_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    #[command(flatten)]
    pub queue: QueueArgs,

    /// Crawl HQ base address
    #[arg(long)]
    pub hq_address: String,

    #[arg(long)]
    pub hq_key: String,

    #[arg(long)]
    pub hq_secret: String,

    #[arg(long)]
    pub hq_project: String,

    /// Number of fetch workers
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Do not report outlinks beyond this many hops (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub max_hops: u8,

    /// Stop pulling from HQ once this share of workers is busy
    #[arg(long, default_value_t = 0.9)]
    pub feed_throttle: f64,
}


// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why #[command(flatten)]?
//    - QueueArgs is shared by every subcommand
//    - flatten splices its fields in as if they were declared inline
//
// 2. Why global = true on --verbose?
//    - It can then be given before or after the subcommand name
// -----------------------------------------------------------------------------
