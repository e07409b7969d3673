// src/logging.rs
// =============================================================================
// Log output for the binary.
//
// The library only emits `tracing` events; installing a subscriber is the
// binary's job. RUST_LOG wins when set, e.g.
//   RUST_LOG=hq_frontier=debug,reqwest=warn
// otherwise we log at info, or debug with --verbose.
// =============================================================================

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging(verbose: bool) -> Result<()> {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|e| anyhow!("invalid log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {}", e))
}
