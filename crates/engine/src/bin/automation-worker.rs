//! automation-worker — one horizontally scalable engine instance.
//!
//! Drains due rule-check jobs from the shared scheduler, runs the
//! weather → conditions → actions pipeline, and heartbeats the worker
//! registry. Any number of these can run against the same stores; the
//! scheduler's atomic claim keeps each rule on a single worker at a time.

use clap::Parser;
use tracing::info;

use vane_core::config::load_dotenv;
use vane_core::Config;

/// Weather automation worker.
#[derive(Parser, Debug)]
#[command(name = "automation-worker", version, about)]
struct Cli {
    /// Maximum jobs processed concurrently by this worker.
    #[arg(long, env = "WORKER_MAX_CONCURRENT_JOBS")]
    max_concurrent_jobs: Option<usize>,

    /// Registry heartbeat cadence in milliseconds.
    #[arg(long, env = "WORKER_HEARTBEAT_MS")]
    heartbeat_ms: Option<u64>,

    /// Scheduler poll cadence in milliseconds.
    #[arg(long, env = "WORKER_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(n) = cli.max_concurrent_jobs {
        config.worker.max_concurrent_jobs = n;
    }
    if let Some(ms) = cli.heartbeat_ms {
        config.worker.heartbeat_ms = ms;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.worker.poll_interval_ms = ms;
    }

    info!("automation-worker starting");
    vane_engine::runtime::run_worker(config).await?;
    info!("automation-worker exited cleanly");
    Ok(())
}
