//! Worker bootstrap shared by the worker binary and the operator CLI.

use std::sync::Arc;

use anyhow::Context;
use redis::aio::ConnectionManager;
use tracing::info;

use vane_clients::{GoogleAdsClient, MetaAdsClient, OpenWeatherClient};
use vane_core::worker::local_worker_id;
use vane_core::Config;
use vane_limiter::RateLimiter;
use vane_scheduler::JobScheduler;
use vane_store::{init_pg_pool, PgCredentialsLookup, PgRuleRepository, PgWorkerRegistry};

use crate::{AutomationEngine, RulePipeline};

/// Connect both stores and wire the production engine.
pub async fn build_engine(config: &Config) -> anyhow::Result<Arc<AutomationEngine>> {
    config.validate()?;

    let client = redis::Client::open(config.coordination.url.as_str())
        .context("invalid COORDINATION_URL")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("coordination store connect failed")?;

    let pool = init_pg_pool(&config.durable)
        .await
        .ok_or_else(|| anyhow::anyhow!("durable store unavailable"))?;

    let scheduler = JobScheduler::new(conn.clone());
    let limiter = Arc::new(RateLimiter::new(conn));

    let rules = Arc::new(PgRuleRepository::new(pool.clone()));
    let credentials = Arc::new(PgCredentialsLookup::new(pool.clone()));
    let registry = Arc::new(PgWorkerRegistry::new(pool));

    let weather = Arc::new(OpenWeatherClient::from_config(&config.weather)?);
    let meta = Arc::new(MetaAdsClient::from_config(&config.meta));
    let google = Arc::new(GoogleAdsClient::from_config(&config.google));

    let pipeline = Arc::new(RulePipeline::new(
        rules,
        credentials,
        weather,
        meta,
        google,
        limiter.clone(),
    ));

    Ok(Arc::new(AutomationEngine::new(
        pipeline,
        scheduler,
        limiter,
        registry,
        config.worker.clone(),
        local_worker_id(),
    )))
}

/// Run a worker until ctrl-c or an externally requested stop.
pub async fn run_worker(config: Config) -> anyhow::Result<()> {
    config.log_summary();
    let engine = build_engine(&config).await?;
    engine.start().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = engine.stop_requested() => info!("registry stop observed"),
    }

    engine.stop().await?;
    Ok(())
}
