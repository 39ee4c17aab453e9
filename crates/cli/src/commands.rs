//! Command implementations: thin handles over the stores and the engine.

use anyhow::Context;
use redis::aio::ConnectionManager;

use vane_core::backoff::now_ms;
use vane_core::{Config, Job, WorkerStatus};
use vane_limiter::RateLimiter;
use vane_scheduler::JobScheduler;
use vane_store::{init_pg_pool, PgRuleRepository, PgWorkerRegistry, RuleRepository, WorkerRegistry};

async fn coordination(config: &Config) -> anyhow::Result<ConnectionManager> {
    if config.coordination.url.is_empty() {
        anyhow::bail!("COORDINATION_URL is not set");
    }
    let client = redis::Client::open(config.coordination.url.as_str())
        .context("invalid COORDINATION_URL")?;
    ConnectionManager::new(client)
        .await
        .context("coordination store connect failed")
}

async fn durable(config: &Config) -> anyhow::Result<sqlx::PgPool> {
    init_pg_pool(&config.durable)
        .await
        .ok_or_else(|| anyhow::anyhow!("durable store unavailable (check DURABLE_URL)"))
}

pub async fn stop_worker(config: &Config, worker_id: &str) -> anyhow::Result<()> {
    let registry = PgWorkerRegistry::new(durable(config).await?);
    registry.set_status(worker_id, WorkerStatus::Stopping).await?;
    println!("worker {worker_id} marked stopping; it will drain at its next heartbeat");
    Ok(())
}

pub async fn list_workers(config: &Config) -> anyhow::Result<()> {
    let registry = PgWorkerRegistry::new(durable(config).await?);
    let workers = registry.list_workers().await?;
    if workers.is_empty() {
        println!("no workers registered");
        return Ok(());
    }
    println!(
        "{:<28} {:<9} {:>5}/{:<5} {:>9} {:>9} {:>7}  {}",
        "WORKER", "STATUS", "CUR", "MAX", "PROCESSED", "SUCCEEDED", "FAILED", "LAST HEARTBEAT"
    );
    for w in workers {
        println!(
            "{:<28} {:<9} {:>5}/{:<5} {:>9} {:>9} {:>7}  {}",
            w.worker_id,
            w.status,
            w.current_jobs,
            w.max_concurrent_jobs,
            w.jobs_processed,
            w.jobs_succeeded,
            w.jobs_failed,
            w.last_heartbeat.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

pub async fn list_rules(config: &Config) -> anyhow::Result<()> {
    let rules = PgRuleRepository::new(durable(config).await?);
    let active = rules.find_active().await?;
    if active.is_empty() {
        println!("no active rules");
        return Ok(());
    }
    println!(
        "{:<20} {:<20} {:>8} {:>9} {:>8}  {}",
        "RULE", "USER", "INTERVAL", "TARGETS", "LAT/LON", "NAME"
    );
    for r in active {
        println!(
            "{:<20} {:<20} {:>7}m {:>9} {:>8}  {}",
            r.id,
            r.user_id,
            r.check_interval_minutes,
            r.campaigns.len(),
            format!("{:.1},{:.1}", r.location.lat, r.location.lon),
            r.name,
        );
    }
    Ok(())
}

pub async fn schedule_rule(
    config: &Config,
    rule_id: &str,
    user_id: &str,
    interval_minutes: i64,
) -> anyhow::Result<()> {
    if interval_minutes <= 0 {
        anyhow::bail!("interval must be positive, got {interval_minutes}");
    }
    let scheduler = JobScheduler::new(coordination(config).await?);
    let job = Job::rule_check(rule_id, user_id, interval_minutes);
    scheduler.schedule(&job).await?;
    println!(
        "scheduled {} for rule {} every {} min (first run in {} min)",
        job.id, rule_id, interval_minutes, interval_minutes
    );
    Ok(())
}

pub async fn run_rule(config: &Config, rule_id: &str) -> anyhow::Result<()> {
    let engine = vane_engine::runtime::build_engine(config).await?;
    let record = engine.run_rule_once(rule_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn test_rule(config: &Config, rule_id: &str) -> anyhow::Result<()> {
    let engine = vane_engine::runtime::build_engine(config).await?;
    let record = engine.test_rule(rule_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn list_jobs(config: &Config) -> anyhow::Result<()> {
    let scheduler = JobScheduler::new(coordination(config).await?);
    let now = now_ms();

    let scheduled = scheduler.list_scheduled(100).await?;
    println!("scheduled ({}):", scheduled.len());
    for job in scheduled {
        let due_in_s = (job.scheduled_at - now) / 1000;
        println!(
            "  {:<32} rule={:<20} retries={} due_in={}s",
            job.id, job.rule_id, job.retry_count, due_in_s
        );
    }

    let processing = scheduler.list_processing().await?;
    println!("processing ({}):", processing.len());
    for job in processing {
        println!("  {:<32} rule={:<20} retries={}", job.id, job.rule_id, job.retry_count);
    }
    Ok(())
}

pub async fn list_executions(config: &Config, rule_id: &str, limit: i64) -> anyhow::Result<()> {
    let rules = PgRuleRepository::new(durable(config).await?);
    let executions = rules.recent_executions(rule_id, limit).await?;
    if executions.is_empty() {
        println!("no executions recorded for {rule_id}");
        return Ok(());
    }
    println!(
        "{:<20} {:<5} {:<7} {:>7} {:>8}  {}",
        "EXECUTED", "MET", "SUCCESS", "ACTIONS", "TIME", "ERROR"
    );
    for e in executions {
        println!(
            "{:<20} {:<5} {:<7} {:>7} {:>6}ms  {}",
            e.executed_at.format("%Y-%m-%d %H:%M:%S"),
            e.conditions_met,
            e.success,
            e.actions_taken.len(),
            e.metrics.total_time_ms,
            e.error_message.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn job_stats(config: &Config) -> anyhow::Result<()> {
    let scheduler = JobScheduler::new(coordination(config).await?);
    let stats = scheduler.stats().await?;
    println!("scheduled:  {}", stats.scheduled);
    println!("processing: {}", stats.processing);
    println!("overdue:    {}", stats.overdue);
    Ok(())
}

pub async fn rate_limit_stats(config: &Config) -> anyhow::Result<()> {
    let limiter = RateLimiter::new(coordination(config).await?);
    let usage = limiter.stats().await;
    if usage.is_empty() {
        println!("no rate limit data");
        return Ok(());
    }
    println!("{:<14} {:>8} {:>10} {:>12}", "SERVICE", "USED", "MAX", "WINDOW");
    let mut services: Vec<_> = usage.into_iter().collect();
    services.sort_by(|a, b| a.0.cmp(&b.0));
    for (service, u) in services {
        println!(
            "{:<14} {:>8} {:>10} {:>11}s",
            service,
            u.current,
            u.max_requests,
            u.window_ms / 1000
        );
    }
    Ok(())
}
