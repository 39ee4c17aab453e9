//! Engine lifecycle: worker loops, scheduler plumbing, inbound API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use vane_core::backoff::now_ms;
use vane_core::config::WorkerConfig;
use vane_core::{
    CoreError, ExecutionRecord, Job, JobResult, WorkerRecord, WorkerStatus,
};
use vane_limiter::{RateLimiter, ServiceUsage};
use vane_scheduler::{ClaimOutcome, JobScheduler, SchedulerStats};
use vane_store::WorkerRegistry;

use crate::pipeline::RulePipeline;
use crate::retry::retry_delay_ms;
use crate::EngineError;

/// Claimed jobs older than this are considered stuck and recoverable.
const STUCK_THRESHOLD_MS: i64 = 600_000;

/// Recovery sweep cadence and startup grace.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(300);
const RECOVERY_GRACE: Duration = Duration::from_secs(60);

/// Ceiling on waiting for in-flight jobs during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Combined stats surface for operators.
#[derive(Debug, Serialize)]
pub struct EngineStats {
    pub jobs: SchedulerStats,
    pub rate_limits: HashMap<String, ServiceUsage>,
    pub workers: Vec<WorkerRecord>,
    pub timestamp: DateTime<Utc>,
}

/// One worker's automation engine.
///
/// Owns the poll, recovery, and heartbeat loops, and routes claimed jobs
/// into the [`RulePipeline`] with bounded concurrency.
pub struct AutomationEngine {
    pipeline: Arc<RulePipeline>,
    scheduler: JobScheduler,
    limiter: Arc<RateLimiter>,
    registry: Arc<dyn WorkerRegistry>,
    worker: WorkerConfig,
    worker_id: String,
    shutdown: Arc<Notify>,
    stop_requested: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    permits: Arc<Semaphore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    pub fn new(
        pipeline: Arc<RulePipeline>,
        scheduler: JobScheduler,
        limiter: Arc<RateLimiter>,
        registry: Arc<dyn WorkerRegistry>,
        worker: WorkerConfig,
        worker_id: String,
    ) -> Self {
        let max_jobs = worker.max_concurrent_jobs.max(1);
        Self {
            pipeline,
            scheduler,
            limiter,
            registry,
            worker,
            worker_id,
            shutdown: Arc::new(Notify::new()),
            stop_requested: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            permits: Arc::new(Semaphore::new(max_jobs)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Register, reschedule every active rule, and launch the loops.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        self.registry
            .register(&self.worker_id, self.worker.max_concurrent_jobs as i32)
            .await?;

        let scheduled = self.reschedule_active_rules().await?;
        info!(worker_id = %self.worker_id, rules = scheduled, "active rules scheduled");

        self.registry
            .set_status(&self.worker_id, WorkerStatus::Running)
            .await?;

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(tokio::spawn(self.clone().poll_loop()));
        tasks.push(tokio::spawn(self.clone().recovery_loop()));
        tasks.push(tokio::spawn(self.clone().heartbeat_loop()));

        info!(worker_id = %self.worker_id, "automation engine started");
        Ok(())
    }

    /// Cooperative stop: cease polling, let in-flight jobs finish (bounded
    /// by a 60 s grace), then mark the worker stopped. Jobs that outlive
    /// the grace are reclaimed by some worker's recovery sweep.
    pub async fn stop(&self) -> Result<(), EngineError> {
        info!(worker_id = %self.worker_id, "automation engine stopping");
        self.stopping.store(true, Ordering::SeqCst);
        if let Err(e) = self
            .registry
            .set_status(&self.worker_id, WorkerStatus::Stopping)
            .await
        {
            warn!(error = %e, "failed to mark worker stopping");
        }
        self.shutdown.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while self.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let leftover = self.in_flight.load(Ordering::SeqCst);
        if leftover > 0 {
            warn!(
                worker_id = %self.worker_id,
                in_flight = leftover,
                "shutdown grace expired with jobs in flight — recovery will reclaim them"
            );
        }

        if let Err(e) = self
            .registry
            .set_status(&self.worker_id, WorkerStatus::Stopped)
            .await
        {
            warn!(error = %e, "failed to mark worker stopped");
        }
        info!(worker_id = %self.worker_id, "automation engine stopped");
        Ok(())
    }

    /// Resolves when an external stop was requested through the registry.
    pub async fn stop_requested(&self) {
        self.stop_requested.notified().await;
    }

    async fn reschedule_active_rules(&self) -> Result<usize, EngineError> {
        let rules = self.pipeline.rules().find_active().await?;
        let now = now_ms();
        let mut scheduled = 0usize;
        for rule in &rules {
            let next_due = match rule.last_checked_at {
                Some(checked) => {
                    (checked.timestamp_millis() + rule.check_interval_minutes * 60_000).max(now)
                }
                None => now,
            };
            let job = Job::rule_check_at(&rule.id, &rule.user_id, rule.check_interval_minutes, next_due);
            self.scheduler.schedule(&job).await?;
            scheduled += 1;
        }
        Ok(scheduled)
    }

    // ── Loops ───────────────────────────────────────────────────────

    async fn poll_loop(self: Arc<Self>) {
        info!(
            interval_ms = self.worker.poll_interval_ms,
            batch = self.worker.batch_size,
            "processing loop started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.worker.poll_interval_ms)) => {}
                _ = self.shutdown.notified() => break,
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let ready = match self.scheduler.ready_jobs(self.worker.batch_size).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    // Coordination store down: no progress this cycle, but
                    // the engine must not crash.
                    warn!(error = %e, "failed to fetch ready jobs");
                    continue;
                }
            };

            for job in ready {
                let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                    // At capacity; leave the rest for the next cycle or a
                    // sibling worker.
                    break;
                };
                match self.scheduler.claim(&job.id).await {
                    Ok(ClaimOutcome::Claimed) => {
                        let engine = self.clone();
                        tokio::spawn(async move {
                            engine.run_claimed(job).await;
                            drop(permit);
                        });
                    }
                    Ok(ClaimOutcome::LostRace) => {
                        debug!(job_id = %job.id, "claim lost to another worker");
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "claim failed");
                    }
                }
            }

            if rand::random::<f64>() < 0.1 {
                if let Ok(stats) = self.scheduler.stats().await {
                    info!(
                        scheduled = stats.scheduled,
                        processing = stats.processing,
                        overdue = stats.overdue,
                        in_flight = self.in_flight.load(Ordering::SeqCst),
                        "queue snapshot"
                    );
                }
            }
        }
        info!("processing loop exited");
    }

    /// Process one claimed job end to end. Nothing escapes: every failure
    /// path folds into the job result handed to the scheduler.
    async fn run_claimed(&self, job: Job) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let result = match self.pipeline.process_rule(&job.rule_id).await {
            Ok(record) if record.success => JobResult::ok(),
            Ok(record) => {
                let message = record
                    .error_message
                    .unwrap_or_else(|| "action dispatch failed".to_string());
                let delay = retry_delay_ms(&message, job.retry_count);
                JobResult::failed(message, Some(delay))
            }
            Err(e) if e.is_terminal() => {
                warn!(job_id = %job.id, error = %e, "job terminated");
                JobResult::fatal(e.to_string())
            }
            Err(e) => {
                let message = e.to_string();
                error!(job_id = %job.id, error = %message, "job failed");
                let delay = retry_delay_ms(&message, job.retry_count);
                JobResult::failed(message, Some(delay))
            }
        };

        if let Err(e) = self.scheduler.complete(&job.id, &result).await {
            error!(job_id = %job.id, error = %e, "failed to report job completion");
        }
        if let Err(e) = self
            .registry
            .increment_processed(&self.worker_id, result.success)
            .await
        {
            warn!(error = %e, "failed to update worker counters");
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn recovery_loop(self: Arc<Self>) {
        tokio::select! {
            _ = tokio::time::sleep(RECOVERY_GRACE) => {}
            _ = self.shutdown.notified() => return,
        }
        info!("recovery loop started");
        loop {
            match self.scheduler.recover_stuck(STUCK_THRESHOLD_MS).await {
                Ok(recovered) if !recovered.is_empty() => {
                    warn!(count = recovered.len(), jobs = ?recovered, "recovered stuck jobs");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "stuck job sweep failed"),
            }
            // A shutdown signaled mid-sweep would miss the notification;
            // the flag check keeps the join from waiting a full interval.
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(RECOVERY_INTERVAL) => {}
                _ = self.shutdown.notified() => break,
            }
        }
        info!("recovery loop exited");
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.worker.heartbeat_ms)) => {}
                _ = self.shutdown.notified() => break,
            }
            let current = self.in_flight.load(Ordering::SeqCst) as i32;
            match self.registry.heartbeat(&self.worker_id, current).await {
                Ok(WorkerStatus::Stopping) => {
                    info!(worker_id = %self.worker_id, "stop requested via registry");
                    self.stop_requested.notify_waiters();
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "heartbeat failed"),
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    // ── Inbound API ─────────────────────────────────────────────────

    /// Idempotently (re)schedule the recurring check job for a rule.
    pub async fn schedule_rule_check(
        &self,
        rule_id: &str,
        user_id: &str,
        interval_minutes: i64,
    ) -> Result<(), EngineError> {
        if interval_minutes <= 0 {
            return Err(EngineError::Core(CoreError::InvalidRule(format!(
                "interval must be positive, got {interval_minutes}"
            ))));
        }
        let job = Job::rule_check(rule_id, user_id, interval_minutes);
        self.scheduler.schedule(&job).await?;
        info!(rule_id = %rule_id, interval_minutes, "rule check scheduled");
        Ok(())
    }

    /// Drop a rule's job and all of its coordination state.
    pub async fn remove_rule(&self, rule_id: &str) -> Result<(), EngineError> {
        self.scheduler.remove(&Job::rule_check_id(rule_id)).await?;
        info!(rule_id = %rule_id, "rule job removed");
        Ok(())
    }

    /// Run the pipeline for a rule right now, bypassing the scheduler.
    /// The rule's periodic tick, if any, is left untouched and fires on
    /// its own cadence.
    pub async fn run_rule_once(&self, rule_id: &str) -> Result<ExecutionRecord, EngineError> {
        self.pipeline.process_rule(rule_id).await
    }

    /// Dry run: evaluate conditions on fresh weather without touching the
    /// platforms or the audit log.
    pub async fn test_rule(&self, rule_id: &str) -> Result<ExecutionRecord, EngineError> {
        self.pipeline.test_rule(rule_id).await
    }

    pub async fn get_engine_stats(&self) -> Result<EngineStats, EngineError> {
        let jobs = self.scheduler.stats().await?;
        let rate_limits = self.limiter.stats().await;
        let workers = self.registry.list_workers().await?;
        Ok(EngineStats {
            jobs,
            rate_limits,
            workers,
            timestamp: Utc::now(),
        })
    }
}
