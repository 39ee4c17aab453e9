//! The job queue: schedule, drain, claim, complete, recover.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vane_core::backoff::now_ms;
use vane_core::{Job, JobResult};

use crate::keys::{job_key, result_key, PROCESSING_SET, RESULT_TTL_SECS, SCHEDULED_SET};
use crate::SchedulerError;

/// Jobs past due by more than this are counted as overdue in stats.
const OVERDUE_GRACE_MS: i64 = 300_000;

/// Fallback retry ladder cap: five minutes.
const MAX_RETRY_DELAY_MS: u64 = 300_000;

/// Result of a claim attempt. A lost race is normal under multiple
/// workers and the caller just drops the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    LostRace,
}

/// What `complete` did with the job, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDisposition {
    /// Success: next periodic tick scheduled.
    Rescheduled { next_at: i64 },
    /// Transient failure: retry scheduled.
    Retrying { retry_count: u32, delay_ms: u64 },
    /// Transient failures exhausted the retry budget on a recurring job:
    /// budget reset, next periodic tick scheduled.
    RetriesExhausted { next_at: i64 },
    /// Terminal failure or vanished record: job dropped.
    Dropped,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub processing: u64,
    pub overdue: u64,
}

/// Handle to the coordination-store job queue. Cheap to clone.
#[derive(Clone)]
pub struct JobScheduler {
    conn: ConnectionManager,
}

impl JobScheduler {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Write (or rewrite) a job record and place it in the scheduled set.
    ///
    /// Idempotent per job id: an already-scheduled id has its due time
    /// replaced, and an id currently processing only gets its record
    /// refreshed; completion will fold the new data into the next tick.
    pub async fn schedule(&self, job: &Job) -> Result<(), SchedulerError> {
        let data = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();

        let in_processing: bool = conn.sismember(PROCESSING_SET, &job.id).await?;
        if in_processing {
            let _: () = conn.hset(job_key(&job.id), "data", &data).await?;
            debug!(job_id = %job.id, "job is processing — record refreshed, not rescheduled");
            return Ok(());
        }

        let _: () = redis::pipe()
            .atomic()
            .hset(job_key(&job.id), "data", &data)
            .ignore()
            .cmd("ZADD")
            .arg(SCHEDULED_SET)
            .arg(job.scheduled_at)
            .arg(&job.id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %job.id, scheduled_at = job.scheduled_at, "job scheduled");
        Ok(())
    }

    /// Up to `limit` due jobs, ordered by due time, then priority, then id.
    ///
    /// Corrupt records (unparseable data, missing hash) are purged from
    /// every coordination object on sight.
    pub async fn ready_jobs(&self, limit: usize) -> Result<Vec<Job>, SchedulerError> {
        let mut conn = self.conn.clone();
        let now = now_ms();

        // Over-fetch so the deterministic sort below sees enough of the
        // due set to order ties correctly.
        let ids: Vec<String> = conn
            .zrangebyscore_limit(SCHEDULED_SET, "-inf", now, 0, (limit * 4) as isize)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let data: Option<String> = conn.hget(job_key(&id), "data").await?;
            match data.as_deref().map(serde_json::from_str::<Job>) {
                Some(Ok(job)) => jobs.push(job),
                Some(Err(e)) => {
                    warn!(job_id = %id, error = %e, "corrupt job record — purging");
                    self.purge(&id).await?;
                }
                None => {
                    warn!(job_id = %id, "scheduled id has no job record — purging");
                    self.purge(&id).await?;
                }
            }
        }

        order_ready(&mut jobs);
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Atomically move a job from scheduled to processing.
    ///
    /// The `ZREM` return value decides the race: exactly one of any number
    /// of concurrent claimants observes the removal.
    pub async fn claim(&self, id: &str) -> Result<ClaimOutcome, SchedulerError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(SCHEDULED_SET, id).await?;
        if removed == 0 {
            return Ok(ClaimOutcome::LostRace);
        }

        let _: () = redis::pipe()
            .atomic()
            .sadd(PROCESSING_SET, id)
            .ignore()
            .hset(job_key(id), "processing_started_at", now_ms())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(ClaimOutcome::Claimed)
    }

    /// Report the outcome of a claimed job and transition it.
    ///
    /// Success reschedules the next periodic tick anchored at the
    /// completion instant and resets the retry budget. Transient failures
    /// retry with the engine-supplied delay (or the exponential fallback)
    /// until the budget is spent; a recurring job whose budget is spent
    /// falls back to its normal cadence rather than dying. Terminal
    /// failures drop the job entirely.
    pub async fn complete(
        &self,
        id: &str,
        result: &JobResult,
    ) -> Result<CompletionDisposition, SchedulerError> {
        let mut conn = self.conn.clone();
        let now = now_ms();

        let data: Option<String> = conn.hget(job_key(id), "data").await?;
        let mut job = match data.as_deref().map(serde_json::from_str::<Job>) {
            Some(Ok(job)) => job,
            _ => {
                warn!(job_id = %id, "completing a job with no readable record — dropping");
                self.purge(id).await?;
                self.write_result(id, result).await?;
                return Ok(CompletionDisposition::Dropped);
            }
        };

        let disposition = if result.success {
            job.retry_count = 0;
            job.last_executed_at = Some(now);
            job.scheduled_at = now + job.interval_minutes * 60_000;
            job.processing_started_at = None;
            self.requeue(&mut conn, &job).await?;
            CompletionDisposition::Rescheduled {
                next_at: job.scheduled_at,
            }
        } else if result.terminal {
            self.purge(id).await?;
            CompletionDisposition::Dropped
        } else if job.retry_count < job.max_retries {
            let delay_ms = result
                .retry_after_ms
                .unwrap_or_else(|| fallback_retry_delay_ms(job.retry_count));
            job.retry_count += 1;
            job.scheduled_at = now + delay_ms as i64;
            job.processing_started_at = None;
            self.requeue(&mut conn, &job).await?;
            CompletionDisposition::Retrying {
                retry_count: job.retry_count,
                delay_ms,
            }
        } else if job.interval_minutes > 0 {
            // Recurring job out of retries: fall back to the normal cadence.
            job.retry_count = 0;
            job.scheduled_at = now + job.interval_minutes * 60_000;
            job.processing_started_at = None;
            self.requeue(&mut conn, &job).await?;
            CompletionDisposition::RetriesExhausted {
                next_at: job.scheduled_at,
            }
        } else {
            self.purge(id).await?;
            CompletionDisposition::Dropped
        };

        self.write_result(id, result).await?;

        match &disposition {
            CompletionDisposition::Rescheduled { next_at } => {
                debug!(job_id = %id, next_at, "job completed — next tick scheduled");
            }
            CompletionDisposition::Retrying { retry_count, delay_ms } => {
                info!(job_id = %id, retry_count, delay_ms, "job failed — retry scheduled");
            }
            CompletionDisposition::RetriesExhausted { next_at } => {
                warn!(job_id = %id, next_at, "job retries exhausted — resuming normal cadence");
            }
            CompletionDisposition::Dropped => {
                info!(job_id = %id, "job dropped");
            }
        }

        Ok(disposition)
    }

    /// Delete a job and all of its coordination state.
    pub async fn remove(&self, id: &str) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(SCHEDULED_SET)
            .arg(id)
            .ignore()
            .srem(PROCESSING_SET, id)
            .ignore()
            .del(job_key(id))
            .ignore()
            .del(result_key(id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Move jobs stuck in processing longer than `threshold_ms` back to
    /// the scheduled set, due immediately. Retry counts are untouched; a
    /// crashed worker is not the job's fault.
    pub async fn recover_stuck(&self, threshold_ms: i64) -> Result<Vec<String>, SchedulerError> {
        let mut conn = self.conn.clone();
        let now = now_ms();
        let ids: Vec<String> = conn.smembers(PROCESSING_SET).await?;

        let mut recovered = Vec::new();
        for id in ids {
            let started: Option<i64> = conn.hget(job_key(&id), "processing_started_at").await?;
            let stuck = match started {
                Some(at) => now - at > threshold_ms,
                // A processing member without a start stamp is a claim
                // that never finished writing; recover it too.
                None => true,
            };
            if !stuck {
                continue;
            }

            let data: Option<String> = conn.hget(job_key(&id), "data").await?;
            match data.as_deref().map(serde_json::from_str::<Job>) {
                Some(Ok(mut job)) => {
                    job.scheduled_at = now;
                    job.processing_started_at = None;
                    let payload = serde_json::to_string(&job)?;
                    let _: () = redis::pipe()
                        .atomic()
                        .hset(job_key(&id), "data", &payload)
                        .ignore()
                        .hdel(job_key(&id), "processing_started_at")
                        .ignore()
                        .cmd("ZADD")
                        .arg(SCHEDULED_SET)
                        .arg(now)
                        .arg(&id)
                        .ignore()
                        .srem(PROCESSING_SET, &id)
                        .ignore()
                        .query_async(&mut conn)
                        .await?;
                    warn!(job_id = %id, "stuck job recovered to scheduled set");
                    recovered.push(id);
                }
                _ => {
                    warn!(job_id = %id, "stuck job has no readable record — purging");
                    self.purge(&id).await?;
                }
            }
        }
        Ok(recovered)
    }

    /// Queue depth counters.
    pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        let mut conn = self.conn.clone();
        let now = now_ms();
        let (scheduled, processing, overdue): (u64, u64, u64) = redis::pipe()
            .cmd("ZCARD")
            .arg(SCHEDULED_SET)
            .cmd("SCARD")
            .arg(PROCESSING_SET)
            .cmd("ZCOUNT")
            .arg(SCHEDULED_SET)
            .arg("-inf")
            .arg(now - OVERDUE_GRACE_MS)
            .query_async(&mut conn)
            .await?;
        Ok(SchedulerStats {
            scheduled,
            processing,
            overdue,
        })
    }

    /// Scheduled jobs in due order (for operator tooling).
    pub async fn list_scheduled(&self, limit: usize) -> Result<Vec<Job>, SchedulerError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrange(SCHEDULED_SET, 0, limit.saturating_sub(1) as isize)
            .await?;
        self.load_jobs(ids).await
    }

    /// Jobs currently claimed by some worker (for operator tooling).
    pub async fn list_processing(&self) -> Result<Vec<Job>, SchedulerError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(PROCESSING_SET).await?;
        self.load_jobs(ids).await
    }

    async fn load_jobs(&self, ids: Vec<String>) -> Result<Vec<Job>, SchedulerError> {
        let mut conn = self.conn.clone();
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let data: Option<String> = conn.hget(job_key(&id), "data").await?;
            if let Some(Ok(job)) = data.as_deref().map(serde_json::from_str::<Job>) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn requeue(
        &self,
        conn: &mut ConnectionManager,
        job: &Job,
    ) -> Result<(), SchedulerError> {
        let data = serde_json::to_string(job)?;
        let _: () = redis::pipe()
            .atomic()
            .hset(job_key(&job.id), "data", &data)
            .ignore()
            .hdel(job_key(&job.id), "processing_started_at")
            .ignore()
            .cmd("ZADD")
            .arg(SCHEDULED_SET)
            .arg(job.scheduled_at)
            .arg(&job.id)
            .ignore()
            .srem(PROCESSING_SET, &job.id)
            .ignore()
            .query_async(conn)
            .await?;
        Ok(())
    }

    async fn purge(&self, id: &str) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(SCHEDULED_SET)
            .arg(id)
            .ignore()
            .srem(PROCESSING_SET, id)
            .ignore()
            .del(job_key(id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn write_result(&self, id: &str, result: &JobResult) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        let key = result_key(id);
        let _: () = redis::pipe()
            .atomic()
            .hset(&key, "success", result.success.to_string())
            .ignore()
            .hset(&key, "error", result.error.clone().unwrap_or_default())
            .ignore()
            .hset(&key, "terminal", result.terminal.to_string())
            .ignore()
            .hset(&key, "completed_at", now_ms())
            .ignore()
            .expire(&key, RESULT_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Deterministic drain order: due time, then priority (lower first),
/// then id.
fn order_ready(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then(a.priority.cmp(&b.priority))
            .then(a.id.cmp(&b.id))
    });
}

/// Exponential fallback when the engine did not pick a retry delay:
/// `min(2^(retry_count+1) × 1s, 5min)`.
fn fallback_retry_delay_ms(retry_count: u32) -> u64 {
    let shift = (retry_count + 1).min(20);
    ((1u64 << shift) * 1_000).min(MAX_RETRY_DELAY_MS)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, scheduled_at: i64, priority: i32) -> Job {
        let mut j = Job::rule_check_at(id, "u-1", 60, scheduled_at);
        j.id = id.to_string();
        j.priority = priority;
        j
    }

    #[test]
    fn ready_order_is_time_then_priority_then_id() {
        let mut jobs = vec![
            job("c", 200, 0),
            job("b", 100, 5),
            job("a", 100, 5),
            job("d", 100, 1),
        ];
        order_ready(&mut jobs);
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn fallback_retry_ladder() {
        assert_eq!(fallback_retry_delay_ms(0), 2_000);
        assert_eq!(fallback_retry_delay_ms(1), 4_000);
        assert_eq!(fallback_retry_delay_ms(2), 8_000);
        // Caps at five minutes.
        assert_eq!(fallback_retry_delay_ms(10), 300_000);
        assert_eq!(fallback_retry_delay_ms(u32::MAX - 1), 300_000);
    }
}
