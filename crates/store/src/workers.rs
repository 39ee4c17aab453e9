//! Worker registry: advisory liveness and throughput rollups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use vane_core::{WorkerRecord, WorkerStatus};

use crate::StoreError;

/// Registry operations. The registry is advisory: losing it degrades the
/// dashboard, never the scheduler.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn register(&self, worker_id: &str, max_concurrent_jobs: i32) -> Result<(), StoreError>;

    /// Refresh liveness and the in-flight gauge. Returns the stored
    /// status so a worker can observe an externally requested stop; a
    /// `stopping` status is never overwritten back to `running`.
    async fn heartbeat(&self, worker_id: &str, current_jobs: i32)
        -> Result<WorkerStatus, StoreError>;

    async fn increment_processed(&self, worker_id: &str, success: bool) -> Result<(), StoreError>;
    async fn set_status(&self, worker_id: &str, status: WorkerStatus) -> Result<(), StoreError>;
    async fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError>;
}

#[derive(Debug, FromRow)]
struct WorkerRow {
    worker_id: String,
    status: String,
    started_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    max_concurrent_jobs: i32,
    current_jobs: i32,
    jobs_processed: i64,
    jobs_succeeded: i64,
    jobs_failed: i64,
}

impl TryFrom<WorkerRow> for WorkerRecord {
    type Error = StoreError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let status = WorkerStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Decode(format!("worker {}: bad status {}", row.worker_id, row.status))
        })?;
        Ok(WorkerRecord {
            worker_id: row.worker_id,
            status,
            started_at: row.started_at,
            last_heartbeat: row.last_heartbeat,
            max_concurrent_jobs: row.max_concurrent_jobs,
            current_jobs: row.current_jobs,
            jobs_processed: row.jobs_processed,
            jobs_succeeded: row.jobs_succeeded,
            jobs_failed: row.jobs_failed,
        })
    }
}

pub struct PgWorkerRegistry {
    pool: PgPool,
}

impl PgWorkerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn register(&self, worker_id: &str, max_concurrent_jobs: i32) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workers_registry \
             (worker_id, status, started_at, last_heartbeat, max_concurrent_jobs) \
             VALUES ($1, 'starting', now(), now(), $2) \
             ON CONFLICT (worker_id) DO UPDATE SET \
                 status = 'starting', started_at = now(), last_heartbeat = now(), \
                 max_concurrent_jobs = EXCLUDED.max_concurrent_jobs, \
                 current_jobs = 0, updated_at = now()",
        )
        .bind(worker_id)
        .bind(max_concurrent_jobs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn heartbeat(
        &self,
        worker_id: &str,
        current_jobs: i32,
    ) -> Result<WorkerStatus, StoreError> {
        let status: (String,) = sqlx::query_as(
            "UPDATE workers_registry SET \
                 last_heartbeat = now(), current_jobs = $2, \
                 status = CASE WHEN status = 'stopping' THEN status ELSE 'running' END, \
                 updated_at = now() \
             WHERE worker_id = $1 \
             RETURNING status",
        )
        .bind(worker_id)
        .bind(current_jobs)
        .fetch_one(&self.pool)
        .await?;
        WorkerStatus::parse(&status.0)
            .ok_or_else(|| StoreError::Decode(format!("bad worker status: {}", status.0)))
    }

    async fn increment_processed(&self, worker_id: &str, success: bool) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE workers_registry SET \
                 jobs_processed = jobs_processed + 1, \
                 jobs_succeeded = jobs_succeeded + CASE WHEN $2 THEN 1 ELSE 0 END, \
                 jobs_failed = jobs_failed + CASE WHEN $2 THEN 0 ELSE 1 END, \
                 updated_at = now() \
             WHERE worker_id = $1",
        )
        .bind(worker_id)
        .bind(success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, worker_id: &str, status: WorkerStatus) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE workers_registry SET status = $2, updated_at = now() WHERE worker_id = $1",
        )
        .bind(worker_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>, StoreError> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            "SELECT worker_id, status, started_at, last_heartbeat, max_concurrent_jobs, \
                    current_jobs, jobs_processed, jobs_succeeded, jobs_failed \
             FROM workers_registry ORDER BY started_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkerRecord::try_from).collect()
    }
}
