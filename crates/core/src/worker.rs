//! Worker registry record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(WorkerStatus::Starting),
            "running" => Some(WorkerStatus::Running),
            "stopping" => Some(WorkerStatus::Stopping),
            "stopped" => Some(WorkerStatus::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory liveness and throughput record for one worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub max_concurrent_jobs: i32,
    pub current_jobs: i32,
    pub jobs_processed: i64,
    pub jobs_succeeded: i64,
    pub jobs_failed: i64,
}

/// Stable identity for this worker process: host plus pid.
pub fn local_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}-{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            WorkerStatus::Starting,
            WorkerStatus::Running,
            WorkerStatus::Stopping,
            WorkerStatus::Stopped,
        ] {
            assert_eq!(WorkerStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(WorkerStatus::parse("zombie"), None);
    }

    #[test]
    fn worker_id_embeds_pid() {
        let id = local_worker_id();
        assert!(id.ends_with(&std::process::id().to_string()));
    }
}
