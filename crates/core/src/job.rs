//! Scheduler-owned job record and completion result.

use serde::{Deserialize, Serialize};

use crate::backoff::now_ms;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    AutomationRuleCheck,
}

/// One due evaluation of a rule. Timestamps are epoch milliseconds, the
/// same unit as the scheduled-set scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub rule_id: String,
    pub user_id: String,
    pub interval_minutes: i64,
    /// Lower sorts sooner on scheduled-time ties.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub scheduled_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<i64>,
}

impl Job {
    /// Deterministic id for a rule's recurring check job. One rule maps to
    /// one job id, which is what makes scheduling idempotent.
    pub fn rule_check_id(rule_id: &str) -> String {
        format!("rule_check_{rule_id}")
    }

    /// Recurring rule-check job due one interval from now.
    pub fn rule_check(rule_id: &str, user_id: &str, interval_minutes: i64) -> Self {
        let now = now_ms();
        Self::rule_check_at(rule_id, user_id, interval_minutes, now + interval_minutes * 60_000)
    }

    /// Recurring rule-check job due at an explicit instant (startup
    /// rescheduling computes `max(now, last_checked + interval)`).
    pub fn rule_check_at(
        rule_id: &str,
        user_id: &str,
        interval_minutes: i64,
        scheduled_at: i64,
    ) -> Self {
        Self {
            id: Self::rule_check_id(rule_id),
            job_type: JobType::AutomationRuleCheck,
            rule_id: rule_id.to_string(),
            user_id: user_id.to_string(),
            interval_minutes,
            priority: 0,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now_ms(),
            scheduled_at,
            last_executed_at: None,
            processing_started_at: None,
        }
    }
}

/// Outcome a worker reports back to the scheduler for a claimed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retry delay chosen by the engine's error classification; the
    /// scheduler falls back to its own exponential ladder when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Terminal failures are never retried.
    #[serde(default)]
    pub terminal: bool,
}

impl JobResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            retry_after_ms: None,
            terminal: false,
        }
    }

    pub fn failed(error: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            retry_after_ms,
            terminal: false,
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            retry_after_ms: None,
            terminal: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_check_id_is_deterministic() {
        assert_eq!(Job::rule_check_id("r-9"), "rule_check_r-9");
        let a = Job::rule_check("r-9", "u-1", 60);
        let b = Job::rule_check("r-9", "u-2", 30);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn rule_check_schedules_one_interval_out() {
        let before = now_ms();
        let job = Job::rule_check("r-1", "u-1", 60);
        let after = now_ms();
        assert!(job.scheduled_at >= before + 3_600_000);
        assert!(job.scheduled_at <= after + 3_600_000);
        assert!(job.scheduled_at >= job.created_at);
    }

    #[test]
    fn job_round_trips_through_json() {
        let job = Job::rule_check("r-1", "u-1", 5);
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"type\":\"automation_rule_check\""));
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(back.processing_started_at, None);
    }
}
