//! Execution record: the immutable audit row describing one rule tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::{Platform, TargetAction, TargetType};
use crate::weather::WeatherSnapshot;

/// Outcome of one campaign target within a single execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub campaign_id: String,
    pub platform: Platform,
    pub action: TargetAction,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub target_type: TargetType,
    #[serde(default)]
    pub ad_set_id: Option<String>,
}

/// Call counters and timings for one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub weather_calls: u32,
    pub meta_calls: u32,
    pub google_calls: u32,
    pub total_time_ms: u64,
    pub conditions_evaluated: u32,
    pub actions_executed: u32,
}

/// Audit row for one tick of a rule.
///
/// `success` is true when either the conditions were not met (nothing to
/// do) or every dispatched action succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub rule_id: String,
    pub executed_at: DateTime<Utc>,
    pub weather_data: Option<WeatherSnapshot>,
    pub conditions_met: bool,
    pub actions_taken: Vec<ActionOutcome>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub metrics: ExecutionMetrics,
}

impl ExecutionRecord {
    /// Failed execution shell used when the pipeline aborts before or
    /// during the weather fetch.
    pub fn failure(rule_id: &str, error: impl Into<String>, metrics: ExecutionMetrics) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            executed_at: Utc::now(),
            weather_data: None,
            conditions_met: false,
            actions_taken: Vec::new(),
            success: false,
            error_message: Some(error.into()),
            metrics,
        }
    }
}
