//! Execution audit rows.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use vane_core::{ExecutionMetrics, ExecutionRecord};

use crate::StoreError;

#[derive(Debug, FromRow)]
struct ExecutionRow {
    rule_id: String,
    executed_at: DateTime<Utc>,
    weather_data: Option<serde_json::Value>,
    conditions_met: bool,
    actions_taken: serde_json::Value,
    success: bool,
    error_message: Option<String>,
    execution_metrics: serde_json::Value,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let decode = |what: &str, e: serde_json::Error| {
            StoreError::Decode(format!("execution for {}: bad {}: {}", row.rule_id, what, e))
        };
        Ok(ExecutionRecord {
            weather_data: row
                .weather_data
                .clone()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| decode("weather_data", e))?,
            actions_taken: serde_json::from_value(row.actions_taken.clone())
                .map_err(|e| decode("actions_taken", e))?,
            metrics: serde_json::from_value::<ExecutionMetrics>(row.execution_metrics.clone())
                .map_err(|e| decode("execution_metrics", e))?,
            rule_id: row.rule_id,
            executed_at: row.executed_at,
            conditions_met: row.conditions_met,
            success: row.success,
            error_message: row.error_message,
        })
    }
}

pub(crate) async fn append(pool: &PgPool, record: &ExecutionRecord) -> Result<(), StoreError> {
    let weather = record
        .weather_data
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Decode(format!("weather snapshot encode: {e}")))?;
    let actions = serde_json::to_value(&record.actions_taken)
        .map_err(|e| StoreError::Decode(format!("actions encode: {e}")))?;
    let metrics = serde_json::to_value(&record.metrics)
        .map_err(|e| StoreError::Decode(format!("metrics encode: {e}")))?;

    sqlx::query(
        "INSERT INTO rule_executions \
         (rule_id, executed_at, weather_data, conditions_met, actions_taken, success, error_message, execution_metrics) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&record.rule_id)
    .bind(record.executed_at)
    .bind(weather)
    .bind(record.conditions_met)
    .bind(actions)
    .bind(record.success)
    .bind(&record.error_message)
    .bind(metrics)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn recent(
    pool: &PgPool,
    rule_id: &str,
    limit: i64,
) -> Result<Vec<ExecutionRecord>, StoreError> {
    let rows = sqlx::query_as::<_, ExecutionRow>(
        "SELECT rule_id, executed_at, weather_data, conditions_met, actions_taken, success, \
                error_message, execution_metrics \
         FROM rule_executions WHERE rule_id = $1 \
         ORDER BY executed_at DESC LIMIT $2",
    )
    .bind(rule_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ExecutionRecord::try_from).collect()
}
