//! Rule repository port and its PostgreSQL implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use vane_core::{ExecutionRecord, Location, Rule};

use crate::executions;
use crate::StoreError;

/// Read side of rule storage plus the two bookkeeping writes and the
/// execution audit log. Rules themselves are owned by the upstream CRUD
/// surface; the engine never creates or deletes them.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn find_by_id(&self, rule_id: &str) -> Result<Option<Rule>, StoreError>;
    async fn find_active(&self) -> Result<Vec<Rule>, StoreError>;
    async fn set_last_checked(&self, rule_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn set_last_executed(&self, rule_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;
    async fn recent_executions(
        &self,
        rule_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: String,
    user_id: String,
    name: String,
    is_active: bool,
    latitude: f64,
    longitude: f64,
    conditions: serde_json::Value,
    condition_logic: Option<serde_json::Value>,
    campaigns: serde_json::Value,
    check_interval_minutes: i64,
    last_checked_at: Option<DateTime<Utc>>,
    last_executed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RuleRow> for Rule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let decode = |what: &str, e: serde_json::Error| {
            StoreError::Decode(format!("rule {}: bad {}: {}", row.id, what, e))
        };
        Ok(Rule {
            conditions: serde_json::from_value(row.conditions.clone())
                .map_err(|e| decode("conditions", e))?,
            condition_logic: row
                .condition_logic
                .clone()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| decode("condition_logic", e))?,
            campaigns: serde_json::from_value(row.campaigns.clone())
                .map_err(|e| decode("campaigns", e))?,
            location: Location {
                lat: row.latitude,
                lon: row.longitude,
            },
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            is_active: row.is_active,
            check_interval_minutes: row.check_interval_minutes,
            last_checked_at: row.last_checked_at,
            last_executed_at: row.last_executed_at,
        })
    }
}

const RULE_COLUMNS: &str = "id, user_id, name, is_active, latitude, longitude, conditions, \
     condition_logic, campaigns, check_interval_minutes, last_checked_at, last_executed_at";

pub struct PgRuleRepository {
    pool: PgPool,
}

impl PgRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepository {
    async fn find_by_id(&self, rule_id: &str) -> Result<Option<Rule>, StoreError> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1"
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Rule::try_from).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE is_active ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Rule::try_from).collect()
    }

    async fn set_last_checked(&self, rule_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE rules SET last_checked_at = $2, updated_at = now() WHERE id = $1")
            .bind(rule_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_executed(&self, rule_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE rules SET last_executed_at = $2, updated_at = now() WHERE id = $1")
            .bind(rule_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        executions::append(&self.pool, record).await
    }

    async fn recent_executions(
        &self,
        rule_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        executions::recent(&self.pool, rule_id, limit).await
    }
}
