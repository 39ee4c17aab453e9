//! Automation rule model: location, weather conditions, and campaign targets.
//!
//! Rules are owned by the rule repository; the engine only reads them and
//! writes back the two bookkeeping timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::weather::WeatherParameter;

/// A user-defined automation rule binding a location, weather conditions,
/// and a list of ad campaign targets to pause or resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    pub is_active: bool,
    pub location: Location,
    /// Legacy flat condition list, evaluated with AND semantics when
    /// `condition_logic` is absent.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_logic: Option<ConditionLogic>,
    pub campaigns: Vec<CampaignTarget>,
    pub check_interval_minutes: i64,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Ingress validation: location bounds, positive interval, and
    /// ad-set-level targets only.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.location.validate()?;
        if self.check_interval_minutes <= 0 {
            return Err(CoreError::InvalidRule(format!(
                "check_interval_minutes must be positive, got {}",
                self.check_interval_minutes
            )));
        }
        for target in &self.campaigns {
            target.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoreError::InvalidRule(format!("latitude out of range: {}", self.lat)));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(CoreError::InvalidRule(format!("longitude out of range: {}", self.lon)));
        }
        Ok(())
    }
}

// ── Conditions ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    GreaterThan,
    LessThan,
    Equals,
    Between,
}

/// A single weather threshold check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub parameter: WeatherParameter,
    pub operator: ConditionOperator,
    pub value: f64,
    pub unit: String,
    /// Half-width for `between`; defaults to 5 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Nested condition logic: groups of conditions, each with its own
/// operator, combined by a global operator. Two levels deep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionLogic {
    pub groups: Vec<ConditionGroup>,
    pub global_operator: LogicalOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<TimeFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    pub conditions: Vec<Condition>,
}

/// Forecast window riders attached to nested logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeFrame {
    pub days: u8,
    pub action: TimeFrameAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrameAction {
    On,
    Off,
}

// ── Campaign targets ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Meta,
    Google,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    AdSet,
    Campaign,
}

fn default_target_type() -> TargetType {
    TargetType::AdSet
}

/// One ad set on one platform plus the desired action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignTarget {
    pub platform: Platform,
    pub campaign_id: String,
    #[serde(default)]
    pub ad_set_id: Option<String>,
    pub action: TargetAction,
    #[serde(default = "default_target_type")]
    pub target_type: TargetType,
}

impl CampaignTarget {
    /// Campaign-level targets are rejected at ingress; every target must
    /// name an ad set.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.target_type != TargetType::AdSet {
            return Err(CoreError::InvalidRule(format!(
                "campaign-level target not allowed for campaign {}",
                self.campaign_id
            )));
        }
        if self.ad_set_id.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::InvalidRule(format!(
                "target for campaign {} is missing ad_set_id",
                self.campaign_id
            )));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> CampaignTarget {
        CampaignTarget {
            platform: Platform::Meta,
            campaign_id: "c-1".into(),
            ad_set_id: Some("a-1".into()),
            action: TargetAction::Pause,
            target_type: TargetType::AdSet,
        }
    }

    fn sample_rule() -> Rule {
        Rule {
            id: "r-1".into(),
            user_id: "u-1".into(),
            name: "heat pause".into(),
            is_active: true,
            location: Location { lat: 0.0, lon: 0.0 },
            conditions: vec![],
            condition_logic: None,
            campaigns: vec![sample_target()],
            check_interval_minutes: 60,
            last_checked_at: None,
            last_executed_at: None,
        }
    }

    #[test]
    fn location_boundaries_inclusive() {
        assert!(Location { lat: 90.0, lon: 180.0 }.validate().is_ok());
        assert!(Location { lat: -90.0, lon: -180.0 }.validate().is_ok());
        assert!(Location { lat: 90.01, lon: 0.0 }.validate().is_err());
        assert!(Location { lat: 0.0, lon: -180.5 }.validate().is_err());
    }

    #[test]
    fn campaign_level_target_rejected() {
        let mut target = sample_target();
        target.target_type = TargetType::Campaign;
        assert!(target.validate().is_err());
    }

    #[test]
    fn target_without_ad_set_rejected() {
        let mut target = sample_target();
        target.ad_set_id = None;
        assert!(target.validate().is_err());

        target.ad_set_id = Some(String::new());
        assert!(target.validate().is_err());
    }

    #[test]
    fn rule_rejects_non_positive_interval() {
        let mut rule = sample_rule();
        rule.check_interval_minutes = 0;
        assert!(rule.validate().is_err());
        // Any positive integer is accepted; range policy lives upstream.
        rule.check_interval_minutes = 3;
        assert!(rule.validate().is_ok());
        rule.check_interval_minutes = 10_000;
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn condition_logic_round_trips() {
        let logic = ConditionLogic {
            groups: vec![ConditionGroup {
                operator: LogicalOperator::And,
                conditions: vec![Condition {
                    parameter: WeatherParameter::Temperature,
                    operator: ConditionOperator::GreaterThan,
                    value: 30.0,
                    unit: "°C".into(),
                    range: None,
                }],
            }],
            global_operator: LogicalOperator::Or,
            time_frame: None,
        };
        let json = serde_json::to_string(&logic).unwrap();
        assert!(json.contains("\"OR\""));
        assert!(json.contains("greater_than"));
        let back: ConditionLogic = serde_json::from_str(&json).unwrap();
        assert_eq!(back.groups.len(), 1);
        assert_eq!(back.global_operator, LogicalOperator::Or);
    }
}
