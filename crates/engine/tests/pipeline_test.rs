//! End-to-end pipeline scenarios against in-memory collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vane_clients::{
    AdSetDetails, ClientError, GoogleAdsApi, GoogleCampaignStatus, MetaAdsApi, MetaStatus,
    WeatherApi,
};
use vane_core::{
    CampaignTarget, Condition, ConditionOperator, ExecutionRecord, Location, Platform, Rule,
    TargetAction, TargetType, WeatherParameter, WeatherSnapshot,
};
use vane_engine::{EngineError, RulePipeline};
use vane_limiter::RateLimiter;
use vane_store::{CredentialsLookup, PlatformCredentials, RuleRepository, StoreError};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeRules {
    rules: Mutex<HashMap<String, Rule>>,
    executions: Mutex<Vec<ExecutionRecord>>,
    last_checked: Mutex<Option<DateTime<Utc>>>,
    last_executed: Mutex<Option<DateTime<Utc>>>,
}

impl FakeRules {
    fn with_rule(rule: Rule) -> Arc<Self> {
        let fake = Self::default();
        fake.rules.lock().unwrap().insert(rule.id.clone(), rule);
        Arc::new(fake)
    }

    fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuleRepository for FakeRules {
    async fn find_by_id(&self, rule_id: &str) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.lock().unwrap().get(rule_id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Rule>, StoreError> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }

    async fn set_last_checked(&self, _rule_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        *self.last_checked.lock().unwrap() = Some(at);
        Ok(())
    }

    async fn set_last_executed(&self, _rule_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        *self.last_executed.lock().unwrap() = Some(at);
        Ok(())
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.executions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn recent_executions(
        &self,
        rule_id: &str,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        Ok(self
            .executions()
            .into_iter()
            .filter(|e| e.rule_id == rule_id)
            .take(limit as usize)
            .collect())
    }
}

struct FakeCredentials {
    meta: Option<PlatformCredentials>,
    google: Option<PlatformCredentials>,
}

impl FakeCredentials {
    fn both() -> Arc<Self> {
        Arc::new(Self {
            meta: Some(PlatformCredentials {
                access_token: "meta-token".into(),
                account_id: Some("act_1".into()),
            }),
            google: Some(PlatformCredentials {
                access_token: "google-token".into(),
                account_id: None,
            }),
        })
    }

    fn none() -> Arc<Self> {
        Arc::new(Self {
            meta: None,
            google: None,
        })
    }
}

#[async_trait]
impl CredentialsLookup for FakeCredentials {
    async fn meta_for(&self, _user_id: &str) -> Result<Option<PlatformCredentials>, StoreError> {
        Ok(self.meta.clone())
    }

    async fn google_for(&self, _user_id: &str) -> Result<Option<PlatformCredentials>, StoreError> {
        Ok(self.google.clone())
    }
}

/// Weather fake: scripted responses first, then a steady-state snapshot.
struct FakeWeather {
    scripted: Mutex<VecDeque<Result<WeatherSnapshot, ClientError>>>,
    steady: WeatherSnapshot,
    calls: AtomicU32,
}

impl FakeWeather {
    fn steady(snapshot: WeatherSnapshot) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(VecDeque::new()),
            steady: snapshot,
            calls: AtomicU32::new(0),
        })
    }

    fn scripted(
        responses: Vec<Result<WeatherSnapshot, ClientError>>,
        steady: WeatherSnapshot,
    ) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(responses.into()),
            steady,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl WeatherApi for FakeWeather {
    async fn current_weather(&self, _lat: f64, _lon: f64) -> Result<WeatherSnapshot, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripted.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.steady.clone()),
        }
    }
}

#[derive(Default)]
struct FakeMeta {
    ad_set_missing: bool,
    lookups: AtomicU32,
    updates: Mutex<Vec<(String, MetaStatus)>>,
}

#[async_trait]
impl MetaAdsApi for FakeMeta {
    async fn get_ad_set(&self, ad_set_id: &str, _token: &str) -> Result<AdSetDetails, ClientError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.ad_set_missing {
            return Err(ClientError::NotFound {
                resource: format!("ad set {ad_set_id}"),
            });
        }
        Ok(AdSetDetails {
            id: ad_set_id.to_string(),
            name: "test ad set".into(),
            status: "ACTIVE".into(),
            campaign_id: Some("c-1".into()),
        })
    }

    async fn update_ad_set_status(
        &self,
        ad_set_id: &str,
        status: MetaStatus,
        _token: &str,
    ) -> Result<(), ClientError> {
        self.updates
            .lock()
            .unwrap()
            .push((ad_set_id.to_string(), status));
        Ok(())
    }

    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: MetaStatus,
        _token: &str,
    ) -> Result<(), ClientError> {
        self.updates
            .lock()
            .unwrap()
            .push((campaign_id.to_string(), status));
        Ok(())
    }
}

#[derive(Default)]
struct FakeGoogle {
    updates: Mutex<Vec<(String, GoogleCampaignStatus)>>,
}

#[async_trait]
impl GoogleAdsApi for FakeGoogle {
    async fn update_campaign_status(
        &self,
        campaign_id: &str,
        status: GoogleCampaignStatus,
        _token: &str,
    ) -> Result<(), ClientError> {
        self.updates
            .lock()
            .unwrap()
            .push((campaign_id.to_string(), status));
        Ok(())
    }
}

// ── Builders ────────────────────────────────────────────────────────

fn meta_target(campaign: &str, ad_set: &str, action: TargetAction) -> CampaignTarget {
    CampaignTarget {
        platform: Platform::Meta,
        campaign_id: campaign.into(),
        ad_set_id: Some(ad_set.into()),
        action,
        target_type: TargetType::AdSet,
    }
}

fn google_target(campaign: &str, ad_set: &str, action: TargetAction) -> CampaignTarget {
    CampaignTarget {
        platform: Platform::Google,
        campaign_id: campaign.into(),
        ad_set_id: Some(ad_set.into()),
        action,
        target_type: TargetType::AdSet,
    }
}

fn hot_rule(targets: Vec<CampaignTarget>) -> Rule {
    Rule {
        id: "r-1".into(),
        user_id: "u-1".into(),
        name: "pause in heat".into(),
        is_active: true,
        location: Location { lat: 0.0, lon: 0.0 },
        conditions: vec![Condition {
            parameter: WeatherParameter::Temperature,
            operator: ConditionOperator::GreaterThan,
            value: 30.0,
            unit: "°C".into(),
            range: None,
        }],
        condition_logic: None,
        campaigns: targets,
        check_interval_minutes: 60,
        last_checked_at: None,
        last_executed_at: None,
    }
}

fn weather_at(temp: f64) -> WeatherSnapshot {
    WeatherSnapshot {
        temperature: Some(temp),
        humidity: Some(50.0),
        wind_speed: Some(3.0),
        precipitation: Some(0.0),
        visibility: Some(10.0),
        cloud_cover: Some(20.0),
        ..WeatherSnapshot::empty()
    }
}

struct Harness {
    rules: Arc<FakeRules>,
    weather: Arc<FakeWeather>,
    meta: Arc<FakeMeta>,
    google: Arc<FakeGoogle>,
    pipeline: RulePipeline,
}

fn harness(
    rule: Rule,
    weather: Arc<FakeWeather>,
    meta: FakeMeta,
    credentials: Arc<FakeCredentials>,
) -> Harness {
    let rules = FakeRules::with_rule(rule);
    let meta = Arc::new(meta);
    let google = Arc::new(FakeGoogle::default());
    let pipeline = RulePipeline::new(
        rules.clone(),
        credentials,
        weather.clone(),
        meta.clone(),
        google.clone(),
        Arc::new(RateLimiter::detached()),
    );
    Harness {
        rules,
        weather,
        meta,
        google,
        pipeline,
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn happy_pause_dispatches_and_records() {
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-1", TargetAction::Pause)]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(record.conditions_met);
    assert!(record.success);
    assert_eq!(record.actions_taken.len(), 1);
    assert!(record.actions_taken[0].success);
    assert_eq!(record.actions_taken[0].ad_set_id.as_deref(), Some("a-1"));
    assert_eq!(record.metrics.weather_calls, 1);
    assert_eq!(record.metrics.meta_calls, 2); // lookup + update

    assert_eq!(h.weather.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.meta.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(
        *h.meta.updates.lock().unwrap(),
        vec![("a-1".to_string(), MetaStatus::Paused)]
    );

    // Bookkeeping and audit row both written.
    assert!(h.rules.last_checked.lock().unwrap().is_some());
    assert!(h.rules.last_executed.lock().unwrap().is_some());
    assert_eq!(h.rules.executions().len(), 1);
}

#[tokio::test]
async fn conditions_not_met_skips_dispatch() {
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-1", TargetAction::Pause)]),
        FakeWeather::steady(weather_at(25.0)),
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(!record.conditions_met);
    assert!(record.success);
    assert!(record.actions_taken.is_empty());
    assert!(h.meta.updates.lock().unwrap().is_empty());
    assert!(h.rules.last_executed.lock().unwrap().is_none());
    assert_eq!(h.rules.executions().len(), 1);
}

#[tokio::test]
async fn between_boundary_is_inclusive_only_to_the_range() {
    let mut rule = hot_rule(vec![]);
    rule.conditions = vec![Condition {
        parameter: WeatherParameter::Humidity,
        operator: ConditionOperator::Between,
        value: 50.0,
        unit: "%".into(),
        range: Some(10.0),
    }];

    let mut at_60 = weather_at(20.0);
    at_60.humidity = Some(60.0);
    let h = harness(
        rule.clone(),
        FakeWeather::steady(at_60),
        FakeMeta::default(),
        FakeCredentials::both(),
    );
    let record = h.pipeline.process_rule("r-1").await.unwrap();
    assert!(record.conditions_met);

    let mut at_60_5 = weather_at(20.0);
    at_60_5.humidity = Some(60.5);
    let h = harness(
        rule,
        FakeWeather::steady(at_60_5),
        FakeMeta::default(),
        FakeCredentials::both(),
    );
    let record = h.pipeline.process_rule("r-1").await.unwrap();
    assert!(!record.conditions_met);
}

#[tokio::test]
async fn rate_limited_weather_retries_and_counts_attempts() {
    let weather = FakeWeather::scripted(
        vec![Err(ClientError::Api {
            status: 429,
            message: "too many requests".into(),
            retry_after_ms: Some(20),
        })],
        weather_at(31.0),
    );
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-1", TargetAction::Pause)]),
        weather,
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(record.success);
    // Attempts, not successes: the 429 counts.
    assert_eq!(record.metrics.weather_calls, 2);
    assert_eq!(h.weather.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.rules.executions().len(), 1);
}

#[tokio::test]
async fn missing_ad_set_fails_action_without_update() {
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-404", TargetAction::Pause)]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta {
            ad_set_missing: true,
            ..FakeMeta::default()
        },
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(record.conditions_met);
    assert!(!record.success);
    assert!(!record.actions_taken[0].success);
    assert!(record.actions_taken[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("not found"));
    // The status update was never issued.
    assert!(h.meta.updates.lock().unwrap().is_empty());
    assert!(h.rules.last_executed.lock().unwrap().is_none());
    assert_eq!(h.rules.executions().len(), 1);
}

#[tokio::test]
async fn failed_target_does_not_block_siblings() {
    let h = harness(
        hot_rule(vec![
            meta_target("c-1", "a-404", TargetAction::Pause),
            google_target("g-1", "ga-1", TargetAction::Pause),
        ]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta {
            ad_set_missing: true,
            ..FakeMeta::default()
        },
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(!record.success);
    // Results arrive in target-list order regardless of completion order.
    assert_eq!(record.actions_taken.len(), 2);
    assert_eq!(record.actions_taken[0].platform, Platform::Meta);
    assert!(!record.actions_taken[0].success);
    assert_eq!(record.actions_taken[1].platform, Platform::Google);
    assert!(record.actions_taken[1].success);
    assert_eq!(
        *h.google.updates.lock().unwrap(),
        vec![("g-1".to_string(), GoogleCampaignStatus::Paused)]
    );
}

#[tokio::test]
async fn missing_credentials_fail_per_action_without_platform_calls() {
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-1", TargetAction::Pause)]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta::default(),
        FakeCredentials::none(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(!record.success);
    assert_eq!(
        record.actions_taken[0].error_message.as_deref(),
        Some("meta account not found")
    );
    assert_eq!(h.meta.lookups.load(Ordering::SeqCst), 0);
    assert_eq!(record.metrics.meta_calls, 0);
}

#[tokio::test]
async fn resume_maps_to_platform_specific_statuses() {
    let h = harness(
        hot_rule(vec![
            meta_target("c-1", "a-1", TargetAction::Resume),
            google_target("g-1", "ga-1", TargetAction::Resume),
        ]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();
    assert!(record.success);
    assert_eq!(
        *h.meta.updates.lock().unwrap(),
        vec![("a-1".to_string(), MetaStatus::Active)]
    );
    assert_eq!(
        *h.google.updates.lock().unwrap(),
        vec![("g-1".to_string(), GoogleCampaignStatus::Enabled)]
    );
}

#[tokio::test]
async fn inactive_rule_short_circuits() {
    let mut rule = hot_rule(vec![meta_target("c-1", "a-1", TargetAction::Pause)]);
    rule.is_active = false;
    let h = harness(
        rule,
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let record = h.pipeline.process_rule("r-1").await.unwrap();

    assert!(record.success);
    assert!(record.actions_taken.is_empty());
    assert_eq!(h.weather.calls.load(Ordering::SeqCst), 0);
    // No audit row for a skipped rule.
    assert!(h.rules.executions().is_empty());
}

#[tokio::test]
async fn missing_rule_is_terminal() {
    let h = harness(
        hot_rule(vec![]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let err = h.pipeline.process_rule("r-does-not-exist").await.unwrap_err();
    assert!(matches!(err, EngineError::RuleNotFound(_)));
    assert!(err.is_terminal());
    assert!(h.rules.executions().is_empty());
}

#[tokio::test]
async fn weather_failure_records_failed_execution_and_rethrows() {
    let weather = FakeWeather::scripted(
        vec![Err(ClientError::Api {
            status: 401,
            message: "invalid api key".into(),
            retry_after_ms: None,
        })],
        weather_at(31.0),
    );
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-1", TargetAction::Pause)]),
        weather,
        FakeMeta::default(),
        FakeCredentials::both(),
    );

    let err = h.pipeline.process_rule("r-1").await.unwrap_err();
    assert!(!err.is_terminal());

    let executions = h.rules.executions();
    assert_eq!(executions.len(), 1);
    assert!(!executions[0].success);
    assert!(executions[0].weather_data.is_none());
    assert!(executions[0].error_message.is_some());
}

#[tokio::test]
async fn test_rule_is_a_dry_run() {
    let h = harness(
        hot_rule(vec![meta_target("c-1", "a-404", TargetAction::Pause)]),
        FakeWeather::steady(weather_at(31.0)),
        FakeMeta {
            ad_set_missing: true,
            ..FakeMeta::default()
        },
        FakeCredentials::none(),
    );

    let record = h.pipeline.test_rule("r-1").await.unwrap();

    // Conditions evaluated for real, actions synthetically successful.
    assert!(record.conditions_met);
    assert!(record.success);
    assert!(record.actions_taken.iter().all(|a| a.success));
    // No platform traffic, no bookkeeping, no audit row.
    assert_eq!(h.meta.lookups.load(Ordering::SeqCst), 0);
    assert!(h.rules.last_checked.lock().unwrap().is_none());
    assert!(h.rules.executions().is_empty());
}
