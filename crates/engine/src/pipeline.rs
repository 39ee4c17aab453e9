//! The fetch → evaluate → act pipeline for a single rule.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use vane_clients::{GoogleAdsApi, MetaAdsApi, WeatherApi};
use vane_core::{
    ActionOutcome, ApiError, ExecutionMetrics, ExecutionRecord, Rule, WeatherSnapshot,
};
use vane_limiter::RateLimiter;
use vane_store::{CredentialsLookup, RuleRepository};

use crate::actions::{dispatch_targets, ActionContext};
use crate::evaluate::{condition_count, evaluate_flat, evaluate_logic};
use crate::EngineError;

const WEATHER_MAX_RETRIES: u32 = 3;

/// Call-attempt counters shared with the parallel action dispatch.
#[derive(Default)]
struct CallCounters {
    weather: AtomicU32,
    meta: AtomicU32,
    google: AtomicU32,
}

impl CallCounters {
    fn to_metrics(&self, started: Instant, conditions_evaluated: u32, actions: u32) -> ExecutionMetrics {
        ExecutionMetrics {
            weather_calls: self.weather.load(Ordering::Relaxed),
            meta_calls: self.meta.load(Ordering::Relaxed),
            google_calls: self.google.load(Ordering::Relaxed),
            total_time_ms: started.elapsed().as_millis() as u64,
            conditions_evaluated,
            actions_executed: actions,
        }
    }
}

/// Everything needed to evaluate one rule once. Holds the collaborator
/// ports plus the rate limiter; no scheduler state, so dry runs and
/// manual runs go through the exact same code as scheduled ticks.
pub struct RulePipeline {
    rules: Arc<dyn RuleRepository>,
    credentials: Arc<dyn CredentialsLookup>,
    weather: Arc<dyn WeatherApi>,
    meta: Arc<dyn MetaAdsApi>,
    google: Arc<dyn GoogleAdsApi>,
    limiter: Arc<RateLimiter>,
}

impl RulePipeline {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        credentials: Arc<dyn CredentialsLookup>,
        weather: Arc<dyn WeatherApi>,
        meta: Arc<dyn MetaAdsApi>,
        google: Arc<dyn GoogleAdsApi>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            rules,
            credentials,
            weather,
            meta,
            google,
            limiter,
        }
    }

    pub fn rules(&self) -> &Arc<dyn RuleRepository> {
        &self.rules
    }

    /// Run one full tick of a rule and append the execution record.
    ///
    /// Errors raised before action dispatch (rule load, bookkeeping write,
    /// weather fetch, evaluation) are themselves recorded as a failed
    /// execution with no weather snapshot, then rethrown so the job driver
    /// can budget a retry. A missing rule is terminal.
    pub async fn process_rule(&self, rule_id: &str) -> Result<ExecutionRecord, EngineError> {
        let started = Instant::now();
        let counters = CallCounters::default();

        let rule = self
            .rules
            .find_by_id(rule_id)
            .await?
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;

        if !rule.is_active {
            debug!(rule_id = %rule.id, "rule inactive — nothing to do");
            return Ok(inactive_record(&rule));
        }

        let n_conditions = condition_count(&rule.conditions, rule.condition_logic.as_ref());

        let (weather, conditions_met) = match self.check_conditions(&rule, &counters).await {
            Ok(pair) => pair,
            Err(e) => {
                let record = ExecutionRecord::failure(
                    &rule.id,
                    e.to_string(),
                    counters.to_metrics(started, n_conditions, 0),
                );
                if let Err(append_err) = self.rules.append_execution(&record).await {
                    warn!(rule_id = %rule.id, error = %append_err, "failed to record failed execution");
                }
                return Err(e);
            }
        };

        let mut actions: Vec<ActionOutcome> = Vec::new();
        let mut execution_success = true;
        if conditions_met {
            let ctx = ActionContext {
                credentials: &*self.credentials,
                meta: &*self.meta,
                google: &*self.google,
                limiter: &*self.limiter,
            };
            actions = dispatch_targets(
                &ctx,
                &rule.user_id,
                &rule.campaigns,
                &counters.meta,
                &counters.google,
            )
            .await;
            execution_success = actions.iter().all(|a| a.success);
            if execution_success {
                self.rules.set_last_executed(&rule.id, Utc::now()).await?;
            }
        }

        let success = !conditions_met || execution_success;
        let error_message = if success {
            None
        } else {
            Some(summarize_action_errors(&actions))
        };

        let record = ExecutionRecord {
            rule_id: rule.id.clone(),
            executed_at: Utc::now(),
            weather_data: Some(weather),
            conditions_met,
            metrics: counters.to_metrics(started, n_conditions, actions.len() as u32),
            actions_taken: actions,
            success,
            error_message,
        };

        self.rules.append_execution(&record).await?;

        info!(
            rule_id = %rule.id,
            conditions_met,
            success,
            actions = record.actions_taken.len(),
            "rule processed"
        );
        Ok(record)
    }

    /// Dry run: fresh weather, real evaluation, synthetic all-success
    /// actions. Touches no platform, writes nothing.
    pub async fn test_rule(&self, rule_id: &str) -> Result<ExecutionRecord, EngineError> {
        let started = Instant::now();
        let counters = CallCounters::default();

        let rule = self
            .rules
            .find_by_id(rule_id)
            .await?
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;

        let n_conditions = condition_count(&rule.conditions, rule.condition_logic.as_ref());
        let weather = self.fetch_weather(&rule, &counters).await?;
        let conditions_met = evaluate_rule(&rule, &weather);

        let actions: Vec<ActionOutcome> = rule
            .campaigns
            .iter()
            .map(|target| ActionOutcome {
                campaign_id: target.campaign_id.clone(),
                platform: target.platform,
                action: target.action,
                success: true,
                error_message: None,
                target_type: target.target_type,
                ad_set_id: target.ad_set_id.clone(),
            })
            .collect();

        Ok(ExecutionRecord {
            rule_id: rule.id.clone(),
            executed_at: Utc::now(),
            weather_data: Some(weather),
            conditions_met,
            metrics: counters.to_metrics(started, n_conditions, actions.len() as u32),
            actions_taken: actions,
            success: true,
            error_message: None,
        })
    }

    async fn check_conditions(
        &self,
        rule: &Rule,
        counters: &CallCounters,
    ) -> Result<(WeatherSnapshot, bool), EngineError> {
        self.rules.set_last_checked(&rule.id, Utc::now()).await?;
        let weather = self.fetch_weather(rule, counters).await?;
        let met = evaluate_rule(rule, &weather);
        Ok((weather, met))
    }

    async fn fetch_weather(
        &self,
        rule: &Rule,
        counters: &CallCounters,
    ) -> Result<WeatherSnapshot, EngineError> {
        let lat = rule.location.lat;
        let lon = rule.location.lon;
        let snapshot = self
            .limiter
            .execute_with_backoff(
                || {
                    counters.weather.fetch_add(1, Ordering::Relaxed);
                    async move {
                        self.weather
                            .current_weather(lat, lon)
                            .await
                            .map_err(ApiError::from)
                    }
                },
                "weather",
                "current_weather",
                WEATHER_MAX_RETRIES,
                None,
            )
            .await?;
        Ok(snapshot)
    }
}

fn evaluate_rule(rule: &Rule, weather: &WeatherSnapshot) -> bool {
    match &rule.condition_logic {
        Some(logic) => evaluate_logic(logic, weather),
        None => evaluate_flat(&rule.conditions, weather),
    }
}

fn inactive_record(rule: &Rule) -> ExecutionRecord {
    ExecutionRecord {
        rule_id: rule.id.clone(),
        executed_at: Utc::now(),
        weather_data: None,
        conditions_met: false,
        actions_taken: Vec::new(),
        success: true,
        error_message: None,
        metrics: ExecutionMetrics::default(),
    }
}

fn summarize_action_errors(actions: &[ActionOutcome]) -> String {
    actions
        .iter()
        .filter(|a| !a.success)
        .map(|a| {
            format!(
                "{} {}: {}",
                a.platform.as_str(),
                a.campaign_id,
                a.error_message.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
