use std::env;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub coordination: CoordinationConfig,
    pub durable: DurableConfig,
    pub weather: WeatherConfig,
    pub meta: MetaAdsConfig,
    pub google: GoogleAdsConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            coordination: CoordinationConfig::from_env(),
            durable: DurableConfig::from_env(),
            weather: WeatherConfig::from_env(),
            meta: MetaAdsConfig::from_env(),
            google: GoogleAdsConfig::from_env(),
            worker: WorkerConfig::from_env(),
        }
    }

    /// Startup validation: the two stores are mandatory, everything else
    /// degrades at the call site.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.coordination.url.is_empty() {
            return Err(CoreError::Config("COORDINATION_URL is not set".into()));
        }
        if self.durable.url.is_empty() {
            return Err(CoreError::Config("DURABLE_URL is not set".into()));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  coordination: url={}", redact_url(&self.coordination.url));
        tracing::info!("  durable:      url={}", redact_url(&self.durable.url));
        tracing::info!("  weather:      configured={}", self.weather.is_configured());
        tracing::info!("  meta ads:     configured={}", self.meta.is_configured());
        tracing::info!("  google ads:   configured={}", self.google.is_configured());
        tracing::info!(
            "  worker:       max_concurrent={}, heartbeat_ms={}, poll_ms={}",
            self.worker.max_concurrent_jobs,
            self.worker.heartbeat_ms,
            self.worker.poll_interval_ms
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "coordination": { "url": redact_url(&self.coordination.url) },
            "durable": { "url": redact_url(&self.durable.url) },
            "weather": { "configured": self.weather.is_configured() },
            "meta": { "configured": self.meta.is_configured() },
            "google": { "configured": self.google.is_configured() },
            "worker": {
                "max_concurrent_jobs": self.worker.max_concurrent_jobs,
                "heartbeat_ms": self.worker.heartbeat_ms,
                "poll_interval_ms": self.worker.poll_interval_ms,
                "batch_size": self.worker.batch_size,
            },
        })
    }
}

/// Strip userinfo from a connection URL for logs.
fn redact_url(url: &str) -> String {
    if url.is_empty() {
        return "(unset)".to_string();
    }
    match url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://***@{}", scheme, host),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}

// ── Coordination store (Redis) ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    pub url: String,
}

impl CoordinationConfig {
    fn from_env() -> Self {
        Self {
            url: env_or("COORDINATION_URL", ""),
        }
    }
}

// ── Durable store (PostgreSQL) ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DurableConfig {
    fn from_env() -> Self {
        Self {
            url: env_or("DURABLE_URL", ""),
            max_connections: env_u32("DURABLE_MAX_CONNECTIONS", 10),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}

// ── Weather provider ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl WeatherConfig {
    fn from_env() -> Self {
        Self {
            api_key: env_opt("WEATHER_API_KEY"),
            base_url: env_or("WEATHER_BASE_URL", "https://api.openweathermap.org"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

// ── Meta ads platform ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaAdsConfig {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub base_url: String,
}

impl MetaAdsConfig {
    fn from_env() -> Self {
        Self {
            app_id: env_opt("PLATFORM_M_APP_ID"),
            app_secret: env_opt("PLATFORM_M_APP_SECRET"),
            base_url: env_or("PLATFORM_M_BASE_URL", "https://graph.facebook.com/v19.0"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_secret.is_some()
    }
}

// ── Google ads platform ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleAdsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: String,
}

impl GoogleAdsConfig {
    fn from_env() -> Self {
        Self {
            client_id: env_opt("PLATFORM_G_CLIENT_ID"),
            client_secret: env_opt("PLATFORM_G_CLIENT_SECRET"),
            base_url: env_or("PLATFORM_G_BASE_URL", "https://googleads.googleapis.com/v16"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

// ── Worker loop tuning ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum jobs processed concurrently by one worker.
    pub max_concurrent_jobs: usize,
    /// Registry heartbeat cadence.
    pub heartbeat_ms: u64,
    /// Sleep between scheduler poll cycles.
    pub poll_interval_ms: u64,
    /// Ready jobs fetched per poll cycle.
    pub batch_size: usize,
}

impl WorkerConfig {
    fn from_env() -> Self {
        Self {
            max_concurrent_jobs: env_usize("WORKER_MAX_CONCURRENT_JOBS", 5),
            heartbeat_ms: env_u64("WORKER_HEARTBEAT_MS", 15_000),
            poll_interval_ms: env_u64("WORKER_POLL_INTERVAL_MS", 5_000),
            batch_size: env_usize("WORKER_BATCH_SIZE", 5),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_url_strips_userinfo() {
        assert_eq!(
            redact_url("postgres://user:pass@db:5432/vane"),
            "postgres://***@db:5432/vane"
        );
        assert_eq!(redact_url("redis://cache:6379"), "redis://cache:6379");
        assert_eq!(redact_url(""), "(unset)");
    }

    #[test]
    fn worker_defaults() {
        // No env overrides set in the test environment for these.
        let w = WorkerConfig::from_env();
        assert_eq!(w.max_concurrent_jobs, 5);
        assert_eq!(w.heartbeat_ms, 15_000);
        assert_eq!(w.poll_interval_ms, 5_000);
        assert_eq!(w.batch_size, 5);
    }

    #[test]
    fn validate_requires_both_stores() {
        let mut cfg = Config::from_env();
        cfg.coordination.url = String::new();
        cfg.durable.url = "postgres://db/vane".into();
        assert!(cfg.validate().is_err());

        cfg.coordination.url = "redis://cache:6379".into();
        cfg.durable.url = String::new();
        assert!(cfg.validate().is_err());

        cfg.durable.url = "postgres://db/vane".into();
        assert!(cfg.validate().is_ok());
    }
}
