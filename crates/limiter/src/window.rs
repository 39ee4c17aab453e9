//! Sliding-window admission over the shared coordination store.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

use vane_core::backoff::now_ms;

use crate::config::{limits_for, SERVICE_LIMITS};

/// Outcome of a single window check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the window after this one; `None` when the service
    /// is unknown or the store was unreachable.
    pub remaining: Option<u64>,
    /// How long to wait before retrying a refused request.
    pub retry_after_ms: Option<u64>,
}

impl RateLimitDecision {
    fn open() -> Self {
        Self {
            allowed: true,
            remaining: None,
            retry_after_ms: None,
        }
    }
}

/// Point-in-time usage of one service window, for stats surfaces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceUsage {
    pub current: u64,
    pub max_requests: u64,
    pub window_ms: i64,
}

/// Distributed sliding-window limiter.
///
/// Each admitted request leaves a timestamp-scored mark in
/// `ratelimit:<service>:<identifier>`; marks older than the window are
/// evicted on every check. A detached limiter (no store) allows everything,
/// which is also the behavior when the store errors mid-check.
#[derive(Clone)]
pub struct RateLimiter {
    conn: Option<ConnectionManager>,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn: Some(conn) }
    }

    /// Limiter with no coordination store: every check is allowed. Used
    /// for dry runs and when the store is configured out.
    pub fn detached() -> Self {
        Self { conn: None }
    }

    pub(crate) fn connection(&self) -> Option<&ConnectionManager> {
        self.conn.as_ref()
    }

    fn window_key(service: &str, identifier: Option<&str>) -> String {
        format!("ratelimit:{}:{}", service, identifier.unwrap_or("default"))
    }

    /// Admit or refuse one request against the service's sliding window.
    pub async fn check(&self, service: &str, identifier: Option<&str>) -> RateLimitDecision {
        let Some(limits) = limits_for(service) else {
            warn!(service = %service, "no rate limit configured — allowing");
            return RateLimitDecision::open();
        };

        let Some(conn) = &self.conn else {
            return RateLimitDecision::open();
        };

        match Self::check_window(conn.clone(), service, identifier, limits).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(service = %service, error = %e, "rate limit check failed — allowing");
                RateLimitDecision::open()
            }
        }
    }

    async fn check_window(
        mut conn: ConnectionManager,
        service: &str,
        identifier: Option<&str>,
        limits: &crate::config::ServiceLimits,
    ) -> Result<RateLimitDecision, redis::RedisError> {
        let key = Self::window_key(service, identifier);
        let now = now_ms();
        let min_score = now - limits.window_ms;

        // Evict expired marks, count survivors, and read the oldest mark in
        // one atomic batch.
        let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(min_score)
            .ignore()
            .cmd("ZCARD")
            .arg(&key)
            .cmd("ZRANGE")
            .arg(&key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        if count >= limits.max_requests {
            let retry_after_ms = oldest
                .first()
                .map(|(_, score)| ((*score as i64 + limits.window_ms) - now).max(0) as u64)
                .filter(|ms| *ms > 0)
                .unwrap_or(limits.default_retry_after_ms);
            debug!(
                service = %service,
                count,
                max = limits.max_requests,
                retry_after_ms,
                "rate limit window full"
            );
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: Some(0),
                retry_after_ms: Some(retry_after_ms),
            });
        }

        // Record this request. The member embeds a UUID so two workers
        // admitted in the same millisecond never collapse into one mark.
        let member = format!("{}-{}", now, Uuid::new_v4());
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(now)
            .arg(&member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&key)
            .arg(limits.window_ms)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(RateLimitDecision {
            allowed: true,
            remaining: Some(limits.max_requests - count - 1),
            retry_after_ms: None,
        })
    }

    /// Current usage of every known service's default window.
    pub async fn stats(&self) -> HashMap<String, ServiceUsage> {
        let mut usage = HashMap::new();
        let Some(conn) = &self.conn else {
            return usage;
        };

        for limits in SERVICE_LIMITS {
            let key = Self::window_key(limits.service, None);
            let min_score = now_ms() - limits.window_ms;
            let mut conn = conn.clone();
            let current: u64 = match redis::cmd("ZCOUNT")
                .arg(&key)
                .arg(min_score)
                .arg("+inf")
                .query_async(&mut conn)
                .await
            {
                Ok(n) => n,
                Err(e) => {
                    warn!(service = %limits.service, error = %e, "rate limit stats read failed");
                    continue;
                }
            };
            usage.insert(
                limits.service.to_string(),
                ServiceUsage {
                    current,
                    max_requests: limits.max_requests,
                    window_ms: limits.window_ms,
                },
            );
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_key_defaults_identifier() {
        assert_eq!(
            RateLimiter::window_key("weather", None),
            "ratelimit:weather:default"
        );
        assert_eq!(
            RateLimiter::window_key("meta_ads", Some("acct-7")),
            "ratelimit:meta_ads:acct-7"
        );
    }

    #[tokio::test]
    async fn detached_limiter_allows_everything() {
        let limiter = RateLimiter::detached();
        let decision = limiter.check("weather", None).await;
        assert!(decision.allowed);
        assert!(decision.remaining.is_none());

        // Unknown services are also allowed.
        let decision = limiter.check("carrier_pigeon", None).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn detached_stats_are_empty() {
        let limiter = RateLimiter::detached();
        assert!(limiter.stats().await.is_empty());
    }
}
