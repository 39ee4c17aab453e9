//! Retrying call driver: window gate, failure classification, persisted
//! per-endpoint backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use vane_core::backoff::{delay_for_attempt, now_ms, BackoffConfig};
use vane_core::ApiError;

use crate::classify::{classify, ErrorClass};
use crate::window::RateLimiter;
use crate::LimiterError;

impl RateLimiter {
    fn backoff_key(service: &str, endpoint: &str) -> String {
        format!("backoff:{}:{}", service, endpoint)
    }

    /// Milliseconds left on a persisted backoff deadline, if any.
    async fn backoff_remaining_ms(&self, service: &str, endpoint: &str) -> Option<u64> {
        let conn = self.connection()?;
        let key = Self::backoff_key(service, endpoint);
        let mut conn = conn.clone();
        let ttl: Result<i64, redis::RedisError> =
            redis::cmd("PTTL").arg(&key).query_async(&mut conn).await;
        match ttl {
            Ok(ms) if ms > 0 => Some(ms as u64),
            Ok(_) => None,
            Err(e) => {
                warn!(service = %service, endpoint = %endpoint, error = %e, "backoff gate read failed");
                None
            }
        }
    }

    async fn set_backoff(&self, service: &str, endpoint: &str, delay_ms: u64) {
        let Some(conn) = self.connection() else { return };
        let key = Self::backoff_key(service, endpoint);
        let deadline = now_ms() + delay_ms as i64;
        let mut conn = conn.clone();
        let result: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(deadline)
            .arg("PX")
            .arg(delay_ms)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!(service = %service, endpoint = %endpoint, error = %e, "failed to persist backoff deadline");
        }
    }

    async fn clear_backoff(&self, service: &str, endpoint: &str) {
        let Some(conn) = self.connection() else { return };
        let key = Self::backoff_key(service, endpoint);
        let mut conn = conn.clone();
        let result: Result<(), redis::RedisError> =
            redis::cmd("DEL").arg(&key).query_async(&mut conn).await;
        if let Err(e) = result {
            warn!(service = %service, endpoint = %endpoint, error = %e, "failed to clear backoff deadline");
        }
    }

    /// Invoke `op`, retrying through the sliding window and the persisted
    /// backoff gate.
    ///
    /// Each attempt first waits out any stored backoff deadline, then asks
    /// the window for admission (a refusal sleeps the advertised
    /// retry-after and counts toward the retry budget). Failures are
    /// classified: terminal errors rethrow immediately, rate-limit errors
    /// persist a backoff deadline for sibling workers, everything
    /// retryable sleeps a jittered exponential delay.
    pub async fn execute_with_backoff<T, F, Fut>(
        &self,
        mut op: F,
        service: &str,
        endpoint: &str,
        max_retries: u32,
        backoff: Option<BackoffConfig>,
    ) -> Result<T, LimiterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let cfg = backoff.unwrap_or_default();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(wait_ms) = self.backoff_remaining_ms(service, endpoint).await {
                debug!(
                    service = %service,
                    endpoint = %endpoint,
                    wait_ms,
                    "waiting out persisted backoff deadline"
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }

            let decision = self.check(service, None).await;
            if !decision.allowed {
                let wait_ms = decision.retry_after_ms.unwrap_or(1_000);
                warn!(
                    service = %service,
                    endpoint = %endpoint,
                    attempt,
                    wait_ms,
                    "rate limit window refused request"
                );
                if attempt > max_retries {
                    return Err(LimiterError::RetriesExhausted {
                        service: service.to_string(),
                        endpoint: endpoint.to_string(),
                        attempts: attempt,
                        last: ApiError::new("rate limit window exhausted"),
                    });
                }
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                continue;
            }

            match op().await {
                Ok(value) => {
                    self.clear_backoff(service, endpoint).await;
                    return Ok(value);
                }
                Err(err) => {
                    let class = classify(&err);
                    if class == ErrorClass::Terminal {
                        return Err(LimiterError::Api(err));
                    }
                    if attempt > max_retries {
                        return Err(LimiterError::RetriesExhausted {
                            service: service.to_string(),
                            endpoint: endpoint.to_string(),
                            attempts: attempt,
                            last: err,
                        });
                    }

                    let delay_ms = match class {
                        ErrorClass::RateLimited => {
                            let delay = err
                                .retry_after_ms
                                .unwrap_or_else(|| delay_for_attempt(&cfg, attempt));
                            self.set_backoff(service, endpoint, delay).await;
                            delay
                        }
                        _ => delay_for_attempt(&cfg, attempt),
                    };
                    warn!(
                        service = %service,
                        endpoint = %endpoint,
                        attempt,
                        delay_ms,
                        error = %err,
                        "api call failed — retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_backoff() -> Option<BackoffConfig> {
        Some(BackoffConfig {
            initial_ms: 1,
            multiplier: 2.0,
            max_ms: 4,
            jitter: false,
        })
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let limiter = RateLimiter::detached();
        let calls = Cell::new(0u32);
        let result = limiter
            .execute_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    async { Ok::<_, ApiError>(42) }
                },
                "weather",
                "current_weather",
                3,
                fast_backoff(),
            )
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let limiter = RateLimiter::detached();
        let calls = Cell::new(0u32);
        let result: Result<u32, _> = limiter
            .execute_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    async { Err(ApiError::with_status("ad set not found", 404)) }
                },
                "meta_ads",
                "adset_update",
                3,
                fast_backoff(),
            )
            .await;
        assert!(matches!(result, Err(LimiterError::Api(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retryable_error_retries_until_success() {
        let limiter = RateLimiter::detached();
        let calls = Cell::new(0u32);
        let result = limiter
            .execute_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n < 3 {
                            Err(ApiError::with_status("gateway timeout", 504))
                        } else {
                            Ok(n)
                        }
                    }
                },
                "weather",
                "current_weather",
                3,
                fast_backoff(),
            )
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn rate_limited_error_honors_server_retry_after() {
        let limiter = RateLimiter::detached();
        let calls = Cell::new(0u32);
        let result = limiter
            .execute_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move {
                        if n == 1 {
                            Err(ApiError::with_status("too many requests", 429).retry_after(2))
                        } else {
                            Ok("ok")
                        }
                    }
                },
                "weather",
                "current_weather",
                3,
                fast_backoff(),
            )
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn retries_exhausted_carries_last_cause() {
        let limiter = RateLimiter::detached();
        let calls = Cell::new(0u32);
        let result: Result<u32, _> = limiter
            .execute_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    async { Err(ApiError::with_status("connection reset", 502)) }
                },
                "google_ads",
                "campaign_update",
                2,
                fast_backoff(),
            )
            .await;
        match result {
            Err(LimiterError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3); // initial attempt + 2 retries
                assert!(last.message.contains("connection reset"));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other.err()),
        }
        assert_eq!(calls.get(), 3);
    }
}
