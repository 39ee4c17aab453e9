//! Distributed rate limiting for outbound platform and weather calls.
//!
//! Two layers cooperate here:
//! - a per-service sliding window kept in the coordination store
//!   ([`RateLimiter::check`]), shared by every worker;
//! - a retrying call driver ([`RateLimiter::execute_with_backoff`]) that
//!   gates each attempt through the window, classifies failures, and
//!   persists a per-endpoint backoff deadline so sibling workers stop
//!   hammering an already-throttled endpoint.
//!
//! Coordination-store failures fail open: a limiter that cannot reach the
//! store allows the call and logs a warning.

mod classify;
mod config;
mod executor;
mod window;

pub use classify::{classify, ErrorClass};
pub use config::{limits_for, ServiceLimits, SERVICE_LIMITS};
pub use window::{RateLimitDecision, RateLimiter, ServiceUsage};

use thiserror::Error;

use vane_core::ApiError;

#[derive(Error, Debug)]
pub enum LimiterError {
    #[error("coordination store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("api call failed: {0}")]
    Api(ApiError),

    #[error("retries exhausted for {service}/{endpoint} after {attempts} attempts: {last}")]
    RetriesExhausted {
        service: String,
        endpoint: String,
        attempts: u32,
        last: ApiError,
    },
}
