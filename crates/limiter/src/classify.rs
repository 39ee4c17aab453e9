//! Failure classification for outbound API errors.

use vane_core::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The service told us to slow down; back off for the advertised (or
    /// computed) delay and persist the deadline.
    RateLimited,
    /// Transient network or server trouble; retry with exponential backoff.
    Retryable,
    /// Everything else; rethrow immediately.
    Terminal,
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "too many requests",
    "quota exceeded",
    "throttled",
];

const RETRYABLE_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "connection",
    "connection reset",
    "socket hang up",
];

const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

pub fn classify(err: &ApiError) -> ErrorClass {
    let message = err.message.to_lowercase();

    let status_rate_limited = matches!(err.status, Some(429) | Some(503));
    if status_rate_limited || RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
        return ErrorClass::RateLimited;
    }

    let status_retryable = err
        .status
        .map(|s| RETRYABLE_STATUSES.contains(&s))
        .unwrap_or(false);
    if status_retryable || RETRYABLE_MARKERS.iter().any(|m| message.contains(m)) {
        return ErrorClass::Retryable;
    }

    ErrorClass::Terminal
}
