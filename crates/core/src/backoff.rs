//! Clock and jittered exponential backoff primitives.

use chrono::Utc;

/// Current wall-clock time as epoch milliseconds.
///
/// Coordination-store scores and job timestamps all use this unit.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub multiplier: f64,
    pub max_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            multiplier: 2.0,
            max_ms: 300_000,
            jitter: true,
        }
    }
}

/// Delay before the given attempt (1-based).
///
/// `initial × multiplier^(attempt−1)`, capped at `max_ms`. With jitter on,
/// the capped delay is scaled by a uniform sample in [0.5, 1.0).
pub fn delay_for_attempt(cfg: &BackoffConfig, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(63);
    let raw = cfg.initial_ms as f64 * cfg.multiplier.powi(exponent as i32);
    let capped = raw.min(cfg.max_ms as f64);
    if cfg.jitter {
        let factor = 0.5 + rand::random::<f64>() * 0.5;
        (capped * factor) as u64
    } else {
        capped as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            jitter: false,
            ..BackoffConfig::default()
        }
    }

    #[test]
    fn delays_double_per_attempt() {
        let cfg = no_jitter();
        assert_eq!(delay_for_attempt(&cfg, 1), 1_000);
        assert_eq!(delay_for_attempt(&cfg, 2), 2_000);
        assert_eq!(delay_for_attempt(&cfg, 3), 4_000);
        assert_eq!(delay_for_attempt(&cfg, 4), 8_000);
    }

    #[test]
    fn delay_caps_at_max() {
        let cfg = no_jitter();
        // 2^20 seconds would be far past the 5 minute cap.
        assert_eq!(delay_for_attempt(&cfg, 21), 300_000);
        assert_eq!(delay_for_attempt(&cfg, 63), 300_000);
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let cfg = BackoffConfig::default();
        for _ in 0..100 {
            let d = delay_for_attempt(&cfg, 3); // 4000ms before jitter
            assert!((2_000..4_000).contains(&d), "jittered delay {} out of range", d);
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let cfg = no_jitter();
        assert_eq!(delay_for_attempt(&cfg, u32::MAX), 300_000);
    }
}
