//! Job-level retry budgeting: pick a retry delay from the shape of the
//! error that killed the attempt.

/// Delay before re-running a failed job, based on the error text and how
/// many retries the job has already burned.
///
/// Rate-limit trouble backs off the hardest (up to 5 min), network
/// blips the least (up to 1 min), everything else in between (up to 2 min).
pub fn retry_delay_ms(error: &str, retry_count: u32) -> u64 {
    let msg = error.to_lowercase();
    let factor = 1u64 << retry_count.min(20);
    if msg.contains("rate limit") || msg.contains("429") {
        (60_000 * factor).min(300_000)
    } else if msg.contains("network") || msg.contains("timeout") {
        (5_000 * factor).min(60_000)
    } else {
        (10_000 * factor).min(120_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_ladder() {
        assert_eq!(retry_delay_ms("Rate limit exceeded", 0), 60_000);
        assert_eq!(retry_delay_ms("got 429 from upstream", 1), 120_000);
        assert_eq!(retry_delay_ms("rate limit", 2), 240_000);
        assert_eq!(retry_delay_ms("rate limit", 3), 300_000);
    }

    #[test]
    fn network_ladder() {
        assert_eq!(retry_delay_ms("network unreachable", 0), 5_000);
        assert_eq!(retry_delay_ms("request Timeout", 1), 10_000);
        assert_eq!(retry_delay_ms("timeout", 4), 60_000);
    }

    #[test]
    fn default_ladder() {
        assert_eq!(retry_delay_ms("database write failed", 0), 10_000);
        assert_eq!(retry_delay_ms("database write failed", 1), 20_000);
        assert_eq!(retry_delay_ms("database write failed", 5), 120_000);
    }

    #[test]
    fn huge_retry_count_does_not_overflow() {
        assert_eq!(retry_delay_ms("whatever", u32::MAX), 120_000);
    }
}
