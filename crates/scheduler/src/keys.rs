//! Coordination keyspace layout.

/// Sorted set of due times: score = `scheduled_at` ms, value = job id.
pub const SCHEDULED_SET: &str = "jobs:scheduled";

/// Unordered set of job ids currently claimed by some worker.
pub const PROCESSING_SET: &str = "jobs:processing";

/// Result ledger TTL: one day.
pub const RESULT_TTL_SECS: i64 = 86_400;

pub fn job_key(id: &str) -> String {
    format!("job:{id}")
}

pub fn result_key(id: &str) -> String {
    format!("jobs:results:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(job_key("rule_check_r1"), "job:rule_check_r1");
        assert_eq!(result_key("rule_check_r1"), "jobs:results:rule_check_r1");
    }
}
