//! Persistent time-ordered job queue over the shared coordination store.
//!
//! Three coordination objects per the key layout in [`keys`]:
//! a scheduled sorted set (score = due time in epoch ms), a processing set
//! of claimed job ids, and one hash per job holding the serialized record.
//! The atomic move from scheduled to processing ([`JobScheduler::claim`])
//! is the single linearization point that gives every rule at most one
//! in-flight execution across the whole worker fleet.

mod keys;
mod queue;

pub use queue::{ClaimOutcome, CompletionDisposition, JobScheduler, SchedulerStats};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("coordination store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("job serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    JobNotFound(String),
}
