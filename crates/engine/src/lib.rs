//! The automation engine: drains ready jobs from the scheduler, runs the
//! fetch → evaluate → act pipeline for each rule, records executions, and
//! keeps the worker registry fresh.
//!
//! [`RulePipeline`] is the pure-ish heart (ports in, execution record
//! out); [`AutomationEngine`] wraps it with the worker loops and the
//! scheduler/registry plumbing.

pub mod actions;
pub mod engine;
pub mod evaluate;
pub mod pipeline;
pub mod retry;
pub mod runtime;

pub use engine::{AutomationEngine, EngineStats};
pub use pipeline::RulePipeline;

use thiserror::Error;

use vane_limiter::LimiterError;
use vane_scheduler::SchedulerError;
use vane_store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("external call failed: {0}")]
    Limiter(#[from] LimiterError),

    #[error("{0}")]
    Core(#[from] vane_core::CoreError),
}

impl EngineError {
    /// Rule-missing terminates the job; everything else retries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineError::RuleNotFound(_))
    }
}
