//! Durable store: rules, execution audit rows, platform credentials, and
//! the worker registry, all over PostgreSQL.
//!
//! The engine consumes this crate through the three ports defined here
//! ([`RuleRepository`], [`CredentialsLookup`], [`WorkerRegistry`]); tests
//! substitute in-memory fakes.

mod credentials;
mod db;
mod executions;
mod rules;
mod workers;

pub use credentials::{CredentialsLookup, PgCredentialsLookup, PlatformCredentials};
pub use db::{ensure_schema, init_pg_pool};
pub use rules::{PgRuleRepository, RuleRepository};
pub use workers::{PgWorkerRegistry, WorkerRegistry};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("row decode error: {0}")]
    Decode(String),
}
