pub mod backoff;
pub mod config;
pub mod error;
pub mod execution;
pub mod job;
pub mod rule;
pub mod weather;
pub mod worker;

pub use config::Config;
pub use error::{ApiError, CoreError};
pub use execution::*;
pub use job::*;
pub use rule::*;
pub use weather::*;
pub use worker::*;
