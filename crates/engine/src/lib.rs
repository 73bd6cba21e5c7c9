pub mod alerts;
pub mod config;
pub mod metrics;
pub mod notify;
pub mod recurrence;
pub mod server;
pub mod store;
pub mod template;

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid task window: end {end} is before start {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Drops sub-second precision so equality and boundary checks are stable
/// at one-second resolution.
pub fn normalize_instant(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}
