//! Error types for the cron subsystem.
//!
//! The taxonomy maps directly onto the REST layer's status codes:
//! `NotFound` -> 404, `Found` -> conflict, `InvalidInput` -> 400.

use thiserror::Error;

/// Result type alias for cron operations.
pub type CronResult<T> = Result<T, CronError>;

/// Errors surfaced by the cron scheduler and models.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job already exists: {0}")]
    Found(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job store error: {0}")]
    Store(String),
}
