//! Error types for the coordination layer.

use thiserror::Error;

/// Result type alias for coordination-store operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors that can occur talking to the coordination store.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("blob decode error: {0}")]
    Decode(String),
}
