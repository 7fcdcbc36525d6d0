//! Error types for cell state queries.

use thiserror::Error;

/// Result type alias for state query operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors surfaced by the state query engine.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
