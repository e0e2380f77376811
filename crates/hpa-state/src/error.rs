//! Error types for the autoscaler store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A stored value could not be encoded or decoded.
    #[error("codec error for {key}: {message}")]
    Codec { key: String, message: String },

    #[error("autoscaler {0} not found")]
    NotFound(String),

    #[error("invalid key {0:?}: expected namespace/name")]
    InvalidKey(String),
}

impl From<StateError> for hpa_core::AutoscaleError {
    fn from(e: StateError) -> Self {
        hpa_core::AutoscaleError::State(e.to_string())
    }
}
