//! Unified error type for all observers.

use thiserror::Error;

/// Error type shared by the observer implementations.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Error from the JSON observer.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collecting the families to observe failed.
    #[error("collection error: {0}")]
    Collect(#[from] crate::error::Error),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;
