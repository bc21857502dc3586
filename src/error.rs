//! Crate-wide error type.
//!
//! Every fallible operation in the registry, the metric handles and the
//! storage adapters returns [`Result`]. Adapter failures are never swallowed:
//! they travel unchanged from the backend to whoever called `inc`, `observe`
//! or `collect`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::metric::MetricKind;

/// Errors raised by the registry, metric handles and storage adapters.
#[derive(Debug, Error)]
pub enum Error {
    /// An identity was re-registered with incompatible label names,
    /// histogram boundaries or metric kind.
    #[error("metric `{name}` is already registered with {reason}")]
    IdentityConflict {
        /// Qualified metric name.
        name: String,
        /// What differs from the first registration.
        reason: String,
    },

    /// The number of label values (or label names on lookup) does not match
    /// the registered label set.
    #[error("metric `{name}` expects {expected} label(s), got {actual}")]
    ArityMismatch {
        /// Qualified metric name.
        name: String,
        /// Registered label count.
        expected: usize,
        /// Supplied label count.
        actual: usize,
    },

    /// Lookup of an identity that was never registered.
    #[error("{kind} `{name}` is not registered")]
    NotFound {
        /// Qualified metric name.
        name: String,
        /// Requested metric kind.
        kind: MetricKind,
    },

    /// Malformed registration or adapter configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An update carried a value the metric cannot accept.
    #[error("metric `{name}` cannot accept value {value}")]
    InvalidValue {
        /// Qualified metric name.
        name: String,
        /// The rejected value.
        value: f64,
    },

    /// The storage backend could not be opened or initialised, or is busy.
    ///
    /// Lock contention that outlasted the busy timeout lands here too; the
    /// caller may retry.
    #[error("storage backend unavailable: {message}")]
    BackendUnavailable {
        /// What could not be reached.
        message: String,
        /// The backend's own error.
        #[source]
        source: Option<BoxError>,
    },

    /// The storage backend failed while serving a request.
    #[error("storage backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
        /// The backend's own error.
        #[source]
        source: Option<BoxError>,
    },

    /// The backend could not discard its persisted state.
    #[error("failed to wipe storage at {}: {source}", path.display())]
    WipeFailed {
        /// The data file that could not be removed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared, type-erased backend error kept as the `source` of backend failures.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

impl Error {
    /// Creates a `BackendUnavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable { message: message.into(), source: None }
    }

    /// Creates a `BackendUnavailable` error with a message and source error.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::BackendUnavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a `Backend` error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), source: None }
    }

    /// Creates a `Backend` error with a message and source error.
    #[must_use]
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` for failures worth retrying, such as a busy database.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable { .. })
    }
}

/// Busy and locked databases are reported as unavailable, everything else as
/// a backend error. The `rusqlite` error stays reachable through `source()`.
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                Error::unavailable_with_source(message, err)
            }
            _ => Error::backend_with_source(message, err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::backend_with_source(format!("corrupt row encoding: {err}"), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_identity_conflict() {
        let err = Error::IdentityConflict {
            name: "test_some_metric".into(),
            reason: "label names [foo, bar]".into(),
        };
        assert_eq!(
            err.to_string(),
            "metric `test_some_metric` is already registered with label names [foo, bar]"
        );
    }

    #[test]
    fn test_display_arity_mismatch() {
        let err = Error::ArityMismatch {
            name: "requests".into(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "metric `requests` expects 2 label(s), got 1");
    }

    #[test]
    fn test_display_not_found() {
        let err = Error::NotFound {
            name: "requests".into(),
            kind: MetricKind::Gauge,
        };
        assert_eq!(err.to_string(), "gauge `requests` is not registered");
    }

    #[test]
    fn test_wipe_failed_keeps_source() {
        use std::error::Error as _;

        let err = Error::WipeFailed {
            path: PathBuf::from("/tmp/metrics.sqlite"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/tmp/metrics.sqlite"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_json_error_keeps_source() {
        use std::error::Error as _;

        let json_err = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err = Error::from(json_err);
        assert!(matches!(err, Error::Backend { .. }), "{err}");
        assert!(err.to_string().starts_with("storage backend error: corrupt row encoding"));
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<serde_json::Error>().is_some());
        assert!(!err.is_retryable());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_busy_is_retryable() {
        use std::error::Error as _;

        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        let err = Error::from(busy);
        assert!(matches!(err, Error::BackendUnavailable { .. }), "{err}");
        assert!(err.is_retryable());
        let source = err.source().and_then(|s| s.downcast_ref::<rusqlite::Error>());
        assert_eq!(
            source.and_then(|e| e.sqlite_error_code()),
            Some(rusqlite::ErrorCode::DatabaseBusy)
        );

        let other = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(other, Error::Backend { source: Some(_), .. }), "{other}");
        assert!(!other.is_retryable());
    }
}
