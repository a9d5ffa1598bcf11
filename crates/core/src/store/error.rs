//! Errors raised by storage backends.

use thiserror::Error;

/// Infrastructure errors surfaced by a store or unit of work.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness or state conflict detected by the store.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Waiting for a row lock took longer than the configured limit.
    #[error("Timed out waiting for a row lock")]
    LockTimeout,

    /// A unit tried to lock a row below one it already holds.
    #[error("Lock order violation: requested {requested} while holding {held}")]
    LockOrder {
        /// Highest lock already held.
        held: String,
        /// Lock that was requested.
        requested: String,
    },

    /// A unit wrote to a row it never locked.
    #[error("Row not locked by this unit: {0}")]
    NotLocked(String),

    /// Stored or configured settings could not be interpreted.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::LockOrder { .. } => "LOCK_ORDER_VIOLATION",
            Self::NotLocked(_) => "ROW_NOT_LOCKED",
            Self::InvalidSettings(_) => "INVALID_SETTINGS",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::LockTimeout => 503,
            Self::LockOrder { .. }
            | Self::NotLocked(_)
            | Self::InvalidSettings(_)
            | Self::Database(_) => 500,
        }
    }

    /// Returns true if the caller may retry the whole operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StoreError::LockTimeout.http_status_code(), 503);
        assert_eq!(StoreError::NotFound("x".into()).http_status_code(), 404);
        assert_eq!(StoreError::Database("x".into()).http_status_code(), 500);
        assert!(StoreError::LockTimeout.is_retryable());
        assert!(!StoreError::Conflict("x".into()).is_retryable());
    }
}
