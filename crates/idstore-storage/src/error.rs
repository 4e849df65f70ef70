//! Error types for the identity storage abstraction layer.
//!
//! This module defines all error types that can occur during storage
//! operations, regardless of backend.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required argument was missing or malformed. Raised before any
    /// I/O is attempted.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the precondition violation.
        message: String,
    },

    /// A mutation targeted a record that does not exist.
    ///
    /// Lookups never produce this error; they return an absent result.
    #[error("Not found: {kind}/{id}")]
    NotFound {
        /// The kind of record ("user", "role", ...).
        kind: String,
        /// The identifier that was not found.
        id: String,
    },

    /// Attempted to create a record that already exists.
    #[error("Already exists: {kind}/{id}")]
    AlreadyExists {
        /// The kind of record that already exists.
        kind: String,
        /// The identifier of the existing record.
        id: String,
    },

    /// An update carried a stale concurrency stamp: the record was
    /// modified since it was read. Retryable after re-reading.
    #[error("Concurrency conflict on {kind}/{id}")]
    ConcurrencyConflict {
        /// The kind of record in conflict.
        kind: String,
        /// The identifier of the record in conflict.
        id: String,
    },

    /// A persisted record is malformed (unexpected field, missing
    /// terminator, torn lookup file). Fatal for the read; never
    /// silently repaired.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of the format violation.
        message: String,
    },

    /// The backend is unavailable (connection failure after bounded
    /// retries, closed pool).
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// An internal backend error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `ConcurrencyConflict` error.
    #[must_use]
    pub fn concurrency_conflict(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a concurrency conflict.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is a precondition failure.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Returns `true` if this is a persisted-format error.
    #[must_use]
    pub fn is_invalid_record(&self) -> bool {
        matches!(self, Self::InvalidRecord { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } | Self::ConcurrencyConflict { .. } => ErrorCategory::Conflict,
            Self::InvalidRecord { .. } => ErrorCategory::Format,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<idstore_core::IdError> for StorageError {
    fn from(err: idstore_core::IdError) -> Self {
        Self::invalid_input(err.to_string())
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Conflict (existence or stale stamp).
    Conflict,
    /// Precondition violation.
    Validation,
    /// Malformed persisted data.
    Format,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Format => write!(f, "format"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("user", "u1");
        assert_eq!(err.to_string(), "Not found: user/u1");

        let err = StorageError::concurrency_conflict("role", "r1");
        assert_eq!(err.to_string(), "Concurrency conflict on role/r1");

        let err = StorageError::already_exists("user", "u2");
        assert_eq!(err.to_string(), "Already exists: user/u2");
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("user", "u1");
        assert!(err.is_not_found());
        assert!(!err.is_concurrency_conflict());

        let err = StorageError::concurrency_conflict("user", "u1");
        assert!(err.is_concurrency_conflict());
        assert!(!err.is_not_found());

        let err = StorageError::invalid_record("unexpected field");
        assert!(err.is_invalid_record());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("user", "u1").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::concurrency_conflict("user", "u1").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::already_exists("user", "u1").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::invalid_input("empty id").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            StorageError::invalid_record("bad field").category(),
            ErrorCategory::Format
        );
    }

    #[test]
    fn test_id_error_maps_to_invalid_input() {
        let err: StorageError = idstore_core::id::validate_id("").unwrap_err().into();
        assert!(err.is_invalid_input());
    }
}
