//! Mapping of sqlx errors into the storage error taxonomy.

use idstore_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// Maps a sqlx error into a [`StorageError`].
///
/// Pool and transport failures become `Connection`; everything else is
/// `Internal`. Constraint violations are handled at the call sites that
/// can name the record involved.
pub(crate) fn map_sqlx_error(err: SqlxError) -> StorageError {
    match err {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::WorkerCrashed => {
            StorageError::connection(err.to_string())
        }
        SqlxError::Io(e) => StorageError::connection(e.to_string()),
        SqlxError::Tls(e) => StorageError::connection(e.to_string()),
        other => StorageError::internal(other.to_string()),
    }
}

/// Returns `true` if the error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &SqlxError) -> bool {
    matches!(err, SqlxError::Database(db_err) if db_err.is_unique_violation())
}

/// Returns `true` if the error is a foreign-key violation.
pub(crate) fn is_foreign_key_violation(err: &SqlxError) -> bool {
    matches!(err, SqlxError::Database(db_err) if db_err.is_foreign_key_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_connection() {
        let err = map_sqlx_error(SqlxError::PoolClosed);
        assert!(matches!(err, StorageError::Connection { .. }));

        let err = map_sqlx_error(SqlxError::PoolTimedOut);
        assert!(matches!(err, StorageError::Connection { .. }));
    }

    #[test]
    fn test_other_errors_map_to_internal() {
        let err = map_sqlx_error(SqlxError::RowNotFound);
        assert!(matches!(err, StorageError::Internal { .. }));
    }
}
