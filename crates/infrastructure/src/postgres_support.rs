use std::str::FromStr;

use warden_core::AppError;

/// Maps a sqlx error to the application taxonomy.
///
/// Connectivity failures are transient; everything else is internal.
pub(crate) fn storage_error(action: &str, error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => {
            AppError::Unavailable(format!("database unavailable while trying to {action}: {error}"))
        }
        error => AppError::Internal(format!("failed to {action}: {error}")),
    }
}

/// Returns whether the error is a unique constraint violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return true;
    }
    false
}

/// Decodes a stored enum value; unknown values are data corruption.
pub(crate) fn decode_stored<T>(column: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr<Err = AppError>,
{
    T::from_str(value).map_err(|error| {
        AppError::Internal(format!("failed to decode {column} '{value}': {error}"))
    })
}
