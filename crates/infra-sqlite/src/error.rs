// sqlx::Error -> AppError mapping
//
// Lives here because of the orphan rule: core cannot depend on sqlx and this
// crate cannot implement From<sqlx::Error> for AppError.

use queueup_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            match db_err.code().as_deref() {
                // SQLite result codes: https://www.sqlite.org/rescode.html
                Some("2067") | Some("1555") => {
                    AppError::Conflict(format!("Unique constraint violation: {}", message))
                }
                Some("787") => {
                    AppError::Conflict(format!("Foreign key constraint violation: {}", message))
                }
                Some("5") | Some("261") | Some("517") | Some("6") | Some("262") => {
                    AppError::TransientStore(format!("Database busy: {}", message))
                }
                Some("13") => AppError::TransientStore(format!("Database full: {}", message)),
                Some(code) => AppError::Internal(format!("Database error [{}]: {}", code, message)),
                None => AppError::Internal(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::WorkerCrashed => AppError::TransientStore(err.to_string()),
        sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Internal(format!("Column not found: {}", col))
        }
        _ => AppError::Internal(format!("Database error: {}", err)),
    }
}
