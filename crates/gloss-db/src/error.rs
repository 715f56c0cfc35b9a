//! # Database Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)      CoreError (rule violation)             │
//! │       │                               │                                 │
//! │       └──────────────┬────────────────┘                                 │
//! │                      ▼                                                  │
//! │  DbError (this module) ← Adds context and categorization                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (apps/register) ← Shown to the operator as a notification     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error returned from inside a [`WriteTx`](crate::store::WriteTx) means
//! the transaction was dropped and rolled back.

use gloss_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// The local store has not been initialized yet.
    ///
    /// ## When This Occurs
    /// - A command runs before `LocalStore::initialize` finished
    /// - Initialization failed and the shell kept running
    ///
    /// Recoverable: callers report it and retry later.
    #[error("Local store is not ready")]
    NotReady,

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Recipe line referencing a product that does not exist
    /// - Vehicle for a deleted customer
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The row exists but is in a state that forbids the operation.
    ///
    /// ## When This Occurs
    /// - Parking over a ticket that is already PAID
    /// - Changing the status of a ticket that is not PENDING
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A business rule rejected the write before anything was stored.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Table is not part of the mirrored schema.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A stored column could not be decoded.
    #[error("Corrupt {column} value: {reason}")]
    Decode { column: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed (includes trigger aborts).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn decode(column: impl Into<String>, reason: impl ToString) -> Self {
        DbError::Decode {
            column: column.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors the operator can fix by retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::NotReady | DbError::PoolExhausted | DbError::ConnectionFailed(_)
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::ColumnDecode { index, source } => DbError::Decode {
                column: index,
                reason: source.to_string(),
            },

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<gloss_core::ValidationError> for DbError {
    fn from(err: gloss_core::ValidationError) -> Self {
        DbError::Core(CoreError::Validation(err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_wraps_through_core() {
        let err: DbError = gloss_core::ValidationError::Required {
            field: "reason".to_string(),
        }
        .into();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
        assert_eq!(err.to_string(), "Validation error: reason is required");
    }

    #[test]
    fn test_not_ready_is_transient() {
        assert!(DbError::NotReady.is_transient());
        assert!(!DbError::not_found("Product", "p-1").is_transient());
    }
}
