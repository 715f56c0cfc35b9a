//! # API Error Type
//!
//! The single error shape every shell command returns.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Register                           │
//! │                                                                         │
//! │  command ──► repository / cart / engine                                 │
//! │                    │                                                    │
//! │      ┌─────────────┼──────────────────┬──────────────────┐              │
//! │      ▼             ▼                  ▼                  ▼              │
//! │  CoreError     DbError            SyncError          ApiError::*        │
//! │  (rules)       (storage)          (replication)      (shell checks)     │
//! │      │             │                  │                  │              │
//! │      └─────────────┴───────┬──────────┴──────────────────┘              │
//! │                            ▼                                            │
//! │              ApiError { code, message }                                 │
//! │                            │                                            │
//! │                            ▼                                            │
//! │              Notification (error) + tracing::warn!                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage internals never reach the operator: query and transaction
//! failures are logged in full and surfaced with a generic message.

use serde::Serialize;

use gloss_core::{CoreError, ValidationError};
use gloss_db::DbError;
use gloss_sync::SyncError;

/// Error returned from shell commands.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for Wax: available 1, requested 2" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable code for programmatic handling
    pub code: ErrorCode,

    /// Operator-facing message
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    /// Duplicate name, SKU or username
    AlreadyExists,
    /// The row changed state underneath the command (e.g. a PAID ticket)
    Conflict,
    /// The store is still opening
    NotReady,
    DatabaseError,
    CartError,
    InsufficientStock,
    /// A service line needs a variant picked
    VariantRequired,
    SyncError,
    /// The remote could not be reached; local work continues
    Offline,
    Internal,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{resource} not found: {id}"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    pub fn cart(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::CartError, message)
    }

    /// Whether the operator can simply try again later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.code, ErrorCode::NotReady | ErrorCode::Offline)
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotReady => ApiError::new(
                ErrorCode::NotReady,
                "The local database is still starting, try again in a moment",
            ),
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::AlreadyExists,
                format!("{field} '{value}' already exists"),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!(%message, "Foreign key violation");
                ApiError::validation("Invalid reference")
            }
            DbError::Conflict(message) => ApiError::new(ErrorCode::Conflict, message),
            DbError::Core(core) => ApiError::from(core),
            DbError::UnknownTable(table) => {
                tracing::error!(%table, "Unknown table");
                ApiError::internal("Unknown table")
            }
            DbError::Decode { column, reason } => {
                tracing::error!(%column, %reason, "Stored value could not be decoded");
                ApiError::new(ErrorCode::DatabaseError, "Stored data is corrupt")
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!(error = %e, "Database connection failed");
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!(error = %e, "Database migration failed");
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                tracing::error!(error = %e, "Database query failed");
                ApiError::new(ErrorCode::DatabaseError, "Could not save changes")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!(error = %e, "Transaction failed");
                ApiError::new(ErrorCode::DatabaseError, "Could not save changes")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "The database is busy, try again")
            }
            DbError::Internal(e) => {
                tracing::error!(error = %e, "Internal database error");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, message)
            }
            CoreError::VariantRequired { .. } => ApiError::new(ErrorCode::VariantRequired, message),
            CoreError::LineNotFound(id) => ApiError::not_found("Cart line", &id),
            CoreError::EmptyCart
            | CoreError::CrewNotAllowed(_)
            | CoreError::InvalidPhase { .. }
            | CoreError::CartTooLarge { .. } => ApiError::cart(message),
            CoreError::QuantityTooLarge { .. } => ApiError::validation(message),
            CoreError::Validation(e) => ApiError::from(e),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        if err.is_connectivity() {
            return ApiError::new(
                ErrorCode::Offline,
                format!("Working offline: {err}. Changes are kept and will upload later"),
            );
        }
        match err {
            SyncError::NotReady => ApiError::new(ErrorCode::NotReady, err.to_string()),
            SyncError::Disabled => ApiError::new(
                ErrorCode::SyncError,
                "Sync is turned off for this register",
            ),
            err if err.is_config_error() => ApiError::validation(err.to_string()),
            err => ApiError::new(ErrorCode::SyncError, err.to_string()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
