//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Connectivity   │  │     Remote              │ │
//! │  │                 │  │  (retryable)    │  │                         │ │
//! │  │  InvalidConfig  │  │  Unreachable    │  │  Rejected               │ │
//! │  │  MissingDeviceId│  │  Timeout        │  │  InvalidPayload         │ │
//! │  │  InvalidUrl     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │     Local       │  │      Engine                                 │  │
//! │  │                 │  │                                             │  │
//! │  │  Database       │  │  Disabled, ShuttingDown, ChannelError       │  │
//! │  │  NotReady       │  │                                             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connectivity errors only ever change the sync status. Local reads and
//! writes carry on regardless.

use thiserror::Error;

use gloss_db::DbError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// The remote could not be reached.
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Remote timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote refused a change. Retrying the same payload will not help.
    #[error("Remote rejected {table}/{row_id}: {reason}")]
    Rejected {
        table: String,
        row_id: String,
        reason: String,
    },

    /// A payload could not be read or written as JSON.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(String),

    /// The local store has not been opened yet.
    #[error("Local store is not ready")]
    NotReady,

    // =========================================================================
    // Engine Errors
    // =========================================================================
    #[error("Sync is disabled (mode: offline)")]
    Disabled,

    #[error("Sync engine is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotReady => SyncError::NotReady,
            other => SyncError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// True when a later attempt may succeed without any change on our side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Unreachable(_) | SyncError::Timeout(_) | SyncError::NotReady
        )
    }

    /// True for failures that mean the remote cannot currently be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Unreachable(_) | SyncError::Timeout(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
