//! # Gloss Register
//!
//! Application shell for one Gloss POS register: owns the local store, the
//! active cart, the sync engine handle and the notifier, and hosts the
//! commands the UI calls.
//!
//! ## Module Organization
//! ```text
//! gloss_register/
//! ├── lib.rs          ◄─── You are here (Shell, startup)
//! ├── main.rs         ◄─── Headless demo register
//! ├── error.rs        ◄─── ApiError / ErrorCode
//! ├── notify.rs       ◄─── Notification, Notifier
//! ├── state/
//! │   ├── register.rs ◄─── The active Cart
//! │   ├── config.rs   ◄─── Display configuration
//! │   ├── session.rs  ◄─── Signed-in actor
//! │   └── sync.rs     ◄─── Sync engine handle
//! └── commands/
//!     ├── cart.rs     ◄─── Cart composition
//!     ├── ticket.rs   ◄─── Park / resume / checkout / delete
//!     ├── catalog.rs  ◄─── Products, services, categories
//!     ├── inventory.rs◄─── Stock edits and the log
//!     ├── customer.rs ◄─── Customers and vehicles
//!     ├── staff.rs    ◄─── Employees, roles, commission
//!     ├── expense.rs  ◄─── Expenses
//!     ├── settings.rs ◄─── Store settings
//!     └── sync.rs     ◄─── Sync status and trigger
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. init_tracing()            RUST_LOG, default info,gloss=debug        │
//! │  2. database_path()           GLOSS_DB_PATH or the platform data dir    │
//! │  3. LocalStore::open()        WAL, migrations                           │
//! │  4. ConfigState::from_env()   stored settings + GLOSS_* overrides       │
//! │  5. Shell::new()              register, session, notifier               │
//! │  6. Shell::start_sync()       SyncConfig from sync.toml, engine task    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod notify;
pub mod state;

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gloss_core::{Actor, Settings};
use gloss_db::{DbConfig, DbError, LocalStore};
use gloss_sync::{RemoteStore, SyncConfig, SyncError};

use crate::notify::Notifier;
use crate::state::{ConfigState, RegisterState, SessionProvider, SyncState};

/// Errors that stop the register from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Could not determine the app data directory")]
    NoDataDir,

    #[error("Could not create {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// =============================================================================
// Shell
// =============================================================================

/// Everything a command can reach.
pub struct Shell {
    pub store: LocalStore,
    pub register: RegisterState,
    config: RwLock<ConfigState>,
    pub session: Arc<dyn SessionProvider>,
    pub notifier: Arc<dyn Notifier>,
    sync: Option<SyncState>,
}

impl Shell {
    pub fn new(
        store: LocalStore,
        config: ConfigState,
        session: Arc<dyn SessionProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Shell {
            store,
            register: RegisterState::new(),
            config: RwLock::new(config),
            session,
            notifier,
            sync: None,
        }
    }

    /// Spawns the sync engine against `remote`.
    ///
    /// ## Errors
    /// `SyncError` when the configuration does not validate.
    pub fn start_sync<R: RemoteStore>(&mut self, remote: R, config: SyncConfig) -> Result<(), SyncError> {
        config.validate()?;
        self.sync = Some(SyncState::start(
            self.store.clone(),
            remote,
            config,
            self.notifier.clone(),
        ));
        Ok(())
    }

    /// Snapshot of the display configuration.
    pub fn config(&self) -> ConfigState {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads store name and currency after the settings row changed.
    pub(crate) fn apply_settings(&self, settings: &Settings) {
        self.config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_settings(settings);
    }

    pub fn sync(&self) -> Option<&SyncState> {
        self.sync.as_ref()
    }

    pub fn actor(&self) -> Option<Actor> {
        self.session.current_user()
    }

    /// Called after every committed local write so the outbox drains
    /// promptly when the remote is reachable.
    pub fn local_write_committed(&self) {
        if let Some(sync) = &self.sync {
            sync.trigger();
        }
    }

    /// Stops background work and closes the store.
    pub async fn shutdown(&self) {
        if let Some(sync) = &self.sync {
            if let Err(e) = sync.shutdown().await {
                warn!(error = %e, "Sync engine did not stop cleanly");
            }
        }
        self.store.close().await;
        info!("Register shut down");
    }
}

// =============================================================================
// Startup Helpers
// =============================================================================

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` shows debug output from every crate
/// - `RUST_LOG=gloss_sync=trace` narrows to one crate
/// - Default: `info,gloss=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gloss=debug,sqlx=warn"));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Database file location.
///
/// `GLOSS_DB_PATH` wins; otherwise `gloss.db` in the platform data dir
/// (created when missing).
///
/// ## Errors
/// `StartupError::NoDataDir` or `StartupError::DataDir`.
pub fn database_path() -> Result<PathBuf, StartupError> {
    if let Ok(path) = std::env::var("GLOSS_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let dirs = ProjectDirs::from("com", "gloss", "pos").ok_or(StartupError::NoDataDir)?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|source| StartupError::DataDir {
        path: data_dir.to_path_buf(),
        source,
    })?;

    Ok(data_dir.join("gloss.db"))
}

/// Opens the store and builds a shell without sync.
///
/// ## Errors
/// `StartupError::Database` when the store cannot be opened or migrated.
pub async fn open_shell(
    db_config: DbConfig,
    session: Arc<dyn SessionProvider>,
    notifier: Arc<dyn Notifier>,
) -> Result<Shell, StartupError> {
    let store = LocalStore::open(db_config).await?;
    let settings = store.settings().get().await?;
    let config = ConfigState::from_env(Some(&settings));
    info!(store = %config.store_name, register = %config.register_name, "Register opened");
    Ok(Shell::new(store, config, session, notifier))
}

// =============================================================================
// Test Support
// =============================================================================
