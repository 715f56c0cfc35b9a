//! # Sync State
//!
//! Holds the handle of the background sync engine and forwards its events
//! to the operator.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync State                                        │
//! │                                                                         │
//! │  SyncState::start(store, remote, config, notifier)                      │
//! │       │                                                                 │
//! │       ├──► SyncEngine::with_emitter(.., NotifyingEmitter) ──► spawn()   │
//! │       │                                                                 │
//! │       └──► keeps SyncHandle (trigger / status / shutdown)               │
//! │                                                                         │
//! │  NotifyingEmitter                                                       │
//! │    emit_error    ──► Notification (warning when retryable), once per    │
//! │                      distinct message until the next good cycle         │
//! │    emit_progress ──► Notification::info when something uploaded        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use gloss_db::LocalStore;
use gloss_sync::{
    RemoteStore, SyncConfig, SyncEngine, SyncError, SyncEventEmitter, SyncHandle, SyncResult,
    SyncStatus,
};

use crate::error::{ApiError, ErrorCode};
use crate::notify::{Notification, Notifier};

pub struct SyncState {
    handle: SyncHandle,
    task: Mutex<Option<JoinHandle<()>>>,
    config: SyncConfig,
}

impl SyncState {
    /// Starts the engine on a background task.
    pub fn start<R: RemoteStore>(
        store: LocalStore,
        remote: R,
        config: SyncConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let emitter = Arc::new(NotifyingEmitter::new(notifier));
        let engine = SyncEngine::with_emitter(store, remote, config.clone(), emitter);
        let (handle, task) = engine.spawn();
        info!(mode = %config.mode(), device_id = %config.device_id(), "Sync started");

        SyncState {
            handle,
            task: Mutex::new(Some(task)),
            config,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.handle.status()
    }

    pub fn handle(&self) -> &SyncHandle {
        &self.handle
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Asks for a cycle now.
    pub fn trigger(&self) {
        self.handle.trigger();
    }

    /// Stops the engine and waits for its task to finish.
    ///
    /// ## Errors
    /// `SyncError::ChannelError` when the engine already stopped or its
    /// task panicked.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.handle.shutdown().await?;
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.await
                .map_err(|e| SyncError::ChannelError(format!("sync task failed: {e}")))?;
        }
        debug!("Sync task joined");
        Ok(())
    }
}

// =============================================================================
// Event Bridge
// =============================================================================

struct NotifyingEmitter {
    notifier: Arc<dyn Notifier>,
    last_error: Mutex<Option<String>>,
}

impl NotifyingEmitter {
    fn new(notifier: Arc<dyn Notifier>) -> Self {
        NotifyingEmitter {
            notifier,
            last_error: Mutex::new(None),
        }
    }
}

impl SyncEventEmitter for NotifyingEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        if status.last_error.is_none() && status.connected {
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }

    fn emit_progress(&self, uploaded: u64, pending: i64) {
        if uploaded == 0 {
            return;
        }
        let message = if pending > 0 {
            format!("Uploaded {uploaded} changes, {pending} still waiting")
        } else {
            format!("Uploaded {uploaded} changes")
        };
        self.notifier.notify(Notification::info("Sync", message));
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(message) {
            return;
        }
        *last = Some(message.to_string());
        drop(last);

        let err = if retryable {
            ApiError::new(
                ErrorCode::Offline,
                format!("Working offline ({message}). Sales continue and sync resumes automatically"),
            )
        } else {
            ApiError::new(ErrorCode::SyncError, message)
        };
        self.notifier.notify(Notification::error("Sync", &err));
    }
}
