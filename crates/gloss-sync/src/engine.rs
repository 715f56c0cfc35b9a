//! # Sync Engine
//!
//! Runs upload and pull cycles against a [`RemoteStore`] and publishes the
//! result as an observable [`SyncStatus`].
//!
//! ## Engine Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine::spawn                                │
//! │                                                                         │
//! │   interval.tick() (auto mode) ──┐                                       │
//! │   handle.trigger() (Notify) ────┼──▶ sync_once()                        │
//! │                                 │       │                               │
//! │   handle.shutdown() (mpsc) ──▶ exit     ├── upload_pending (FIFO)       │
//! │                                         ├── pull_changes   (LWW merge)  │
//! │                                         │                               │
//! │                                   ok ◀──┴──▶ error                      │
//! │                                   │            │                        │
//! │                            backoff.reset()   wait next_backoff()        │
//! │                                                 (or trigger) and retry  │
//! │                                                                         │
//! │  Status (tokio::sync::watch):                                          │
//! │  connected · syncing · uploading · downloading · last_synced_at ·      │
//! │  pending_count · last_error                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use gloss_db::mirror::parse_stamp;
use gloss_db::repository::sync::LAST_SYNCED_KEY;
use gloss_db::LocalStore;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::inbound::{pull_changes, PullReport};
use crate::outbox::{upload_pending, UploadReport};
use crate::remote::RemoteStore;

// =============================================================================
// Sync Status
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// The last contact with the remote succeeded.
    pub connected: bool,
    pub syncing: bool,
    pub uploading: bool,
    pub downloading: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_count: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upload: UploadReport,
    pub pull: PullReport,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync events for the shell (notifications, status bar).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    fn emit_progress(&self, uploaded: u64, pending: i64);

    fn emit_error(&self, message: &str, retryable: bool);
}

pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _uploaded: u64, _pending: i64) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Engine
// =============================================================================

pub struct SyncEngine<R> {
    store: LocalStore,
    remote: R,
    config: Arc<SyncConfig>,
    status: watch::Sender<SyncStatus>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(store: LocalStore, remote: R, config: SyncConfig) -> Self {
        Self::with_emitter(store, remote, config, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        store: LocalStore,
        remote: R,
        config: SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        SyncEngine {
            store,
            remote,
            config: Arc::new(config),
            status,
            emitter,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn update(&self, change: impl FnOnce(&mut SyncStatus)) {
        self.status.send_modify(change);
        let snapshot = self.status.borrow().clone();
        self.emitter.emit_status(&snapshot);
    }

    /// Reads the persisted last-sync stamp and the outbox size into the
    /// status.
    pub async fn restore_status(&self) -> SyncResult<()> {
        let outbox = self.store.outbox();
        let pending = outbox.count_pending().await?;
        let last = outbox
            .get_state(LAST_SYNCED_KEY)
            .await?
            .as_deref()
            .and_then(parse_stamp);

        self.update(|s| {
            s.pending_count = pending;
            s.last_synced_at = last;
        });
        Ok(())
    }

    /// Re-counts the outbox. Call after local writes to keep the badge
    /// current between cycles.
    pub async fn refresh_pending(&self) -> SyncResult<i64> {
        let pending = self.store.outbox().count_pending().await?;
        self.update(|s| s.pending_count = pending);
        Ok(pending)
    }

    /// Runs one upload and pull cycle.
    ///
    /// ## Errors
    /// - `SyncError::Disabled` in offline mode
    /// - the first upload or pull failure; the status carries it as
    ///   `last_error`
    pub async fn sync_once(&self) -> SyncResult<SyncReport> {
        if !self.config.mode().is_sync_enabled() {
            return Err(SyncError::Disabled);
        }

        self.update(|s| {
            s.syncing = true;
            s.uploading = true;
            s.downloading = false;
        });

        let result = self.cycle().await;
        let pending = self.store.outbox().count_pending().await.ok();

        match &result {
            Ok(report) => {
                let now = Utc::now();
                if let Err(e) = self
                    .store
                    .outbox()
                    .set_state(LAST_SYNCED_KEY, &now.to_rfc3339())
                    .await
                {
                    warn!(error = %e, "Failed to persist last sync time");
                }
                self.cleanup().await;

                debug!(
                    uploaded = report.upload.uploaded,
                    applied = report.pull.applied,
                    "Sync cycle complete"
                );
                self.update(|s| {
                    s.connected = true;
                    s.last_synced_at = Some(now);
                    s.last_error = None;
                });
            }
            Err(e) => {
                let message = e.to_string();
                let retryable = e.is_retryable();
                let offline = e.is_connectivity();
                warn!(error = %message, retryable, "Sync cycle failed");
                self.emitter.emit_error(&message, retryable);
                self.update(|s| {
                    if offline {
                        s.connected = false;
                    }
                    s.last_error = Some(message);
                });
            }
        }

        self.update(|s| {
            s.syncing = false;
            s.uploading = false;
            s.downloading = false;
            if let Some(pending) = pending {
                s.pending_count = pending;
            }
        });

        result
    }

    async fn cycle(&self) -> SyncResult<SyncReport> {
        let upload = upload_pending(
            &self.store,
            &self.remote,
            self.config.device_id(),
            self.config.sync.batch_size,
        )
        .await?;
        self.emitter.emit_progress(upload.uploaded, upload.remaining);

        self.update(|s| {
            s.connected = true;
            s.uploading = false;
            s.downloading = true;
            s.pending_count = upload.remaining;
        });

        let pull = pull_changes(&self.store, &self.remote, self.config.sync.pull_page_size).await?;
        Ok(SyncReport { upload, pull })
    }

    async fn cleanup(&self) {
        let days = self.config.sync.cleanup_after_days;
        if days == 0 {
            return;
        }
        if let Err(e) = self.store.outbox().cleanup_synced(days).await {
            warn!(error = %e, "Outbox cleanup failed");
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff(),
            max_interval: self.config.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    // =========================================================================
    // Background Task
    // =========================================================================

    /// Moves the engine onto a Tokio task.
    pub fn spawn(self) -> (SyncHandle, JoinHandle<()>) {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = SyncHandle {
            trigger: trigger.clone(),
            shutdown_tx,
            status: self.subscribe(),
        };

        let task = tokio::spawn(self.run(trigger, shutdown_rx));
        (handle, task)
    }

    async fn run(self, trigger: Arc<Notify>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            device_id = %self.config.device_id(),
            mode = %self.config.mode(),
            "Sync engine starting"
        );

        if let Err(e) = self.restore_status().await {
            warn!(error = %e, "Could not restore sync status");
        }

        let polls = self.config.mode().polls();
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = self.create_backoff();

        'outer: loop {
            tokio::select! {
                _ = interval.tick(), if polls => {}
                _ = trigger.notified() => {
                    debug!("Sync triggered");
                }
                _ = shutdown_rx.recv() => break,
            }

            loop {
                match self.sync_once().await {
                    Ok(_) => {
                        backoff.reset();
                        break;
                    }
                    Err(SyncError::Disabled) => {
                        debug!("Sync disabled, trigger ignored");
                        break;
                    }
                    Err(e) => {
                        let Some(delay) = backoff.next_backoff() else {
                            error!(error = %e, "Backoff exhausted");
                            break;
                        };
                        debug!(?delay, "Retrying sync after backoff");

                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = trigger.notified() => {
                                debug!("Sync triggered during backoff");
                            }
                            _ = shutdown_rx.recv() => break 'outer,
                        }
                    }
                }
            }
        }

        self.update(|s| {
            s.syncing = false;
            s.uploading = false;
            s.downloading = false;
        });
        info!("Sync engine stopped");
    }
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Controls a spawned engine.
#[derive(Clone)]
pub struct SyncHandle {
    trigger: Arc<Notify>,
    shutdown_tx: mpsc::Sender<()>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Requests a cycle now. Coalesces with a request already waiting.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Sync engine already stopped".into()))
    }
}
