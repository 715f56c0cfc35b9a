//! # Sync Commands
//!
//! Status for the connectivity indicator and a manual "sync now". Without
//! a running engine the register reports itself offline with whatever the
//! outbox holds.

use gloss_sync::SyncStatus;

use crate::commands::report;
use crate::error::{ApiError, ErrorCode};
use crate::Shell;

pub async fn sync_status(shell: &Shell) -> Result<SyncStatus, ApiError> {
    match shell.sync() {
        Some(sync) => Ok(sync.status()),
        None => Ok(SyncStatus {
            pending_count: shell.store.outbox().count_pending().await?,
            ..Default::default()
        }),
    }
}

/// Local changes not yet acknowledged by the remote.
pub async fn pending_changes(shell: &Shell) -> Result<i64, ApiError> {
    Ok(shell.store.outbox().count_pending().await?)
}

/// Requests a sync cycle now.
pub async fn trigger_sync(shell: &Shell) -> Result<SyncStatus, ApiError> {
    let result: Result<SyncStatus, ApiError> = match shell.sync() {
        Some(sync) if sync.config().mode().is_sync_enabled() => {
            sync.trigger();
            Ok(sync.status())
        }
        Some(_) => Err(gloss_sync::SyncError::Disabled.into()),
        None => Err(ApiError::new(
            ErrorCode::SyncError,
            "Sync is not configured on this register",
        )),
    };

    report(shell, "Sync", result, |s| {
        if s.pending_count > 0 {
            format!("Sync requested, {} changes waiting", s.pending_count)
        } else {
            "Sync requested".to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::notify::NotificationLevel;
    use crate::testing::fixture;
    use gloss_sync::{MemoryRemote, SyncConfig, SyncMode};

    fn manual_config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.device.id = "register-test".to_string();
        config.sync.mode = SyncMode::Manual;
        config.sync.batch_size = 500;
        config.sync.initial_backoff_ms = 10;
        config.sync.max_backoff_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_status_without_engine_reports_outbox() {
        let fx = fixture().await;
        let status = sync_status(&fx.shell).await.unwrap();

        assert!(!status.connected);
        assert!(status.pending_count > 0);
        assert_eq!(status.pending_count, pending_changes(&fx.shell).await.unwrap());

        let err = trigger_sync(&fx.shell).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SyncError);
    }

    #[tokio::test]
    async fn test_manual_trigger_drains_outbox() {
        let mut fx = fixture().await;
        let remote = MemoryRemote::new();
        fx.shell.start_sync(remote.clone(), manual_config()).unwrap();

        trigger_sync(&fx.shell).await.unwrap();
        let mut status = fx.shell.sync().unwrap().handle().subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.last_synced_at.is_some() && !s.syncing),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(pending_changes(&fx.shell).await.unwrap(), 0);
        assert!(remote.row("products", &fx.demo.wax_id).is_some());
        assert!(fx
            .notes
            .all()
            .iter()
            .any(|n| n.level == NotificationLevel::Info && n.message.starts_with("Uploaded")));

        fx.shell.shutdown().await;
    }

    #[tokio::test]
    async fn test_offline_remote_warns_once_and_keeps_selling() {
        let mut fx = fixture().await;
        let remote = MemoryRemote::new();
        remote.set_online(false);
        fx.shell.start_sync(remote.clone(), manual_config()).unwrap();

        trigger_sync(&fx.shell).await.unwrap();
        let mut status = fx.shell.sync().unwrap().handle().subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.last_error.is_some()),
        )
        .await
        .unwrap()
        .unwrap();

        crate::commands::cart::add_product(&fx.shell, &fx.demo.shampoo_id, None)
            .await
            .unwrap();
        crate::commands::ticket::checkout(&fx.shell, gloss_core::PaymentMethod::Cash)
            .await
            .unwrap();

        let warnings = fx
            .notes
            .all()
            .into_iter()
            .filter(|n| n.level == NotificationLevel::Warning)
            .count();
        assert_eq!(warnings, 1);
        assert!(!fx.shell.sync().unwrap().status().connected);

        fx.shell.shutdown().await;
    }
}
