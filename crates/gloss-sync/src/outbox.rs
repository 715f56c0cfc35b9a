//! # Outbox Upload
//!
//! Replays pending outbox entries to the remote in `seq` order.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Upload Round                                         │
//! │                                                                         │
//! │  pending(batch_size) ──▶ seq 41 ──▶ seq 42 ──▶ seq 43 ──▶ …             │
//! │                            │          │          │                      │
//! │                          upload     upload     upload                   │
//! │                            │          │          │                      │
//! │                           ack        ack       error ──▶ mark_failed    │
//! │                            │          │                   STOP          │
//! │                   acknowledge(rev) acknowledge(rev)                     │
//! │                                                                         │
//! │  seq 44+ stay pending and go first next cycle, so the remote never     │
//! │  sees a later write before an earlier one.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use gloss_db::{LocalStore, OutboxEntry, OutboxOp};

use crate::error::{SyncError, SyncResult};
use crate::remote::{OutboundChange, RemoteStore};

/// Outcome of one upload round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: u64,
    /// Entries still pending afterwards.
    pub remaining: i64,
}

/// Uploads pending entries until the outbox is empty or one fails.
///
/// ## Errors
/// The first upload error, after it has been recorded on its entry.
pub async fn upload_pending<R: RemoteStore>(
    store: &LocalStore,
    remote: &R,
    device_id: &str,
    batch_size: u32,
) -> SyncResult<UploadReport> {
    let outbox = store.outbox();
    let mut report = UploadReport::default();

    loop {
        let batch = outbox.pending(batch_size).await?;
        if batch.is_empty() {
            break;
        }
        debug!(entries = batch.len(), first_seq = batch[0].seq, "Uploading outbox batch");

        for entry in &batch {
            let result = match to_change(entry, device_id) {
                Ok(change) => remote.upload(change).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(ack) => {
                    outbox.acknowledge(entry, ack.revision).await?;
                    report.uploaded += 1;
                }
                Err(e) => {
                    warn!(seq = entry.seq, table = %entry.table_name, error = %e, "Upload stopped");
                    outbox.mark_failed(&entry.id, &e.to_string()).await?;
                    return Err(e);
                }
            }
        }
    }

    report.remaining = outbox.count_pending().await?;
    if report.uploaded > 0 {
        info!(uploaded = report.uploaded, remaining = report.remaining, "Outbox uploaded");
    }
    Ok(report)
}

fn to_change(entry: &OutboxEntry, device_id: &str) -> SyncResult<OutboundChange> {
    let data = match (entry.op, &entry.payload) {
        (OutboxOp::Upsert, Some(raw)) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Some(map),
            _ => {
                return Err(SyncError::InvalidPayload(format!(
                    "outbox entry {} is not a JSON object",
                    entry.id
                )))
            }
        },
        (OutboxOp::Upsert, None) => {
            return Err(SyncError::InvalidPayload(format!(
                "outbox entry {} has no payload",
                entry.id
            )))
        }
        (OutboxOp::Delete, _) => None::<Map<String, Value>>,
    };

    Ok(OutboundChange {
        id: entry.id.clone(),
        device_id: device_id.to_string(),
        table: entry.table_name.clone(),
        row_id: entry.row_id.clone(),
        op: entry.op,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use gloss_db::{CategoryInput, DbConfig, OutboxStatus};

    async fn store_with_categories(names: &[&str]) -> (LocalStore, Vec<String>) {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let mut ids = Vec::new();
        for name in names {
            let category = store
                .categories()
                .create(CategoryInput {
                    name: name.to_string(),
                    description: None,
                })
                .await
                .unwrap();
            ids.push(category.id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn test_upload_replays_in_order_and_acknowledges() {
        let (store, ids) = store_with_categories(&["Wash", "Wax", "Interior"]).await;
        let remote = MemoryRemote::new();

        let report = upload_pending(&store, &remote, "register-1", 2).await.unwrap();

        assert_eq!(report.uploaded, 3);
        assert_eq!(report.remaining, 0);
        let revisions: Vec<i64> = ids
            .iter()
            .map(|id| remote.row("categories", id).unwrap().revision)
            .collect();
        assert_eq!(revisions, vec![1, 2, 3]);

        let local: i64 = sqlx_revision(&store, &ids[2]).await;
        assert_eq!(local, 3);
    }

    #[tokio::test]
    async fn test_upload_stops_at_first_failure() {
        let (store, ids) = store_with_categories(&["Wash"]).await;
        store
            .expenses()
            .create(gloss_db::ExpenseInput {
                description: "Soap".to_string(),
                amount_cents: 1_000,
                category: None,
                expense_date: chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
                notes: None,
                expense_type: gloss_core::ExpenseType::Opex,
            })
            .await
            .unwrap();
        let later = store
            .categories()
            .create(CategoryInput {
                name: "Wax".to_string(),
                description: None,
            })
            .await
            .unwrap();

        let remote = MemoryRemote::new();
        remote.reject_table("expenses");

        let err = upload_pending(&store, &remote, "register-1", 10).await.unwrap_err();
        assert!(matches!(err, SyncError::Rejected { .. }));

        // The first category went through, the later one waits behind the failure.
        assert!(remote.row("categories", &ids[0]).is_some());
        assert!(remote.row("categories", &later.id).is_none());

        let pending = store.outbox().pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].table_name, "expenses");
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());

        remote.accept_table("expenses");
        let report = upload_pending(&store, &remote, "register-1", 10).await.unwrap();
        assert_eq!(report.uploaded, 2);
        assert!(remote.row("categories", &later.id).is_some());
    }

    #[tokio::test]
    async fn test_offline_remote_leaves_outbox_pending() {
        let (store, ids) = store_with_categories(&["Wash"]).await;
        let remote = MemoryRemote::new();
        remote.set_online(false);

        let err = upload_pending(&store, &remote, "register-1", 10).await.unwrap_err();
        assert!(err.is_connectivity());

        let history = store.outbox().history("categories", &ids[0]).await.unwrap();
        assert_eq!(history[0].status, OutboxStatus::Pending);
        assert_eq!(store.outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_uploads_without_payload() {
        let (store, ids) = store_with_categories(&["Wash"]).await;
        let remote = MemoryRemote::new();
        upload_pending(&store, &remote, "register-1", 10).await.unwrap();

        store.categories().delete(&ids[0]).await.unwrap();
        upload_pending(&store, &remote, "register-1", 10).await.unwrap();

        assert!(remote.row("categories", &ids[0]).is_none());
        assert_eq!(remote.log_len(), 2);
    }

    async fn sqlx_revision(store: &LocalStore, id: &str) -> i64 {
        let history = store.outbox().history("categories", id).await.unwrap();
        assert_eq!(history[0].status, OutboxStatus::Synced);
        let spec = gloss_db::schema::table("categories").unwrap();
        let mut tx = store.begin_remote().await.unwrap();
        let state = gloss_db::mirror::row_state(tx.conn(), spec, id)
            .await
            .unwrap()
            .unwrap();
        tx.rollback().await.unwrap();
        state.revision
    }
}
