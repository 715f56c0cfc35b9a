//! # Sync Outbox Repository
//!
//! The queue of local mutations waiting for the remote, plus the
//! `sync_state` key/value table holding the pull cursor.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  WriteTx::record_upsert / record_delete  (same tx as the mutation)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────┐   upload ok    ┌──────────┐   cleanup_synced(days)        │
//! │  │ pending  │ ─────────────▶ │  synced  │ ─────────────────▶ deleted    │
//! │  └──────────┘                └──────────┘                               │
//! │     │    ▲                                                              │
//! │     │    └── upload failed: attempts += 1, last_error = ?               │
//! │     │                                                                   │
//! │     └── newer remote change won ──▶ ┌────────────┐                      │
//! │                                     │ superseded │  (kept, never sent)  │
//! │                                     └────────────┘                      │
//! │                                                                         │
//! │  Replay order is `seq`, the AUTOINCREMENT key. Upload stops at the      │
//! │  first failure so later entries never overtake earlier ones.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bookkeeping writes go through [`LocalStore::begin_remote`] so they share
//! the write lock without producing outbox entries of their own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::mirror;
use crate::store::{table_spec, LocalStore, WriteTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxOp {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Synced,
    Superseded,
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OutboxEntry {
    pub seq: i64,
    pub id: String,
    pub table_name: String,
    pub row_id: String,
    pub op: OutboxOp,
    /// Full row as JSON for upserts; `None` for deletes.
    pub payload: Option<String>,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Key of the pull cursor in `sync_state`.
pub const PULL_CURSOR_KEY: &str = "pull_cursor";

/// Key of the last successful sync stamp in `sync_state`.
pub const LAST_SYNCED_KEY: &str = "last_synced_at";

#[derive(Debug, Clone)]
pub struct SyncOutboxRepository {
    store: LocalStore,
}

impl SyncOutboxRepository {
    pub fn new(store: LocalStore) -> Self {
        SyncOutboxRepository { store }
    }

    /// Oldest pending entries first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            "SELECT * FROM sync_outbox WHERE status = 'pending' ORDER BY seq ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(entries)
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox WHERE status = 'pending'")
                .fetch_one(self.store.pool()?)
                .await?;
        Ok(count)
    }

    /// Every entry recorded for one row, in replay order.
    pub async fn history(&self, table: &str, row_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            "SELECT * FROM sync_outbox WHERE table_name = ? AND row_id = ? ORDER BY seq ASC",
        )
        .bind(table)
        .bind(row_id)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(entries)
    }

    /// Marks the entry synced and stamps the server revision onto the row.
    ///
    /// The revision only ever moves forward, so acknowledging an old upsert
    /// after a newer pull does not regress the row.
    pub async fn acknowledge(&self, entry: &OutboxEntry, revision: i64) -> DbResult<()> {
        let spec = table_spec(&entry.table_name)?;

        let mut tx = self.store.begin_remote().await?;
        mark_synced_in(&mut tx, &entry.id).await?;
        if entry.op == OutboxOp::Upsert {
            mirror::set_revision(tx.conn(), spec, &entry.row_id, revision).await?;
        }
        tx.commit().await?;

        debug!(seq = entry.seq, table = %entry.table_name, revision, "Outbox entry acknowledged");
        Ok(())
    }

    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin_remote().await?;
        mark_synced_in(&mut tx, id).await?;
        tx.commit().await
    }

    /// Records a failed attempt. The entry stays pending.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let mut tx = self.store.begin_remote().await?;
        let result = sqlx::query(
            r#"
            UPDATE sync_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Outbox entry", id));
        }
        tx.commit().await?;

        warn!(id = %id, error = %error, "Outbox upload failed");
        Ok(())
    }

    /// Deletes synced entries older than `days_old`. Pending and superseded
    /// entries are never removed.
    pub async fn cleanup_synced(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let mut tx = self.store.begin_remote().await?;
        let result = sqlx::query(
            "DELETE FROM sync_outbox WHERE status = 'synced' AND synced_at < ?",
        )
        .bind(cutoff)
        .execute(tx.conn())
        .await?;
        tx.commit().await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(removed, days_old, "Synced outbox entries cleaned up");
        }
        Ok(removed)
    }

    /// When the row's newest unsent local write was recorded, or `None`
    /// when everything for the row has reached the remote.
    pub async fn latest_pending_for_row(
        tx: &mut WriteTx,
        table: &str,
        row_id: &str,
    ) -> DbResult<Option<DateTime<Utc>>> {
        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT created_at FROM sync_outbox
            WHERE table_name = ? AND row_id = ? AND status = 'pending'
            ORDER BY seq DESC LIMIT 1
            "#,
        )
        .bind(table)
        .bind(row_id)
        .fetch_optional(tx.conn())
        .await?;
        Ok(created_at)
    }

    /// Marks every pending entry of a row as overtaken by a remote change.
    pub async fn supersede_for_row(tx: &mut WriteTx, table: &str, row_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_outbox SET status = 'superseded', attempted_at = ?3
            WHERE table_name = ?1 AND row_id = ?2 AND status = 'pending'
            "#,
        )
        .bind(table)
        .bind(row_id)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_state(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(value)
    }

    pub async fn set_state(&self, key: &str, value: &str) -> DbResult<()> {
        let mut tx = self.store.begin_remote().await?;
        Self::set_state_in(&mut tx, key, value).await?;
        tx.commit().await
    }

    /// Writes a state key inside an open transaction, so a pulled batch and
    /// its cursor commit together.
    pub async fn set_state_in(tx: &mut WriteTx, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(tx.conn())
        .await?;
        Ok(())
    }

    /// Pull cursor; 0 before the first pull.
    pub async fn pull_cursor(&self) -> DbResult<i64> {
        let raw = self.get_state(PULL_CURSOR_KEY).await?;
        match raw {
            None => Ok(0),
            Some(raw) => raw
                .parse()
                .map_err(|e: std::num::ParseIntError| DbError::decode(PULL_CURSOR_KEY, e)),
        }
    }
}

async fn mark_synced_in(tx: &mut WriteTx, id: &str) -> DbResult<()> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        UPDATE sync_outbox SET status = 'synced', synced_at = ?2, attempted_at = ?2
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(tx.conn())
    .await?;
    if result.rows_affected() == 0 {
        debug!(id = %id, "Outbox entry was no longer pending");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::category::CategoryInput;

    async fn store_with_category() -> (LocalStore, String) {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let category = store
            .categories()
            .create(CategoryInput {
                name: "Wash".to_string(),
                description: None,
            })
            .await
            .unwrap();
        (store, category.id)
    }

    #[tokio::test]
    async fn test_acknowledge_marks_synced_and_stamps_revision() {
        let (store, id) = store_with_category().await;
        let pending = store.outbox().pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        store.outbox().acknowledge(&pending[0], 7).await.unwrap();

        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);
        let revision: i64 = sqlx::query_scalar("SELECT revision FROM categories WHERE id = ?")
            .bind(&id)
            .fetch_one(store.pool().unwrap())
            .await
            .unwrap();
        assert_eq!(revision, 7);

        // An older ack never moves the revision back.
        store.outbox().acknowledge(&pending[0], 3).await.unwrap();
        let revision: i64 = sqlx::query_scalar("SELECT revision FROM categories WHERE id = ?")
            .bind(&id)
            .fetch_one(store.pool().unwrap())
            .await
            .unwrap();
        assert_eq!(revision, 7);
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_entry_pending() {
        let (store, _) = store_with_category().await;
        let entry = store.outbox().pending(1).await.unwrap().remove(0);

        store.outbox().mark_failed(&entry.id, "connection refused").await.unwrap();
        store.outbox().mark_failed(&entry.id, "timeout").await.unwrap();

        let reloaded = store.outbox().pending(1).await.unwrap().remove(0);
        assert_eq!(reloaded.status, OutboxStatus::Pending);
        assert_eq!(reloaded.attempts, 2);
        assert_eq!(reloaded.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_supersede_keeps_entries() {
        let (store, id) = store_with_category().await;

        let mut tx = store.begin_remote().await.unwrap();
        assert!(SyncOutboxRepository::latest_pending_for_row(&mut tx, "categories", &id)
            .await
            .unwrap()
            .is_some());
        let marked = SyncOutboxRepository::supersede_for_row(&mut tx, "categories", &id)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(marked, 1);
        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);
        let history = store.outbox().history("categories", &id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OutboxStatus::Superseded);
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_old_synced_entries() {
        let (store, id) = store_with_category().await;
        let entry = store.outbox().pending(1).await.unwrap().remove(0);
        store.outbox().mark_synced(&entry.id).await.unwrap();

        let old = Utc::now() - Duration::days(30);
        sqlx::query("UPDATE sync_outbox SET synced_at = ? WHERE id = ?")
            .bind(old)
            .bind(&entry.id)
            .execute(store.pool().unwrap())
            .await
            .unwrap();

        store
            .categories()
            .update(
                &id,
                CategoryInput {
                    name: "Wash & Wax".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();

        let removed = store.outbox().cleanup_synced(7).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pull_cursor_defaults_to_zero() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        assert_eq!(store.outbox().pull_cursor().await.unwrap(), 0);

        store.outbox().set_state(PULL_CURSOR_KEY, "42").await.unwrap();
        assert_eq!(store.outbox().pull_cursor().await.unwrap(), 42);
    }
}
