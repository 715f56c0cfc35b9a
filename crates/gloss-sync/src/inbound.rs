//! # Pull and Merge
//!
//! Pages through the remote change log from the stored cursor and merges
//! each change into the local store.
//!
//! ## Conflict Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Last Writer Wins, per row                            │
//! │                                                                         │
//! │  NO PENDING LOCAL WRITES                                               │
//! │  if remote.revision > local.revision:                                  │
//! │      apply (upsert or delete), local.revision = remote.revision        │
//! │  else:                                                                  │
//! │      skip (already have it; our own upload echoing back)               │
//! │                                                                         │
//! │  PENDING LOCAL WRITES                                                  │
//! │  if remote.updated_at > local stamp:                                   │
//! │      apply, mark the pending entries superseded (kept, never sent)     │
//! │  else:                                                                  │
//! │      keep local; it uploads on the next cycle                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A row deleted locally has no stamp column left to compare, so the
//! pending delete's outbox `created_at` stands in for it.
//!
//! A page, its merges and the advanced cursor commit in one transaction.
//! A change that cannot be applied (unknown table, broken reference) is
//! logged and skipped; the cursor still moves past it.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use gloss_db::mirror::{self, LocalRowState};
use gloss_db::repository::sync::PULL_CURSOR_KEY;
use gloss_db::{schema, DbError, LocalStore, OutboxOp, SyncOutboxRepository, WriteTx};

use crate::error::SyncResult;
use crate::remote::{RemoteChange, RemoteStore};

// =============================================================================
// Merge Decision
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Apply,
    /// Apply and retire the local pending entries.
    Supersede,
    /// Local has unsent writes that are newer.
    KeepLocal,
    /// Local already holds this revision or a later one.
    Stale,
}

/// Decides how one remote change meets the local row.
///
/// `pending_since` is when the row's newest unsent local write was
/// recorded.
pub fn decide(
    local: Option<&LocalRowState>,
    pending_since: Option<DateTime<Utc>>,
    remote_revision: i64,
    remote_stamp: Option<DateTime<Utc>>,
) -> Merge {
    match (local, pending_since) {
        (None, None) => Merge::Apply,
        // Locally deleted, delete not uploaded yet.
        (None, Some(deleted_at)) => newer_wins(remote_stamp, Some(deleted_at)),
        (Some(row), None) => {
            if remote_revision > row.revision {
                Merge::Apply
            } else {
                Merge::Stale
            }
        }
        (Some(row), Some(_)) => newer_wins(remote_stamp, row.stamp),
    }
}

fn newer_wins(remote: Option<DateTime<Utc>>, local: Option<DateTime<Utc>>) -> Merge {
    match (remote, local) {
        (Some(remote), Some(local)) if remote > local => Merge::Supersede,
        _ => Merge::KeepLocal,
    }
}

// =============================================================================
// Pull
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub applied: u64,
    pub superseded: u64,
    pub kept_local: u64,
    pub stale: u64,
    pub skipped: u64,
    pub cursor: i64,
}

/// Pulls every change after the stored cursor.
pub async fn pull_changes<R: RemoteStore>(
    store: &LocalStore,
    remote: &R,
    page_size: u32,
) -> SyncResult<PullReport> {
    let mut report = PullReport {
        cursor: store.outbox().pull_cursor().await?,
        ..Default::default()
    };

    loop {
        let page = remote.pull(report.cursor, page_size).await?;
        if page.changes.is_empty() {
            break;
        }
        debug!(changes = page.changes.len(), since = report.cursor, "Merging remote page");

        let mut tx = store.begin_remote().await?;
        for change in &page.changes {
            match merge_change(&mut tx, change).await {
                Ok(Merge::Apply) => report.applied += 1,
                Ok(Merge::Supersede) => {
                    report.applied += 1;
                    report.superseded += 1;
                }
                Ok(Merge::KeepLocal) => report.kept_local += 1,
                Ok(Merge::Stale) => report.stale += 1,
                Err(e) => {
                    warn!(
                        table = %change.table,
                        row_id = %change.row_id,
                        cursor = change.cursor,
                        error = %e,
                        "Skipping remote change"
                    );
                    report.skipped += 1;
                }
            }
        }
        SyncOutboxRepository::set_state_in(&mut tx, PULL_CURSOR_KEY, &page.cursor.to_string())
            .await?;
        tx.commit().await?;

        report.cursor = page.cursor;
        if !page.has_more {
            break;
        }
    }

    if report.applied > 0 || report.skipped > 0 {
        info!(
            applied = report.applied,
            superseded = report.superseded,
            kept_local = report.kept_local,
            skipped = report.skipped,
            cursor = report.cursor,
            "Remote changes merged"
        );
    }
    Ok(report)
}

async fn merge_change(tx: &mut WriteTx, change: &RemoteChange) -> Result<Merge, DbError> {
    let spec = schema::table(&change.table)
        .ok_or_else(|| DbError::UnknownTable(change.table.clone()))?;

    let local = mirror::row_state(tx.conn(), spec, &change.row_id).await?;
    let pending_since =
        SyncOutboxRepository::latest_pending_for_row(tx, spec.name, &change.row_id).await?;
    let merge = decide(local.as_ref(), pending_since, change.revision, change.updated_at);

    match merge {
        Merge::Apply | Merge::Supersede => {
            match (change.op, &change.data) {
                (OutboxOp::Upsert, Some(data)) => {
                    mirror::upsert(tx.conn(), spec, data, change.revision).await?;
                }
                (OutboxOp::Upsert, None) => {
                    return Err(DbError::decode(spec.pk, "remote upsert without data"));
                }
                (OutboxOp::Delete, _) => {
                    mirror::delete(tx.conn(), spec, &change.row_id).await?;
                }
            }
            if merge == Merge::Supersede {
                let retired =
                    SyncOutboxRepository::supersede_for_row(tx, spec.name, &change.row_id).await?;
                debug!(table = %spec.name, row_id = %change.row_id, retired, "Local writes superseded");
            }
            tx.touch(spec.name);
        }
        Merge::KeepLocal => {
            debug!(table = %spec.name, row_id = %change.row_id, "Local write kept");
        }
        Merge::Stale => {}
    }

    Ok(merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::upload_pending;
    use crate::remote::MemoryRemote;
    use chrono::Duration;
    use gloss_db::{CategoryInput, DbConfig, OutboxStatus};
    use serde_json::{json, Map, Value};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn category_row(id: &str, name: &str, stamp: DateTime<Utc>) -> Map<String, Value> {
        object(json!({
            "id": id,
            "name": name,
            "description": null,
            "created_at": stamp.to_rfc3339(),
            "updated_at": stamp.to_rfc3339()
        }))
    }

    fn state(revision: i64, stamp: Option<DateTime<Utc>>) -> LocalRowState {
        LocalRowState { revision, stamp }
    }

    #[test]
    fn test_decide_without_pending_follows_revision() {
        let local = state(3, None);
        assert_eq!(decide(Some(&local), None, 4, None), Merge::Apply);
        assert_eq!(decide(Some(&local), None, 3, None), Merge::Stale);
        assert_eq!(decide(None, None, 1, None), Merge::Apply);
    }

    #[test]
    fn test_decide_with_pending_follows_stamp() {
        let now = Utc::now();
        let local = state(3, Some(now));
        let pending = Some(now);
        assert_eq!(
            decide(Some(&local), pending, 9, Some(now + Duration::seconds(1))),
            Merge::Supersede
        );
        assert_eq!(decide(Some(&local), pending, 9, Some(now)), Merge::KeepLocal);
        assert_eq!(decide(Some(&local), pending, 9, None), Merge::KeepLocal);
    }

    #[test]
    fn test_decide_pending_delete_against_remote_stamp() {
        let deleted_at = Utc::now();
        let pending = Some(deleted_at);
        assert_eq!(
            decide(None, pending, 9, Some(deleted_at + Duration::seconds(1))),
            Merge::Supersede
        );
        assert_eq!(decide(None, pending, 9, Some(deleted_at)), Merge::KeepLocal);
        assert_eq!(
            decide(None, pending, 9, Some(deleted_at - Duration::seconds(1))),
            Merge::KeepLocal
        );
        assert_eq!(decide(None, pending, 9, None), Merge::KeepLocal);
    }

    #[tokio::test]
    async fn test_pull_applies_remote_rows_and_advances_cursor() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let stamp = Utc::now();
        remote.write_row("categories", category_row("c1", "Wash", stamp)).unwrap();
        remote.write_row("categories", category_row("c2", "Wax", stamp)).unwrap();

        let report = pull_changes(&store, &remote, 1).await.unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.cursor, 2);
        assert_eq!(store.outbox().pull_cursor().await.unwrap(), 2);
        assert_eq!(store.categories().list().await.unwrap().len(), 2);
        // Remote rows never come back as local writes.
        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);

        let again = pull_changes(&store, &remote, 10).await.unwrap();
        assert_eq!(again.applied, 0);
    }

    #[tokio::test]
    async fn test_own_upload_echo_is_stale() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        store
            .categories()
            .create(CategoryInput {
                name: "Wash".to_string(),
                description: None,
            })
            .await
            .unwrap();

        upload_pending(&store, &remote, "register-1", 10).await.unwrap();
        let report = pull_changes(&store, &remote, 10).await.unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(report.applied, 0);
    }

    #[tokio::test]
    async fn test_newer_remote_write_supersedes_pending_local_write() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let local = store
            .categories()
            .create(CategoryInput {
                name: "Wash".to_string(),
                description: None,
            })
            .await
            .unwrap();

        let later = local.updated_at + Duration::seconds(5);
        remote
            .write_row("categories", category_row(&local.id, "Premium Wash", later))
            .unwrap();

        let report = pull_changes(&store, &remote, 10).await.unwrap();
        assert_eq!(report.superseded, 1);

        let merged = store.categories().get(&local.id).await.unwrap().unwrap();
        assert_eq!(merged.name, "Premium Wash");
        let history = store.outbox().history("categories", &local.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OutboxStatus::Superseded);
    }

    #[tokio::test]
    async fn test_older_remote_write_loses_to_pending_local_write() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let local = store
            .categories()
            .create(CategoryInput {
                name: "Wash".to_string(),
                description: None,
            })
            .await
            .unwrap();

        let earlier = local.updated_at - Duration::seconds(5);
        remote
            .write_row("categories", category_row(&local.id, "Old Name", earlier))
            .unwrap();

        let report = pull_changes(&store, &remote, 10).await.unwrap();
        assert_eq!(report.kept_local, 1);

        let kept = store.categories().get(&local.id).await.unwrap().unwrap();
        assert_eq!(kept.name, "Wash");
        assert_eq!(store.outbox().count_pending().await.unwrap(), 1);

        // The local write then reaches the remote and wins there too.
        upload_pending(&store, &remote, "register-1", 10).await.unwrap();
        assert_eq!(remote.row("categories", &local.id).unwrap().data["name"], "Wash");
    }

    #[tokio::test]
    async fn test_newer_remote_update_revives_pending_local_delete() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let local = store
            .categories()
            .create(CategoryInput {
                name: "Wash".to_string(),
                description: None,
            })
            .await
            .unwrap();
        store.categories().delete(&local.id).await.unwrap();

        let later = Utc::now() + Duration::seconds(5);
        remote
            .write_row("categories", category_row(&local.id, "Premium Wash", later))
            .unwrap();

        let report = pull_changes(&store, &remote, 10).await.unwrap();
        assert_eq!(report.superseded, 1);

        let revived = store.categories().get(&local.id).await.unwrap().unwrap();
        assert_eq!(revived.name, "Premium Wash");
        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);
        let history = store.outbox().history("categories", &local.id).await.unwrap();
        assert!(history.iter().all(|e| e.status == OutboxStatus::Superseded));
    }

    #[tokio::test]
    async fn test_older_remote_update_loses_to_pending_local_delete() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let local = store
            .categories()
            .create(CategoryInput {
                name: "Wash".to_string(),
                description: None,
            })
            .await
            .unwrap();

        let earlier = local.updated_at - Duration::seconds(5);
        remote
            .write_row("categories", category_row(&local.id, "Old Name", earlier))
            .unwrap();
        store.categories().delete(&local.id).await.unwrap();

        let report = pull_changes(&store, &remote, 10).await.unwrap();
        assert_eq!(report.kept_local, 1);
        assert!(store.categories().get(&local.id).await.unwrap().is_none());
        assert_eq!(store.outbox().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bad_change_is_skipped_and_cursor_moves_on() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        let stamp = Utc::now().to_rfc3339();

        // Vehicle whose customer does not exist.
        remote
            .write_row(
                "customer_vehicles",
                object(json!({
                    "id": "v1",
                    "customer_id": "missing",
                    "plate": "XYZ 999",
                    "created_at": stamp,
                    "updated_at": stamp
                })),
            )
            .unwrap();
        remote.write_row("categories", category_row("c1", "Wash", Utc::now())).unwrap();

        let report = pull_changes(&store, &remote, 10).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.cursor, 2);
        assert!(store.categories().get("c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remote_delete_removes_row() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemote::new();
        remote.write_row("categories", category_row("c1", "Wash", Utc::now())).unwrap();
        pull_changes(&store, &remote, 10).await.unwrap();

        remote.delete_row("categories", "c1");
        let report = pull_changes(&store, &remote, 10).await.unwrap();

        assert_eq!(report.applied, 1);
        assert!(store.categories().get("c1").await.unwrap().is_none());
    }
}
