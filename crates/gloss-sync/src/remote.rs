//! # Remote Store
//!
//! The authoritative store the device replicates with. Transport is not
//! this crate's concern: anything that can accept one change and page
//! through the change log implements [`RemoteStore`].
//!
//! ```text
//!   device A                        remote                     device B
//!   ────────                        ──────                     ────────
//!   upload(change) ───────────▶ revision = next()
//!                                append to log (cursor n)
//!   ◀─────────── UploadAck{revision}
//!                                              ◀─────────── pull(since, limit)
//!                                log[since..] ─────────────▶ merge (LWW)
//! ```
//!
//! [`MemoryRemote`] keeps everything in process. Tests and the demo shell
//! use it; it can be switched offline to exercise reconnect paths.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use gloss_db::mirror::parse_stamp;
use gloss_db::{schema, OutboxOp};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Wire Types
// =============================================================================

/// One local mutation on its way to the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundChange {
    /// Outbox entry id. Uploading the same id twice is a no-op remotely.
    pub id: String,
    pub device_id: String,
    pub table: String,
    pub row_id: String,
    pub op: OutboxOp,
    /// Full row for upserts.
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    /// Server revision assigned to the row.
    pub revision: i64,
}

/// One entry of the remote change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    /// Position in the remote log; pulls resume after it.
    pub cursor: i64,
    pub table: String,
    pub row_id: String,
    pub op: OutboxOp,
    pub data: Option<Map<String, Value>>,
    pub revision: i64,
    /// Time of the write that produced this change.
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullPage {
    pub changes: Vec<RemoteChange>,
    /// Cursor to pass to the next pull.
    pub cursor: i64,
    pub has_more: bool,
}

// =============================================================================
// Remote Store Trait
// =============================================================================

pub trait RemoteStore: Send + Sync + 'static {
    /// Applies one change remotely and returns the revision it received.
    fn upload(&self, change: OutboundChange) -> impl Future<Output = SyncResult<UploadAck>> + Send;

    /// Changes with a cursor greater than `since`, oldest first.
    fn pull(&self, since: i64, limit: u32) -> impl Future<Output = SyncResult<PullPage>> + Send;
}

impl<R: RemoteStore> RemoteStore for Arc<R> {
    fn upload(&self, change: OutboundChange) -> impl Future<Output = SyncResult<UploadAck>> + Send {
        (**self).upload(change)
    }

    fn pull(&self, since: i64, limit: u32) -> impl Future<Output = SyncResult<PullPage>> + Send {
        (**self).pull(since, limit)
    }
}

// =============================================================================
// In-Memory Remote
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRow {
    pub data: Map<String, Value>,
    pub revision: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    online: bool,
    next_revision: i64,
    rows: HashMap<(String, String), RemoteRow>,
    log: Vec<RemoteChange>,
    /// Outbox ids already applied, with the revision they got.
    received: HashMap<String, i64>,
    /// Tables whose uploads are refused.
    rejected_tables: HashSet<String>,
    uploads: u64,
}

/// Process-local remote. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        MemoryRemote {
            state: Arc::new(Mutex::new(MemoryState {
                online: true,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
        debug!(online, "Memory remote connectivity changed");
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Refuses every upload for `table` until cleared with `accept_table`.
    pub fn reject_table(&self, table: &str) {
        self.lock().rejected_tables.insert(table.to_string());
    }

    pub fn accept_table(&self, table: &str) {
        self.lock().rejected_tables.remove(table);
    }

    /// Number of uploads that were applied.
    pub fn upload_count(&self) -> u64 {
        self.lock().uploads
    }

    pub fn row(&self, table: &str, row_id: &str) -> Option<RemoteRow> {
        self.lock()
            .rows
            .get(&(table.to_string(), row_id.to_string()))
            .cloned()
    }

    pub fn log_len(&self) -> usize {
        self.lock().log.len()
    }

    /// Simulates a write made by another device.
    pub fn write_row(&self, table: &str, data: Map<String, Value>) -> SyncResult<i64> {
        let row_id = row_id_of(table, &data)?;
        let mut state = self.lock();
        Ok(state.apply(table, &row_id, OutboxOp::Upsert, Some(data)))
    }

    /// Simulates a delete made by another device.
    pub fn delete_row(&self, table: &str, row_id: &str) -> i64 {
        self.lock().apply(table, row_id, OutboxOp::Delete, None)
    }
}

impl MemoryState {
    fn apply(
        &mut self,
        table: &str,
        row_id: &str,
        op: OutboxOp,
        data: Option<Map<String, Value>>,
    ) -> i64 {
        self.next_revision += 1;
        let revision = self.next_revision;
        let key = (table.to_string(), row_id.to_string());

        let updated_at = match (&data, schema::table(table)) {
            (Some(row), Some(spec)) => row
                .get(spec.stamp)
                .and_then(Value::as_str)
                .and_then(parse_stamp),
            _ => None,
        }
        .or_else(|| Some(Utc::now()));

        match (&op, &data) {
            (OutboxOp::Upsert, Some(row)) => {
                self.rows.insert(
                    key,
                    RemoteRow {
                        data: row.clone(),
                        revision,
                    },
                );
            }
            _ => {
                self.rows.remove(&key);
            }
        }

        let cursor = self.log.len() as i64 + 1;
        self.log.push(RemoteChange {
            cursor,
            table: table.to_string(),
            row_id: row_id.to_string(),
            op,
            data,
            revision,
            updated_at,
        });
        revision
    }
}

fn row_id_of(table: &str, data: &Map<String, Value>) -> SyncResult<String> {
    let pk = schema::table(table).map_or("id", |spec| spec.pk);
    data.get(pk)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SyncError::InvalidPayload(format!("{table} row without {pk}")))
}

impl RemoteStore for MemoryRemote {
    async fn upload(&self, change: OutboundChange) -> SyncResult<UploadAck> {
        let mut state = self.lock();
        if !state.online {
            return Err(SyncError::Unreachable("memory remote is offline".into()));
        }
        if state.rejected_tables.contains(&change.table) {
            return Err(SyncError::Rejected {
                table: change.table,
                row_id: change.row_id,
                reason: "table is read-only on the remote".into(),
            });
        }
        if let Some(revision) = state.received.get(&change.id) {
            return Ok(UploadAck {
                revision: *revision,
            });
        }
        if change.op == OutboxOp::Upsert && change.data.is_none() {
            return Err(SyncError::InvalidPayload(format!(
                "upsert of {}/{} without data",
                change.table, change.row_id
            )));
        }

        let revision = state.apply(&change.table, &change.row_id, change.op, change.data);
        state.received.insert(change.id, revision);
        state.uploads += 1;
        Ok(UploadAck { revision })
    }

    async fn pull(&self, since: i64, limit: u32) -> SyncResult<PullPage> {
        let state = self.lock();
        if !state.online {
            return Err(SyncError::Unreachable("memory remote is offline".into()));
        }

        let start = usize::try_from(since.max(0)).unwrap_or(usize::MAX);
        let limit = limit.max(1) as usize;
        let changes: Vec<RemoteChange> = state.log.iter().skip(start).take(limit).cloned().collect();
        let cursor = changes.last().map_or(since, |c| c.cursor);
        let has_more = (cursor as usize) < state.log.len();

        Ok(PullPage {
            changes,
            cursor,
            has_more,
        })
    }
}
