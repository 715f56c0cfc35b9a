//! # Inventory Log Repository
//!
//! The append-only stock ledger. Rows are inserted inside the transaction
//! of the mutation they document and never change afterwards; SQLite
//! triggers reject UPDATE and DELETE on the content columns.

use chrono::Utc;
use tracing::debug;

use gloss_core::ledger::{summarize, LogFilter, LogSummary, NewLogEntry};
use gloss_core::{new_id, InventoryLogEntry};

use crate::error::DbResult;
use crate::store::{LocalStore, WriteTx};

#[derive(Debug, Clone)]
pub struct InventoryLogRepository {
    store: LocalStore,
}

impl InventoryLogRepository {
    pub fn new(store: LocalStore) -> Self {
        InventoryLogRepository { store }
    }

    /// Appends an entry inside the caller's transaction.
    pub async fn record_change(tx: &mut WriteTx, entry: NewLogEntry) -> DbResult<InventoryLogEntry> {
        let entry = entry.into_entry(new_id(), Utc::now());

        sqlx::query(
            r#"
            INSERT INTO inventory_logs (
                id, product_id, product_name, change_type,
                quantity_before, quantity_after, threshold_before, threshold_after,
                reason, notes, employee_id, employee_name, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(&entry.product_name)
        .bind(entry.change_type)
        .bind(entry.quantity_before)
        .bind(entry.quantity_after)
        .bind(entry.threshold_before)
        .bind(entry.threshold_after)
        .bind(&entry.reason)
        .bind(&entry.notes)
        .bind(&entry.employee_id)
        .bind(&entry.employee_name)
        .bind(entry.created_at)
        .execute(tx.conn())
        .await?;

        tx.record_upsert("inventory_logs", &entry.id).await?;

        debug!(
            product_id = %entry.product_id,
            change_type = entry.change_type.as_str(),
            "Inventory log appended"
        );
        Ok(entry)
    }

    /// Entries matching `filter`, newest first.
    pub async fn list(&self, filter: &LogFilter) -> DbResult<Vec<InventoryLogEntry>> {
        let rows = sqlx::query_as::<_, InventoryLogEntry>(
            r#"
            SELECT * FROM inventory_logs
            WHERE (?1 IS NULL OR product_id = ?1)
              AND (?2 IS NULL OR change_type = ?2)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(&filter.product_id)
        .bind(filter.change_type)
        .fetch_all(self.store.pool()?)
        .await?;

        Ok(rows.into_iter().filter(|e| filter.matches(e)).collect())
    }

    /// Counts by type and net quantity delta over the filtered set.
    pub async fn summary(&self, filter: &LogFilter) -> DbResult<LogSummary> {
        let entries = self.list(filter).await?;
        Ok(summarize(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::DbConfig;
    use crate::repository::inventory::InventoryUpdate;
    use crate::seed;
    use gloss_core::InventoryChangeType;

    #[tokio::test]
    async fn test_list_filters_and_summary() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();

        store
            .inventory()
            .adjust(
                InventoryUpdate {
                    product_id: demo.wax_id.clone(),
                    stock_quantity: 3,
                    low_stock_threshold: 2,
                    reason: Some("Recount after audit".to_string()),
                    notes: None,
                },
                None,
            )
            .await
            .unwrap();

        let all = store.inventory_logs().list(&LogFilter::default()).await.unwrap();
        assert!(all.len() >= 2);
        assert_eq!(all[0].change_type, InventoryChangeType::StockAndThreshold);

        let audit = store
            .inventory_logs()
            .list(&LogFilter {
                search: Some("AUDIT".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(audit.len(), 1);

        let summary = store
            .inventory_logs()
            .summary(&LogFilter {
                product_id: Some(demo.wax_id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.initial_stock, 1);
        assert_eq!(summary.stock_and_threshold, 1);
        assert_eq!(summary.net_quantity_delta, 3);
    }

    #[tokio::test]
    async fn test_ledger_rejects_update_and_delete() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        seed::seed_demo(&store).await.unwrap();
        let pool = store.pool().unwrap();

        let update = sqlx::query("UPDATE inventory_logs SET reason = 'edited'")
            .execute(pool)
            .await
            .map_err(DbError::from);
        assert!(matches!(update, Err(DbError::QueryFailed(_))));

        let delete = sqlx::query("DELETE FROM inventory_logs")
            .execute(pool)
            .await
            .map_err(DbError::from);
        assert!(matches!(delete, Err(DbError::QueryFailed(_))));
    }
}
