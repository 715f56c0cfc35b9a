//! # Inventory Repository
//!
//! Stock levels, one row per product. A product without a row reads as
//! stock 0 / threshold 10 everywhere.
//!
//! Every mutation goes through [`InventoryRepository::adjust`] (operator
//! edits) or the checkout path, and both write their ledger entry in the
//! same transaction as the level change.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

use gloss_core::availability::StockLevel;
use gloss_core::ledger::NewLogEntry;
use gloss_core::validation::validate_stock_value;
use gloss_core::{resolve_stock, Actor, Inventory, InventoryLogEntry};

use crate::error::DbResult;
use crate::repository::inventory_log::InventoryLogRepository;
use crate::repository::product;
use crate::store::{LocalStore, WriteTx};

/// An operator edit of one product's stock and threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub product_id: String,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    /// Required when the quantity changes.
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    store: LocalStore,
}

impl InventoryRepository {
    pub fn new(store: LocalStore) -> Self {
        InventoryRepository { store }
    }

    pub async fn get(&self, product_id: &str) -> DbResult<Option<Inventory>> {
        let row = sqlx::query_as::<_, Inventory>("SELECT * FROM inventory WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    /// Resolved level, falling back to the defaults when there is no row.
    pub async fn level(&self, product_id: &str) -> DbResult<StockLevel> {
        Ok(resolve_stock(self.get(product_id).await?.as_ref()))
    }

    pub async fn list(&self) -> DbResult<Vec<Inventory>> {
        let rows = sqlx::query_as::<_, Inventory>("SELECT * FROM inventory ORDER BY product_id")
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(rows)
    }

    /// Applies an operator edit and logs it.
    ///
    /// Returns `Ok(None)` without writing anything when neither value
    /// changed.
    ///
    /// ## Errors
    /// - `ValidationError::Required` when the quantity changes without a reason
    /// - `DbError::NotFound` for an unknown product
    pub async fn adjust(
        &self,
        update: InventoryUpdate,
        actor: Option<&Actor>,
    ) -> DbResult<Option<InventoryLogEntry>> {
        validate_stock_value("stock_quantity", update.stock_quantity)?;
        validate_stock_value("low_stock_threshold", update.low_stock_threshold)?;

        let mut tx = self.store.begin().await?;
        let product = product::load(tx.conn(), &update.product_id).await?;
        let before = load(tx.conn(), &update.product_id).await?.map(|i| i.level());
        let after = StockLevel::new(update.stock_quantity, update.low_stock_threshold);

        let Some(entry) = NewLogEntry::for_change(
            &product.id,
            &product.name,
            before,
            after,
            update.reason.as_deref(),
            update.notes.as_deref(),
            actor,
        )?
        else {
            return Ok(None);
        };

        write_level(&mut tx, &product.id, after).await?;
        let logged = InventoryLogRepository::record_change(&mut tx, entry).await?;
        tx.commit().await?;

        info!(
            product_id = %product.id,
            change_type = logged.change_type.as_str(),
            before = logged.quantity_before,
            after = logged.quantity_after,
            "Inventory adjusted"
        );
        Ok(Some(logged))
    }
}

pub(crate) async fn load(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Option<Inventory>> {
    let row = sqlx::query_as::<_, Inventory>("SELECT * FROM inventory WHERE product_id = ?")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Inserts or overwrites a product's level and records the row.
pub(crate) async fn write_level(tx: &mut WriteTx, product_id: &str, level: StockLevel) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory (product_id, stock_quantity, low_stock_threshold, last_updated)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(product_id) DO UPDATE SET
            stock_quantity = excluded.stock_quantity,
            low_stock_threshold = excluded.low_stock_threshold,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(product_id)
    .bind(level.quantity)
    .bind(level.threshold)
    .bind(Utc::now())
    .execute(tx.conn())
    .await?;

    tx.record_upsert("inventory", product_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::DbConfig;
    use crate::seed;
    use gloss_core::{CoreError, InventoryChangeType, ValidationError};

    fn update(product_id: &str, stock: i64, threshold: i64, reason: Option<&str>) -> InventoryUpdate {
        InventoryUpdate {
            product_id: product_id.to_string(),
            stock_quantity: stock,
            low_stock_threshold: threshold,
            reason: reason.map(str::to_string),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_stock_change_requires_reason() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();
        let before = store.inventory().level(&demo.wax_id).await.unwrap();

        let err = store
            .inventory()
            .adjust(update(&demo.wax_id, before.quantity + 5, before.threshold, None), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));
        assert_eq!(store.inventory().level(&demo.wax_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_threshold_only_change_needs_no_reason() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();
        let before = store.inventory().level(&demo.wax_id).await.unwrap();

        let logged = store
            .inventory()
            .adjust(update(&demo.wax_id, before.quantity, before.threshold + 1, None), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logged.change_type, InventoryChangeType::ThresholdChange);
    }

    #[tokio::test]
    async fn test_noop_adjustment_writes_nothing() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();
        let before = store.inventory().level(&demo.wax_id).await.unwrap();
        let pending = store.outbox().count_pending().await.unwrap();

        let logged = store
            .inventory()
            .adjust(update(&demo.wax_id, before.quantity, before.threshold, Some("x")), None)
            .await
            .unwrap();
        assert!(logged.is_none());
        assert_eq!(store.outbox().count_pending().await.unwrap(), pending);
    }

    #[tokio::test]
    async fn test_stock_at_threshold_is_low_and_zero_is_out() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();
        let actor = Actor {
            id: "e-1".to_string(),
            name: "Dana".to_string(),
            role: None,
        };

        store
            .inventory()
            .adjust(update(&demo.wax_id, 10, 10, Some("Count")), Some(&actor))
            .await
            .unwrap();
        let level = store.inventory().level(&demo.wax_id).await.unwrap();
        assert!(level.is_low());
        assert!(!level.is_out());

        let logged = store
            .inventory()
            .adjust(update(&demo.wax_id, 0, 10, Some("Used up")), Some(&actor))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logged.employee_name.as_deref(), Some("Dana"));
        assert!(store.inventory().level(&demo.wax_id).await.unwrap().is_out());
    }
}
