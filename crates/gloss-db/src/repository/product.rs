//! # Product Repository
//!
//! Product CRUD plus the two lifecycle paths:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deactivate(id)   soft: is_active = 0, still resolvable by tickets      │
//! │                                                                         │
//! │  delete(id)       hard, one WriteTx:                                    │
//! │                     1. DELETE service_recipes WHERE product_id = id     │
//! │                     2. DELETE inventory WHERE product_id = id           │
//! │                     3. DELETE products WHERE id = id                    │
//! │                   any failure rolls back all three                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inventory log rows and ticket item snapshots are kept after a delete.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use gloss_core::availability::StockLevel;
use gloss_core::ledger::NewLogEntry;
use gloss_core::validation::{
    validate_amount_cents, validate_name, validate_search_query, validate_sku,
    validate_stock_value,
};
use gloss_core::views::{build_product_views, ProductView};
use gloss_core::{new_id, Actor, Product, DEFAULT_LOW_STOCK_THRESHOLD};

use crate::error::{DbError, DbResult};
use crate::live::LiveQuery;
use crate::repository::inventory::write_level;
use crate::repository::inventory_log::InventoryLogRepository;
use crate::store::LocalStore;

/// Editable product fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub volume: Option<String>,
    pub category_id: Option<String>,
    pub show_in_pos: bool,
    pub image_url: Option<String>,
}

impl ProductInput {
    fn validate(&self) -> DbResult<()> {
        validate_name("name", &self.name, 200)?;
        if let Some(sku) = self.sku.as_deref().filter(|s| !s.trim().is_empty()) {
            validate_sku(sku)?;
        }
        validate_amount_cents("price_cents", self.price_cents)?;
        validate_amount_cents("cost_cents", self.cost_cents)?;
        Ok(())
    }
}

/// A product plus its opening inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(flatten)]
    pub product: ProductInput,
    /// Opening stock; when set an `initial_stock` log entry is written.
    pub initial_stock: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    store: LocalStore,
}

impl ProductRepository {
    pub fn new(store: LocalStore) -> Self {
        ProductRepository { store }
    }

    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name")
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(rows)
    }

    /// Active products marked for the register grid.
    pub async fn list_for_pos(&self) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active = 1 AND show_in_pos = 1 ORDER BY name",
        )
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    /// Case-insensitive match on name or SKU.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", query);
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_active = 1 AND (name LIKE ?1 OR sku LIKE ?1)
            ORDER BY name
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.store.pool()?)
        .await?;

        debug!(query = %query, count = rows.len(), "Product search");
        Ok(rows)
    }

    /// Creates a product and, when requested, its inventory row and the
    /// matching `initial_stock` ledger entry in the same transaction.
    pub async fn create(&self, new: NewProduct, actor: Option<&Actor>) -> DbResult<Product> {
        new.product.validate()?;
        if let Some(stock) = new.initial_stock {
            validate_stock_value("initial_stock", stock)?;
        }
        if let Some(threshold) = new.low_stock_threshold {
            validate_stock_value("low_stock_threshold", threshold)?;
        }

        let now = Utc::now();
        let input = new.product;
        let product = Product {
            id: new_id(),
            name: input.name.trim().to_string(),
            sku: input.sku.filter(|s| !s.trim().is_empty()),
            price_cents: input.price_cents,
            cost_cents: input.cost_cents,
            volume: input.volume,
            category_id: input.category_id,
            show_in_pos: input.show_in_pos,
            image_url: input.image_url,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, price_cents, cost_cents, volume, category_id,
                show_in_pos, image_url, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(&product.volume)
        .bind(&product.category_id)
        .bind(product.show_in_pos)
        .bind(&product.image_url)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("products", &product.id).await?;

        if new.initial_stock.is_some() || new.low_stock_threshold.is_some() {
            let level = StockLevel::new(
                new.initial_stock.unwrap_or(0),
                new.low_stock_threshold
                    .unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
            );
            write_level(&mut tx, &product.id, level).await?;

            let entry = NewLogEntry::for_change(
                &product.id,
                &product.name,
                None,
                level,
                Some("Initial stock"),
                None,
                actor,
            )?;
            if let Some(entry) = entry {
                InventoryLogRepository::record_change(&mut tx, entry).await?;
            }
        }

        tx.commit().await?;

        info!(id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    pub async fn update(&self, id: &str, input: ProductInput) -> DbResult<Product> {
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2, sku = ?3, price_cents = ?4, cost_cents = ?5, volume = ?6,
                category_id = ?7, show_in_pos = ?8, image_url = ?9, updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.sku.filter(|s| !s.trim().is_empty()))
        .bind(input.price_cents)
        .bind(input.cost_cents)
        .bind(&input.volume)
        .bind(&input.category_id)
        .bind(input.show_in_pos)
        .bind(&input.image_url)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        tx.record_upsert("products", id).await?;
        let product = load(tx.conn(), id).await?;
        tx.commit().await?;

        debug!(id = %id, "Product updated");
        Ok(product)
    }

    /// Soft delete: hides the product but keeps every reference intact.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<Product> {
        let mut tx = self.store.begin().await?;
        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(tx.conn())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        tx.record_upsert("products", id).await?;
        let product = load(tx.conn(), id).await?;
        tx.commit().await?;

        info!(id = %id, active = active, "Product active flag changed");
        Ok(product)
    }

    pub async fn deactivate(&self, id: &str) -> DbResult<Product> {
        self.set_active(id, false).await
    }

    /// Removes the product with its recipe lines and inventory row.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;

        load(tx.conn(), id).await?;

        let recipe_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM service_recipes WHERE product_id = ?")
                .bind(id)
                .fetch_all(tx.conn())
                .await?;
        for recipe_id in &recipe_ids {
            sqlx::query("DELETE FROM service_recipes WHERE id = ?")
                .bind(recipe_id)
                .execute(tx.conn())
                .await?;
            tx.record_delete("service_recipes", recipe_id).await?;
        }

        let inventory = sqlx::query("DELETE FROM inventory WHERE product_id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        if inventory.rows_affected() > 0 {
            tx.record_delete("inventory", id).await?;
        }

        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.record_delete("products", id).await?;

        tx.commit().await?;

        info!(id = %id, recipes = recipe_ids.len(), "Product deleted");
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Products joined with category, resolved stock and availability.
    pub async fn views(&self) -> DbResult<Vec<ProductView>> {
        let catalog = self.store.catalog().await?;
        let mut products: Vec<Product> = catalog.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(build_product_views(&products, &catalog))
    }

    pub async fn watch_views(&self) -> DbResult<LiveQuery<Vec<ProductView>>> {
        self.store
            .watch(
                "product_views",
                &["products", "categories", "inventory"],
                |store| async move { store.products().views().await },
            )
            .await
    }
}

pub(crate) async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::seed;
    use gloss_core::InventoryChangeType;

    fn input(name: &str) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            sku: None,
            price_cents: 1_000,
            cost_cents: 400,
            volume: None,
            category_id: None,
            show_in_pos: true,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_with_initial_stock_writes_log() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let product = store
            .products()
            .create(
                NewProduct {
                    product: input("Wax"),
                    initial_stock: Some(12),
                    low_stock_threshold: None,
                },
                None,
            )
            .await
            .unwrap();

        let level = store.inventory().level(&product.id).await.unwrap();
        assert_eq!(level, StockLevel::new(12, 10));

        let logs = store.inventory_logs().list(&Default::default()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].change_type, InventoryChangeType::InitialStock);
        assert_eq!(logs[0].quantity_before, 0);
        assert_eq!(logs[0].quantity_after, 12);
    }

    #[tokio::test]
    async fn test_create_without_stock_has_no_inventory_row() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let product = store
            .products()
            .create(
                NewProduct {
                    product: input("Towel"),
                    initial_stock: None,
                    low_stock_threshold: None,
                },
                None,
            )
            .await
            .unwrap();

        assert!(store.inventory().get(&product.id).await.unwrap().is_none());
        assert_eq!(
            store.inventory().level(&product.id).await.unwrap(),
            StockLevel::new(0, 10)
        );
    }

    #[tokio::test]
    async fn test_search_matches_name_and_sku() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        seed::seed_demo(&store).await.unwrap();

        let hits = store.products().search("wax", 10).await.unwrap();
        assert!(hits.iter().any(|p| p.name.contains("Wax")));
        assert!(store.products().search("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_keeps_references() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();

        let product = store.products().deactivate(&demo.wax_id).await.unwrap();
        assert!(!product.is_active);
        assert!(store.inventory().get(&demo.wax_id).await.unwrap().is_some());
        assert!(store.products().list_for_pos().await.unwrap().iter().all(|p| p.id != demo.wax_id));
    }

    #[tokio::test]
    async fn test_delete_cascades_recipes_and_inventory() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();

        store.products().delete(&demo.wax_id).await.unwrap();

        assert!(store.products().get(&demo.wax_id).await.unwrap().is_none());
        assert!(store.inventory().get(&demo.wax_id).await.unwrap().is_none());
        let detail = store.services().get(&demo.detail_service_id).await.unwrap().unwrap();
        assert!(detail
            .variants
            .iter()
            .flat_map(|v| v.recipe.iter())
            .all(|line| line.product_id != demo.wax_id));

        let pending = store.outbox().pending(100).await.unwrap();
        let deletes: Vec<&str> = pending
            .iter()
            .filter(|e| e.op == crate::OutboxOp::Delete)
            .map(|e| e.table_name.as_str())
            .collect();
        assert_eq!(deletes.last(), Some(&"products"));
        assert!(deletes.contains(&"inventory"));
        assert!(deletes.contains(&"service_recipes"));
    }

    #[tokio::test]
    async fn test_delete_failure_after_inventory_rolls_back_everything() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER fail_product_delete BEFORE DELETE ON products \
             BEGIN SELECT RAISE(ABORT, 'simulated failure'); END",
        )
        .execute(store.pool().unwrap())
        .await
        .unwrap();

        let recipes_before = store.services().get(&demo.detail_service_id).await.unwrap();
        let err = store.products().delete(&demo.wax_id).await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));

        assert!(store.products().get(&demo.wax_id).await.unwrap().is_some());
        assert!(store.inventory().get(&demo.wax_id).await.unwrap().is_some());
        assert_eq!(
            store.services().get(&demo.detail_service_id).await.unwrap(),
            recipes_before
        );
    }

    #[tokio::test]
    async fn test_product_views_track_inventory() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();
        let mut live = store.products().watch_views().await.unwrap();

        store
            .inventory()
            .adjust(
                crate::InventoryUpdate {
                    product_id: demo.wax_id.clone(),
                    stock_quantity: 0,
                    low_stock_threshold: 10,
                    reason: Some("Spilled".to_string()),
                    notes: None,
                },
                None,
            )
            .await
            .unwrap();

        let views = live.changed().await.unwrap();
        let wax = views.iter().find(|v| v.product.id == demo.wax_id).unwrap();
        assert!(wax.availability.is_out);
    }
}
