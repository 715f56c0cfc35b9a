//! # Local Store
//!
//! The single entry point for reading and writing the local database.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  store.begin().await ─────► write mutex (FIFO) ─────► BEGIN             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  WriteTx                                                                │
//! │  ├── statements on tx.conn()                                            │
//! │  ├── tx.record_upsert("products", id) ─► sync_outbox row (same tx)      │
//! │  └── tx.record_delete("inventory", id) ─► sync_outbox row (same tx)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit() ─► COMMIT ─► release mutex ─► QueryRegistry::invalidate    │
//! │                                                                         │
//! │  Dropping a WriteTx without commit rolls everything back, outbox rows   │
//! │  included.                                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads go straight to the pool and always see the last committed local
//! state. Until [`LocalStore::initialize`] succeeds every operation returns
//! [`DbError::NotReady`].

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, Sqlite, SqliteConnection, SqlitePool, Transaction, TypeInfo, ValueRef};
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, info};

use gloss_core::views::CatalogSnapshot;

use crate::error::{DbError, DbResult};
use crate::live::{bind_query, sql_loader, LiveQuery, LiveQuerySpec, QueryKey, QueryRegistry, SqlParam};
use crate::pool::{Database, DbConfig};
use crate::repository::{
    category::CategoryRepository, customer::CustomerRepository, employee::EmployeeRepository,
    expense::ExpenseRepository, inventory::InventoryRepository,
    inventory_log::InventoryLogRepository, product::ProductRepository, role::RoleRepository,
    service::ServiceRepository, settings::SettingsRepository, sync::SyncOutboxRepository,
    ticket::TicketRepository,
};
use crate::schema::{self, TableSpec};

// =============================================================================
// LocalStore
// =============================================================================

struct StoreInner {
    db: OnceCell<Database>,
    write_lock: Arc<Mutex<()>>,
    registry: QueryRegistry,
}

/// Cheap-to-clone handle on the local database.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("ready", &self.is_ready())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    /// Creates an uninitialized store.
    pub fn new() -> Self {
        LocalStore {
            inner: Arc::new(StoreInner {
                db: OnceCell::new(),
                write_lock: Arc::new(Mutex::new(())),
                registry: QueryRegistry::new(),
            }),
        }
    }

    /// Creates and initializes a store in one step.
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        let store = Self::new();
        store.initialize(config).await?;
        Ok(store)
    }

    /// Opens the database and runs migrations. Later calls are no-ops.
    pub async fn initialize(&self, config: DbConfig) -> DbResult<()> {
        self.inner
            .db
            .get_or_try_init(|| async {
                let db = Database::new(config).await?;
                info!("Local store ready");
                Ok::<_, DbError>(db)
            })
            .await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.inner.db.initialized()
    }

    pub fn database(&self) -> DbResult<&Database> {
        self.inner.db.get().ok_or(DbError::NotReady)
    }

    pub fn pool(&self) -> DbResult<&SqlitePool> {
        Ok(self.database()?.pool())
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.inner.registry
    }

    pub async fn close(&self) {
        if let Some(db) = self.inner.db.get() {
            db.close().await;
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens a local write transaction. Writers queue on the store's mutex
    /// in arrival order.
    pub async fn begin(&self) -> DbResult<WriteTx> {
        self.begin_with(true).await
    }

    /// Opens a transaction for changes that came from the remote. It takes
    /// the same lock but records nothing in the outbox.
    pub async fn begin_remote(&self) -> DbResult<WriteTx> {
        self.begin_with(false).await
    }

    async fn begin_with(&self, record_changes: bool) -> DbResult<WriteTx> {
        let pool = self.pool()?.clone();
        let guard = self.inner.write_lock.clone().lock_owned().await;
        let tx = pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(WriteTx {
            tx,
            _guard: guard,
            store: self.clone(),
            touched: BTreeSet::new(),
            record_changes,
        })
    }

    /// Executes one statement that writes a single mirrored row and records
    /// the resulting row state in the outbox.
    ///
    /// Returns the number of affected rows. When the statement removed the
    /// row a delete entry is recorded instead.
    pub async fn execute_row(
        &self,
        table: &str,
        row_id: &str,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<u64> {
        schema::table(table).ok_or_else(|| DbError::UnknownTable(table.to_string()))?;

        let mut tx = self.begin().await?;
        let affected = bind_query(sqlx::query(sql), params)
            .execute(tx.conn())
            .await?
            .rows_affected();

        if affected > 0 {
            if tx.row_exists(table, row_id).await? {
                tx.record_upsert(table, row_id).await?;
            } else {
                tx.record_delete(table, row_id).await?;
            }
        }

        tx.commit().await?;
        Ok(affected)
    }

    // =========================================================================
    // Live queries
    // =========================================================================

    /// Subscribes to a SQL query. The handle is re-delivered the full result
    /// after every commit touching the query's tables.
    pub async fn subscribe<T>(&self, spec: LiveQuerySpec) -> DbResult<LiveQuery<Vec<T>>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static,
    {
        self.pool()?;
        let key = QueryKey::for_sql::<Vec<T>>(&spec);
        let tables = spec.resolved_tables();
        self.inner
            .registry
            .register(self, key, tables, sql_loader::<T>(spec))
            .await
    }

    /// Subscribes to a derived value computed by `loader`, re-run whenever
    /// one of `tables` is written.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let views = store
    ///     .watch("product_views", &["products", "categories", "inventory"], |s| async move {
    ///         s.products().views().await
    ///     })
    ///     .await?;
    /// ```
    pub async fn watch<T, F, Fut>(
        &self,
        key: &str,
        tables: &[&str],
        loader: F,
    ) -> DbResult<LiveQuery<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(LocalStore) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DbResult<T>> + Send + 'static,
    {
        self.pool()?;
        let key = QueryKey::for_view::<T>(key);
        let tables = tables.iter().map(|t| t.to_string()).collect();
        let boxed = move |store: LocalStore| -> BoxFuture<'static, DbResult<T>> {
            Box::pin(loader(store))
        };
        self.inner.registry.register(self, key, tables, boxed).await
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.clone())
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.clone())
    }

    pub fn inventory_logs(&self) -> InventoryLogRepository {
        InventoryLogRepository::new(self.clone())
    }

    pub fn services(&self) -> ServiceRepository {
        ServiceRepository::new(self.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.clone())
    }

    pub fn employees(&self) -> EmployeeRepository {
        EmployeeRepository::new(self.clone())
    }

    pub fn roles(&self) -> RoleRepository {
        RoleRepository::new(self.clone())
    }

    pub fn tickets(&self) -> TicketRepository {
        TicketRepository::new(self.clone())
    }

    pub fn expenses(&self) -> ExpenseRepository {
        ExpenseRepository::new(self.clone())
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.clone())
    }

    pub fn outbox(&self) -> SyncOutboxRepository {
        SyncOutboxRepository::new(self.clone())
    }

    /// Loads everything the derived view builders join against.
    pub async fn catalog(&self) -> DbResult<CatalogSnapshot> {
        let products = self.products().list().await?;
        let categories = self.categories().list().await?;
        let inventory = self.inventory().list().await?;
        let services = self.services().list().await?;
        let employees = self.employees().list().await?;
        let customers = self.customers().list().await?;

        Ok(CatalogSnapshot::default()
            .with_products(products)
            .with_categories(categories)
            .with_inventory(&inventory)
            .with_services(services)
            .with_employees(employees)
            .with_customers(customers))
    }
}

// =============================================================================
// WriteTx
// =============================================================================

/// An open, serialized write transaction.
pub struct WriteTx {
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
    store: LocalStore,
    touched: BTreeSet<String>,
    record_changes: bool,
}

impl std::fmt::Debug for WriteTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTx")
            .field("touched", &self.touched)
            .field("record_changes", &self.record_changes)
            .finish()
    }
}

impl WriteTx {
    /// The transaction's connection. Never use the pool while a `WriteTx`
    /// is open: an in-memory store has exactly one connection.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Marks `table` as written so its live queries refresh on commit.
    pub fn touch(&mut self, table: &str) {
        if !self.touched.contains(table) {
            self.touched.insert(table.to_string());
        }
    }

    pub fn touched(&self) -> &BTreeSet<String> {
        &self.touched
    }

    pub fn records_changes(&self) -> bool {
        self.record_changes
    }

    pub(crate) async fn row_exists(&mut self, table: &str, row_id: &str) -> DbResult<bool> {
        let spec = table_spec(table)?;
        let sql = format!("SELECT 1 FROM {} WHERE {} = ?", spec.name, spec.pk);
        let found = sqlx::query(&sql)
            .bind(row_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(found.is_some())
    }

    /// Snapshots the current state of a row into the outbox.
    pub async fn record_upsert(&mut self, table: &str, row_id: &str) -> DbResult<()> {
        let spec = table_spec(table)?;
        self.touch(spec.name);

        if !self.record_changes {
            return Ok(());
        }

        let sql = format!("SELECT * FROM {} WHERE {} = ?", spec.name, spec.pk);
        let row = sqlx::query(&sql)
            .bind(row_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| DbError::not_found(spec.name, row_id))?;

        let payload = row_to_json(spec, &row)?;
        self.insert_outbox(spec.name, row_id, "upsert", Some(payload.to_string()))
            .await
    }

    /// Records that a row was removed.
    pub async fn record_delete(&mut self, table: &str, row_id: &str) -> DbResult<()> {
        let spec = table_spec(table)?;
        self.touch(spec.name);

        if !self.record_changes {
            return Ok(());
        }

        self.insert_outbox(spec.name, row_id, "delete", None).await
    }

    async fn insert_outbox(
        &mut self,
        table: &str,
        row_id: &str,
        op: &str,
        payload: Option<String>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_outbox (id, table_name, row_id, op, payload, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
            "#,
        )
        .bind(gloss_core::new_id())
        .bind(table)
        .bind(row_id)
        .bind(op)
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        debug!(table = %table, row_id = %row_id, op = %op, "Outbox entry recorded");
        Ok(())
    }

    /// Commits, releases the write lock, then refreshes affected live
    /// queries.
    pub async fn commit(self) -> DbResult<()> {
        let WriteTx {
            tx,
            _guard: guard,
            store,
            touched,
            ..
        } = self;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        drop(guard);

        store.inner.registry.invalidate(&store, &touched).await;
        Ok(())
    }

    /// Explicit rollback. Dropping the transaction has the same effect.
    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

pub(crate) fn table_spec(table: &str) -> DbResult<&'static TableSpec> {
    schema::table(table).ok_or_else(|| DbError::UnknownTable(table.to_string()))
}

// =============================================================================
// Row ⇄ JSON
// =============================================================================

/// Converts a mirrored row into its outbox payload, dropping `revision`.
pub fn row_to_json(spec: &TableSpec, row: &SqliteRow) -> DbResult<Value> {
    let mut map = Map::new();

    for column in spec.columns {
        let raw = row.try_get_raw(*column)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let kind = raw.type_info().name().to_ascii_uppercase();
            match kind.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(*column)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(*column)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "TEXT" | "DATETIME" | "DATE" => Value::from(row.try_get::<String, _>(*column)?),
                _ => Value::Null,
            }
        };
        map.insert((*column).to_string(), value);
    }

    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::LiveQuerySpec;
    use gloss_core::Category;

    async fn store() -> LocalStore {
        LocalStore::open(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_category(tx: &mut WriteTx, id: &str, name: &str) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO categories (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .execute(tx.conn())
        .await
        .unwrap();
        tx.record_upsert("categories", id).await.unwrap();
    }

    #[tokio::test]
    async fn test_uninitialized_store_is_not_ready() {
        let store = LocalStore::new();
        assert!(!store.is_ready());
        assert!(matches!(store.begin().await, Err(DbError::NotReady)));
        assert!(matches!(store.categories().list().await, Err(DbError::NotReady)));
        assert!(matches!(
            store
                .subscribe::<Category>(LiveQuerySpec::new("SELECT * FROM categories"))
                .await,
            Err(DbError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_commit_records_outbox_payload() {
        let store = store().await;

        let mut tx = store.begin().await.unwrap();
        insert_category(&mut tx, "c1", "Wash").await;
        tx.commit().await.unwrap();

        let pending = store.outbox().pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        let payload: Value = serde_json::from_str(pending[0].payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload["name"], "Wash");
        assert!(payload.get("revision").is_none());
    }

    #[tokio::test]
    async fn test_dropped_tx_rolls_back_row_and_outbox() {
        let store = store().await;

        {
            let mut tx = store.begin().await.unwrap();
            insert_category(&mut tx, "c1", "Wash").await;
        }

        assert!(store.categories().list().await.unwrap().is_empty());
        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remote_tx_records_nothing() {
        let store = store().await;

        let mut tx = store.begin_remote().await.unwrap();
        insert_category(&mut tx, "c1", "Wash").await;
        tx.commit().await.unwrap();

        assert_eq!(store.categories().list().await.unwrap().len(), 1);
        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_live_query_redelivers_after_commit() {
        let store = store().await;
        let mut live = store
            .subscribe::<Category>(LiveQuerySpec::new("SELECT * FROM categories ORDER BY name"))
            .await
            .unwrap();
        assert!(live.current().is_empty());

        let mut tx = store.begin().await.unwrap();
        insert_category(&mut tx, "c1", "Wash").await;
        tx.commit().await.unwrap();

        let rows = live.changed().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Wash");
    }

    #[tokio::test]
    async fn test_unrelated_commit_does_not_redeliver() {
        let store = store().await;
        let live = store
            .subscribe::<Category>(LiveQuerySpec::new("SELECT * FROM categories"))
            .await
            .unwrap();

        store
            .execute_row(
                "settings",
                "default",
                "UPDATE settings SET theme = ? WHERE id = 'default'",
                &[SqlParam::from("dark")],
            )
            .await
            .unwrap();

        assert!(!live.has_changed());
    }

    #[tokio::test]
    async fn test_identical_subscriptions_share_entry_until_dropped() {
        let store = store().await;
        let spec = LiveQuerySpec::new("SELECT * FROM categories");

        let a = store.subscribe::<Category>(spec.clone()).await.unwrap();
        let b = store.subscribe::<Category>(spec).await.unwrap();
        assert_eq!(store.registry().len(), 1);

        drop(a);
        assert_eq!(store.registry().len(), 1);
        drop(b);
        assert!(store.registry().is_empty());
    }

    #[tokio::test]
    async fn test_execute_row_records_delete() {
        let store = store().await;

        let mut tx = store.begin().await.unwrap();
        insert_category(&mut tx, "c1", "Wash").await;
        tx.commit().await.unwrap();

        let affected = store
            .execute_row(
                "categories",
                "c1",
                "DELETE FROM categories WHERE id = ?",
                &[SqlParam::from("c1")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let pending = store.outbox().pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].op, crate::repository::sync::OutboxOp::Delete);
    }

    #[tokio::test]
    async fn test_writers_are_serialized() {
        let store = store().await;

        let first = store.begin().await.unwrap();
        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let mut tx = store2.begin().await.unwrap();
            insert_category(&mut tx, "c2", "Second").await;
            tx.commit().await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(store.categories().list().await.unwrap().len(), 1);
    }
}
