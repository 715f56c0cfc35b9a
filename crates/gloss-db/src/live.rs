//! # Live Queries
//!
//! Pub/sub over the local store. A subscriber registers a query (SQL plus
//! params) or a derived view loader; the registry re-runs it after every
//! committed transaction that touched one of its tables and pushes the new
//! value through a `tokio::sync::watch` channel.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  store.subscribe(spec) ──► QueryRegistry ──► entry (sql, params, T)     │
//! │       │                         ▲              ├── watch::Sender<Arc<T>>│
//! │       ▼                         │              ├── refresh closure      │
//! │  LiveQuery<T> (Receiver)        │              └── tables {products,..} │
//! │                                 │                                       │
//! │  WriteTx::commit() ─────────────┘                                       │
//! │     touched = {products, inventory}                                     │
//! │     → every entry whose tables intersect `touched` is re-run            │
//! │                                                                         │
//! │  Identical (sql, params, T) subscriptions share one entry. Dropping     │
//! │  the last LiveQuery removes it.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Refreshes of different entries after one commit are not ordered relative
//! to each other.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use sqlx::query::{Query, QueryAs};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::store::LocalStore;

// =============================================================================
// Parameters
// =============================================================================

/// A bound parameter of a live or single-row statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Real(f64),
    Text(String),
    Null,
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Int(i64::from(v))
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Real(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

pub(crate) fn bind_query<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

pub(crate) fn bind_query_as<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    params: &[SqlParam],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

// =============================================================================
// Query Spec
// =============================================================================

/// A subscribable query.
///
/// ## Example
/// ```rust,ignore
/// let spec = LiveQuerySpec::new("SELECT * FROM products WHERE is_active = ?")
///     .bind(true);
/// let mut live = store.subscribe::<Product>(spec).await?;
/// let products = live.changed().await?;
/// ```
#[derive(Debug, Clone)]
pub struct LiveQuerySpec {
    pub sql: String,
    pub params: Vec<SqlParam>,
    /// Tables that invalidate this query. Inferred from the SQL when unset.
    pub tables: Option<Vec<String>>,
}

impl LiveQuerySpec {
    pub fn new(sql: impl Into<String>) -> Self {
        LiveQuerySpec {
            sql: sql.into(),
            params: Vec::new(),
            tables: None,
        }
    }

    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Overrides table inference, e.g. for queries reading through views or
    /// subqueries the tokenizer does not see.
    pub fn tables(mut self, tables: &[&str]) -> Self {
        self.tables = Some(tables.iter().map(|t| t.to_string()).collect());
        self
    }

    pub(crate) fn resolved_tables(&self) -> BTreeSet<String> {
        match &self.tables {
            Some(tables) => tables.iter().cloned().collect(),
            None => infer_tables(&self.sql),
        }
    }
}

/// Names following `FROM` or `JOIN`, lowercased.
pub fn infer_tables(sql: &str) -> BTreeSet<String> {
    let tokens: Vec<&str> = sql
        .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')' || c == ';')
        .filter(|t| !t.is_empty())
        .collect();

    let mut tables = BTreeSet::new();
    for pair in tokens.windows(2) {
        let keyword = pair[0].to_ascii_uppercase();
        if keyword == "FROM" || keyword == "JOIN" {
            let name = pair[1].trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']');
            if !name.is_empty() && !name.eq_ignore_ascii_case("SELECT") {
                tables.insert(name.to_ascii_lowercase());
            }
        }
    }
    tables
}

// =============================================================================
// Registry
// =============================================================================

type Refresh = Arc<dyn Fn(LocalStore) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct QueryKey {
    query: String,
    params: String,
    type_id: TypeId,
}

impl QueryKey {
    pub(crate) fn for_sql<T: 'static>(spec: &LiveQuerySpec) -> Self {
        QueryKey {
            query: spec.sql.clone(),
            params: format!("{:?}", spec.params),
            type_id: TypeId::of::<T>(),
        }
    }

    pub(crate) fn for_view<T: 'static>(key: &str) -> Self {
        QueryKey {
            query: key.to_string(),
            params: String::new(),
            type_id: TypeId::of::<T>(),
        }
    }
}

struct Entry {
    /// `Arc<watch::Sender<Arc<T>>>` for the entry's `T`.
    sender: Box<dyn Any + Send + Sync>,
    refresh: Refresh,
    tables: BTreeSet<String>,
    subscribers: usize,
}

type Entries = Arc<Mutex<HashMap<QueryKey, Entry>>>;

/// Shared registry of live queries, owned by the [`LocalStore`].
#[derive(Clone, Default)]
pub struct QueryRegistry {
    entries: Entries,
}

impl std::fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct live entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers (or joins) an entry and returns a handle on it.
    pub(crate) async fn register<T, F>(
        &self,
        store: &LocalStore,
        key: QueryKey,
        tables: BTreeSet<String>,
        loader: F,
    ) -> DbResult<LiveQuery<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(LocalStore) -> BoxFuture<'static, DbResult<T>> + Send + Sync + 'static,
    {
        if let Some(live) = self.join::<T>(&key) {
            return live;
        }

        // Loaded without holding the lock; a racing subscriber may win.
        let initial = loader(store.clone()).await?;

        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.get_mut(&key) {
            let sender = downcast::<T>(entry)?;
            entry.subscribers += 1;
            return Ok(self.handle(key, sender.subscribe()));
        }

        let (tx, rx) = watch::channel(Arc::new(initial));
        let sender = Arc::new(tx);
        let loader = Arc::new(loader);

        let refresh_sender = sender.clone();
        let refresh_key = key.query.clone();
        let refresh: Refresh = Arc::new(move |store: LocalStore| {
            let sender = refresh_sender.clone();
            let loader = loader.clone();
            let key = refresh_key.clone();
            Box::pin(async move {
                match loader(store).await {
                    Ok(value) => {
                        sender.send_replace(Arc::new(value));
                    }
                    Err(e) => warn!(query = %key, error = %e, "Live query refresh failed"),
                }
            })
        });

        debug!(query = %key.query, tables = ?tables, "Live query registered");

        entries.insert(
            key.clone(),
            Entry {
                sender: Box::new(sender),
                refresh,
                tables,
                subscribers: 1,
            },
        );
        drop(entries);

        Ok(self.handle(key, rx))
    }

    fn join<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<DbResult<LiveQuery<T>>> {
        let mut entries = lock(&self.entries);
        let entry = entries.get_mut(key)?;
        let rx = match downcast::<T>(entry) {
            Ok(sender) => sender.subscribe(),
            Err(e) => return Some(Err(e)),
        };
        entry.subscribers += 1;
        drop(entries);
        Some(Ok(self.handle(key.clone(), rx)))
    }

    fn handle<T>(&self, key: QueryKey, rx: watch::Receiver<Arc<T>>) -> LiveQuery<T> {
        LiveQuery {
            rx,
            _subscription: Subscription {
                entries: self.entries.clone(),
                key,
            },
        }
    }

    /// Re-runs every entry reading from one of `touched`.
    ///
    /// Called after commit, outside the write lock, so refreshes see the
    /// committed state and never block the next writer.
    pub(crate) async fn invalidate(&self, store: &LocalStore, touched: &BTreeSet<String>) {
        if touched.is_empty() {
            return;
        }

        let stale: Vec<Refresh> = lock(&self.entries)
            .values()
            .filter(|entry| !entry.tables.is_disjoint(touched))
            .map(|entry| entry.refresh.clone())
            .collect();

        if stale.is_empty() {
            return;
        }

        debug!(tables = ?touched, queries = stale.len(), "Refreshing live queries");

        for refresh in stale {
            refresh(store.clone()).await;
        }
    }
}

fn downcast<T: Send + Sync + 'static>(entry: &Entry) -> DbResult<Arc<watch::Sender<Arc<T>>>> {
    entry
        .sender
        .downcast_ref::<Arc<watch::Sender<Arc<T>>>>()
        .cloned()
        .ok_or_else(|| DbError::Internal("live query type mismatch".to_string()))
}

// =============================================================================
// Handles
// =============================================================================

/// Keeps an entry alive; the last one dropped removes it.
struct Subscription {
    entries: Entries,
    key: QueryKey,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut entries = lock(&self.entries);
        let remove = match entries.get_mut(&self.key) {
            Some(entry) => {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                entry.subscribers == 0
            }
            None => false,
        };
        if remove {
            entries.remove(&self.key);
            debug!(query = %self.key.query, "Live query unsubscribed");
        }
    }
}

/// Observer side of a live query. Drop it to unsubscribe.
pub struct LiveQuery<T> {
    rx: watch::Receiver<Arc<T>>,
    _subscription: Subscription,
}

impl<T> LiveQuery<T> {
    /// The latest delivered value.
    pub fn current(&self) -> Arc<T> {
        self.rx.borrow().clone()
    }

    /// Waits for the next re-delivery and returns it.
    pub async fn changed(&mut self) -> DbResult<Arc<T>> {
        self.rx
            .changed()
            .await
            .map_err(|_| DbError::Internal("live query closed".to_string()))?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// True when a value was delivered since the last `changed()`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

// =============================================================================
// Row loaders
// =============================================================================

/// Loader for a plain SQL live query.
pub(crate) fn sql_loader<T>(
    spec: LiveQuerySpec,
) -> impl Fn(LocalStore) -> BoxFuture<'static, DbResult<Vec<T>>> + Send + Sync + 'static
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    let spec = Arc::new(spec);
    move |store: LocalStore| {
        let spec = spec.clone();
        Box::pin(async move {
            let pool = store.pool()?;
            let rows = bind_query_as(sqlx::query_as::<_, T>(&spec.sql), &spec.params)
                .fetch_all(pool)
                .await?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_tables_from_joins() {
        let tables = infer_tables(
            "SELECT p.*, i.stock_quantity FROM products p \
             LEFT JOIN inventory i ON i.product_id = p.id \
             JOIN categories c ON c.id = p.category_id",
        );
        let expected: BTreeSet<String> = ["categories", "inventory", "products"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tables, expected);
    }

    #[test]
    fn test_infer_tables_skips_subquery_keyword() {
        let tables = infer_tables("SELECT * FROM (SELECT id FROM tickets)");
        assert!(tables.contains("tickets"));
        assert!(!tables.contains("select"));
    }

    #[test]
    fn test_spec_override() {
        let spec = LiveQuerySpec::new("SELECT 1").tables(&["settings"]);
        assert!(spec.resolved_tables().contains("settings"));
    }

    #[test]
    fn test_param_conversions() {
        assert_eq!(SqlParam::from(true), SqlParam::Int(1));
        assert_eq!(SqlParam::from(None::<&str>), SqlParam::Null);
        assert_eq!(SqlParam::from("a"), SqlParam::Text("a".to_string()));
    }
}
