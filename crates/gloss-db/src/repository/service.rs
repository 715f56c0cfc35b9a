//! # Service Repository
//!
//! Services are stored as an aggregate: one `services` row, its variants and
//! their recipe lines. Saves replace the whole aggregate in one transaction.
//!
//! ## Save Flow
//! ```text
//! ServiceDraft ──► normalize() ──► NormalizedService
//!                   (Standard variant when none declared,
//!                    empty variant recipes inherit the base recipe)
//!                        │
//!                        ▼  one WriteTx
//!    1. upsert services row
//!    2. delete every recipe line of the service
//!    3. delete variants no longer declared
//!    4. upsert declared variants
//!    5. insert recipe lines
//! ```
//!
//! Legacy services stored without variants are never rewritten on read;
//! [`ServiceDetail::assemble`] presents them with an implicit Standard
//! variant until the next save.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, info};

use gloss_core::service::{normalize, ServiceDetail, ServiceDraft};
use gloss_core::views::{build_service_views, ServiceView};
use gloss_core::{new_id, LaborCost, RecipeLine, Service, ServiceVariant};

use crate::error::{DbError, DbResult};
use crate::live::LiveQuery;
use crate::store::{LocalStore, WriteTx};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, Clone, FromRow)]
struct ServiceRow {
    id: String,
    name: String,
    description: Option<String>,
    category_id: Option<String>,
    price_cents: i64,
    labor_cost_type: Option<String>,
    labor_cost_value: Option<i64>,
    duration_minutes: Option<i64>,
    show_in_pos: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            labor_cost: LaborCost::from_parts(row.labor_cost_type.as_deref(), row.labor_cost_value),
            id: row.id,
            name: row.name,
            description: row.description,
            category_id: row.category_id,
            price_cents: row.price_cents,
            duration_minutes: row.duration_minutes,
            show_in_pos: row.show_in_pos,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServiceRepository {
    store: LocalStore,
}

impl ServiceRepository {
    pub fn new(store: LocalStore) -> Self {
        ServiceRepository { store }
    }

    /// Service rows only, by name.
    pub async fn list(&self) -> DbResult<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services ORDER BY name")
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(rows.into_iter().map(Service::from).collect())
    }

    /// Every service with its variants and recipes.
    pub async fn details(&self) -> DbResult<Vec<ServiceDetail>> {
        let pool = self.store.pool()?;
        let services = self.list().await?;
        let variants = sqlx::query_as::<_, ServiceVariant>(
            "SELECT * FROM service_variants ORDER BY service_id, sort_order",
        )
        .fetch_all(pool)
        .await?;
        let recipes = sqlx::query_as::<_, RecipeLine>("SELECT * FROM service_recipes ORDER BY rowid")
            .fetch_all(pool)
            .await?;

        let mut variants_by: HashMap<String, Vec<ServiceVariant>> = HashMap::new();
        for v in variants {
            variants_by.entry(v.service_id.clone()).or_default().push(v);
        }
        let mut recipes_by: HashMap<String, Vec<RecipeLine>> = HashMap::new();
        for r in recipes {
            recipes_by.entry(r.service_id.clone()).or_default().push(r);
        }

        Ok(services
            .into_iter()
            .map(|s| {
                let variants = variants_by.remove(&s.id).unwrap_or_default();
                let recipes = recipes_by.remove(&s.id).unwrap_or_default();
                ServiceDetail::assemble(s, variants, recipes)
            })
            .collect())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ServiceDetail>> {
        let mut conn = self.store.pool()?.acquire().await?;
        load_detail(&mut conn, id).await
    }

    pub async fn create(&self, draft: ServiceDraft) -> DbResult<ServiceDetail> {
        self.save(&new_id(), draft, false).await
    }

    /// Replaces the aggregate of an existing service.
    pub async fn update(&self, id: &str, draft: ServiceDraft) -> DbResult<ServiceDetail> {
        self.save(id, draft, true).await
    }

    async fn save(&self, id: &str, draft: ServiceDraft, must_exist: bool) -> DbResult<ServiceDetail> {
        let mut tx = self.store.begin().await?;
        let now = Utc::now();

        let existing = load_row(tx.conn(), id).await?;
        if must_exist && existing.is_none() {
            return Err(DbError::not_found("Service", id));
        }
        let created_at = existing.as_ref().map(|s| s.created_at).unwrap_or(now);
        let existing_variants = load_variants(tx.conn(), id).await?;

        let normalized = normalize(id, &draft, &existing_variants, created_at, now)?;
        let service = &normalized.service;

        sqlx::query(
            r#"
            INSERT INTO services (
                id, name, description, category_id, price_cents,
                labor_cost_type, labor_cost_value, duration_minutes, show_in_pos,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category_id = excluded.category_id,
                price_cents = excluded.price_cents,
                labor_cost_type = excluded.labor_cost_type,
                labor_cost_value = excluded.labor_cost_value,
                duration_minutes = excluded.duration_minutes,
                show_in_pos = excluded.show_in_pos,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(&service.category_id)
        .bind(service.price_cents)
        .bind(service.labor_cost.map(|l| l.kind()))
        .bind(service.labor_cost.map(|l| l.value()))
        .bind(service.duration_minutes)
        .bind(service.show_in_pos)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("services", id).await?;

        delete_recipes(&mut tx, id).await?;

        for old in &existing_variants {
            if !normalized.variants.iter().any(|v| v.id == old.id) {
                sqlx::query("DELETE FROM service_variants WHERE id = ?")
                    .bind(&old.id)
                    .execute(tx.conn())
                    .await?;
                tx.record_delete("service_variants", &old.id).await?;
            }
        }

        for variant in &normalized.variants {
            upsert_variant(&mut tx, variant).await?;
        }

        for line in &normalized.recipes {
            sqlx::query(
                r#"
                INSERT INTO service_recipes (id, service_id, variant_id, product_id, quantity, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&line.id)
            .bind(&line.service_id)
            .bind(&line.variant_id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(now)
            .execute(tx.conn())
            .await?;
            tx.record_upsert("service_recipes", &line.id).await?;
        }

        tx.commit().await?;

        info!(
            id = %id,
            variants = normalized.variants.len(),
            recipe_lines = normalized.recipes.len(),
            "Service saved"
        );

        Ok(ServiceDetail::assemble(
            normalized.service,
            normalized.variants,
            normalized.recipes,
        ))
    }

    /// Deletes the service with its variants and recipes. Ticket items keep
    /// their snapshots.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;

        if load_row(tx.conn(), id).await?.is_none() {
            return Err(DbError::not_found("Service", id));
        }

        delete_recipes(&mut tx, id).await?;

        for variant in load_variants(tx.conn(), id).await? {
            sqlx::query("DELETE FROM service_variants WHERE id = ?")
                .bind(&variant.id)
                .execute(tx.conn())
                .await?;
            tx.record_delete("service_variants", &variant.id).await?;
        }

        sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.record_delete("services", id).await?;
        tx.commit().await?;

        info!(id = %id, "Service deleted");
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub async fn views(&self) -> DbResult<Vec<ServiceView>> {
        let details = self.details().await?;
        let catalog = self.store.catalog().await?;
        Ok(build_service_views(&details, &catalog))
    }

    pub async fn watch_views(&self) -> DbResult<LiveQuery<Vec<ServiceView>>> {
        self.store
            .watch(
                "service_views",
                &[
                    "services",
                    "service_variants",
                    "service_recipes",
                    "products",
                    "categories",
                    "inventory",
                ],
                |store| async move { store.services().views().await },
            )
            .await
    }
}

// =============================================================================
// Connection helpers
// =============================================================================

async fn load_row(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Service>> {
    let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Service::from))
}

async fn load_variants(conn: &mut SqliteConnection, service_id: &str) -> DbResult<Vec<ServiceVariant>> {
    let rows = sqlx::query_as::<_, ServiceVariant>(
        "SELECT * FROM service_variants WHERE service_id = ? ORDER BY sort_order",
    )
    .bind(service_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub(crate) async fn load_detail(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<ServiceDetail>> {
    let Some(service) = load_row(&mut *conn, id).await? else {
        return Ok(None);
    };
    let variants = load_variants(&mut *conn, id).await?;
    let recipes = sqlx::query_as::<_, RecipeLine>(
        "SELECT * FROM service_recipes WHERE service_id = ? ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(ServiceDetail::assemble(service, variants, recipes)))
}

/// Every service keyed by id, for commission resolution inside a
/// transaction.
pub(crate) async fn load_all(conn: &mut SqliteConnection) -> DbResult<HashMap<String, Service>> {
    let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services")
        .fetch_all(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.id.clone(), Service::from(row)))
        .collect())
}

async fn delete_recipes(tx: &mut WriteTx, service_id: &str) -> DbResult<()> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM service_recipes WHERE service_id = ?")
        .bind(service_id)
        .fetch_all(tx.conn())
        .await?;

    for recipe_id in &ids {
        sqlx::query("DELETE FROM service_recipes WHERE id = ?")
            .bind(recipe_id)
            .execute(tx.conn())
            .await?;
        tx.record_delete("service_recipes", recipe_id).await?;
    }

    debug!(service_id = %service_id, removed = ids.len(), "Recipe lines cleared");
    Ok(())
}

async fn upsert_variant(tx: &mut WriteTx, variant: &ServiceVariant) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO service_variants (
            id, service_id, name, sku, price_cents, duration_minutes, sort_order,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            sku = excluded.sku,
            price_cents = excluded.price_cents,
            duration_minutes = excluded.duration_minutes,
            sort_order = excluded.sort_order,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&variant.id)
    .bind(&variant.service_id)
    .bind(&variant.name)
    .bind(&variant.sku)
    .bind(variant.price_cents)
    .bind(variant.duration_minutes)
    .bind(variant.sort_order)
    .bind(variant.created_at)
    .bind(variant.updated_at)
    .execute(tx.conn())
    .await?;

    tx.record_upsert("service_variants", &variant.id).await
}
