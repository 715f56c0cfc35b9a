//! # Ticket Repository
//!
//! Persists cart drafts as tickets: parking, resuming and checkout.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       checkout(request)                                 │
//! │                                                                         │
//! │  1. tax rate from settings                                              │
//! │  2. consumed products, first-seen order                                 │
//! │       product line:  sold qty                                           │
//! │       service line:  recipe qty × sold qty                              │
//! │  3. stock check ──── short? ──▶ InsufficientStock (nothing written)     │
//! │  4. ticket row (PENDING) + items with crew and commission               │
//! │  5. items no longer in the cart are deleted                             │
//! │  6. status → PAID         (crew snapshots are frozen from here on)      │
//! │  7. outbox: ticket, then items                                          │
//! │  8. per product: new level + one inventory log row                      │
//! │                                                                         │
//! │  Any error drops the WriteTx: rows, outbox and stock stay untouched.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items are written before the status flips to PAID because the schema
//! rejects crew snapshot changes on paid tickets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, info};

use gloss_core::availability::StockLevel;
use gloss_core::cart::{CartCustomer, CartLine, TicketDraft};
use gloss_core::commission::{commission_by_employee, resolve_commission, EmployeeCommission};
use gloss_core::ledger::NewLogEntry;
use gloss_core::validation::validate_quantity;
use gloss_core::views::{build_ticket_view, TicketView};
use gloss_core::{
    new_id, resolve_stock, Actor, CoreError, InventoryLogEntry, ItemType, Money, PaymentMethod,
    TaxRate, Ticket, TicketItem, TicketStatus, WALK_IN,
};

use crate::codec;
use crate::error::{DbError, DbResult};
use crate::live::LiveQuery;
use crate::repository::inventory_log::InventoryLogRepository;
use crate::repository::{employee, inventory, service, settings};
use crate::store::{LocalStore, WriteTx};

/// Reason written on sale log rows when the caller gives none.
pub const DEFAULT_SALE_REASON: &str = "Sale";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, Clone, FromRow)]
struct TicketItemRow {
    id: String,
    ticket_id: String,
    item_type: ItemType,
    product_id: Option<String>,
    service_id: Option<String>,
    variant_id: Option<String>,
    name: String,
    quantity: i64,
    unit_price_cents: i64,
    unit_cost_cents: i64,
    duration_minutes: Option<i64>,
    crew_snapshot: String,
    commission_cents: Option<i64>,
    position: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketItemRow> for TicketItem {
    type Error = DbError;

    fn try_from(row: TicketItemRow) -> DbResult<Self> {
        Ok(TicketItem {
            crew: codec::decode_crew(&row.crew_snapshot)?,
            id: row.id,
            ticket_id: row.ticket_id,
            item_type: row.item_type,
            product_id: row.product_id,
            service_id: row.service_id,
            variant_id: row.variant_id,
            name: row.name,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            unit_cost_cents: row.unit_cost_cents,
            duration_minutes: row.duration_minutes,
            commission_cents: row.commission_cents,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub draft: TicketDraft,
    pub payment_method: PaymentMethod,
    /// Reason on the inventory log rows; defaults to "Sale".
    pub reason: Option<String>,
    pub actor: Option<Actor>,
}

/// Everything written by a successful checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub ticket: Ticket,
    pub items: Vec<TicketItem>,
    pub logs: Vec<InventoryLogEntry>,
}

/// A parked ticket loaded back for the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkedTicket {
    pub ticket: Ticket,
    pub items: Vec<TicketItem>,
    pub customer: Option<CartCustomer>,
}

/// Consumed quantity of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    product_id: String,
    name: String,
    quantity: i64,
}

/// Rows a draft turns into, plus the stored items it replaces.
#[derive(Debug)]
struct Plan {
    ticket: Ticket,
    items: Vec<TicketItem>,
    /// Stored items that no longer appear in the draft.
    removed: Vec<String>,
    /// Stored state before this save, when the ticket already existed.
    previous: Option<(Ticket, Vec<TicketItem>)>,
}

impl Plan {
    /// The stored ticket, when saving would leave its content unchanged.
    fn unchanged(&self) -> Option<&Ticket> {
        let (ticket, items) = self.previous.as_ref()?;
        let same = same_ticket(ticket, &self.ticket)
            && self.removed.is_empty()
            && items.len() == self.items.len()
            && items.iter().zip(&self.items).all(|(a, b)| same_item(a, b));
        same.then_some(ticket)
    }

    fn changed_items(&self) -> Vec<&TicketItem> {
        let previous: HashMap<&str, &TicketItem> = self
            .previous
            .iter()
            .flat_map(|(_, items)| items.iter())
            .map(|i| (i.id.as_str(), i))
            .collect();
        self.items
            .iter()
            .filter(|item| {
                previous
                    .get(item.id.as_str())
                    .map_or(true, |old| !same_item(old, item))
            })
            .collect()
    }
}

fn same_ticket(a: &Ticket, b: &Ticket) -> bool {
    a.name == b.name
        && a.status == b.status
        && a.subtotal_cents == b.subtotal_cents
        && a.tax_rate_bps == b.tax_rate_bps
        && a.tax_cents == b.tax_cents
        && a.total_cents == b.total_cents
        && a.payment_method == b.payment_method
        && a.customer_id == b.customer_id
}

fn same_item(a: &TicketItem, b: &TicketItem) -> bool {
    TicketItem {
        created_at: b.created_at,
        updated_at: b.updated_at,
        ..a.clone()
    } == *b
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct TicketRepository {
    store: LocalStore,
}

impl TicketRepository {
    pub fn new(store: LocalStore) -> Self {
        TicketRepository { store }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    /// Items in cart order.
    pub async fn items(&self, ticket_id: &str) -> DbResult<Vec<TicketItem>> {
        let mut conn = self.store.pool()?.acquire().await?;
        load_items(&mut conn, ticket_id).await
    }

    /// Most recently touched first.
    pub async fn list(&self, status: Option<TicketStatus>) -> DbResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY updated_at DESC, id
            "#,
        )
        .bind(status)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn parked(&self) -> DbResult<Vec<Ticket>> {
        self.list(Some(TicketStatus::Pending)).await
    }

    /// Saves the draft as a PENDING ticket.
    ///
    /// Parking a draft whose content matches the stored ticket writes
    /// nothing, so resume followed by park is a no-op. Item ids and creation
    /// times survive re-parking.
    ///
    /// ## Errors
    /// - `CoreError::EmptyCart` for a draft without lines
    /// - `DbError::Conflict` when the ticket is no longer PENDING
    pub async fn park(&self, draft: &TicketDraft) -> DbResult<Ticket> {
        validate_draft(draft)?;

        let mut tx = self.store.begin().await?;
        let tax = settings::load(tx.conn()).await?.tax();
        let plan = plan(tx.conn(), draft, tax, Utc::now()).await?;

        if let Some(stored) = plan.unchanged() {
            debug!(id = %stored.id, "Parked ticket unchanged");
            return Ok(stored.clone());
        }

        write_plan(&mut tx, &plan).await?;
        let changed: Vec<String> = plan.changed_items().iter().map(|i| i.id.clone()).collect();
        tx.record_upsert("tickets", &plan.ticket.id).await?;
        for id in &changed {
            tx.record_upsert("ticket_items", id).await?;
        }
        for id in &plan.removed {
            tx.record_delete("ticket_items", id).await?;
        }
        let ticket = load(tx.conn(), &plan.ticket.id).await?;
        tx.commit().await?;

        info!(id = %ticket.id, name = %ticket.name, lines = plan.items.len(), "Ticket parked");
        Ok(ticket)
    }

    /// Loads a parked ticket for the cart.
    ///
    /// ## Errors
    /// `DbError::Conflict` when the ticket is not PENDING.
    pub async fn resume(&self, id: &str) -> DbResult<ParkedTicket> {
        let mut conn = self.store.pool()?.acquire().await?;
        let ticket = load(&mut conn, id).await?;
        if ticket.status != TicketStatus::Pending {
            return Err(DbError::Conflict(format!(
                "ticket {id} is {:?} and cannot be resumed",
                ticket.status
            )));
        }
        let items = load_items(&mut conn, id).await?;

        let customer = match &ticket.customer_id {
            Some(customer_id) => {
                let name = sqlx::query_scalar::<_, String>("SELECT name FROM customers WHERE id = ?")
                    .bind(customer_id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .unwrap_or_else(|| ticket.name.clone());
                Some(CartCustomer {
                    id: customer_id.clone(),
                    name,
                })
            }
            None => None,
        };

        Ok(ParkedTicket {
            ticket,
            items,
            customer,
        })
    }

    /// Pays the draft in one transaction.
    ///
    /// ## Errors
    /// - `CoreError::EmptyCart` for a draft without lines
    /// - `CoreError::InsufficientStock` before anything is written
    /// - `DbError::Conflict` when the ticket is no longer PENDING
    pub async fn checkout(&self, request: CheckoutRequest) -> DbResult<CheckoutReceipt> {
        validate_draft(&request.draft)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let tax = settings::load(tx.conn()).await?.tax();

        let requirements = requirements(tx.conn(), &request.draft.lines).await?;
        let mut levels = Vec::with_capacity(requirements.len());
        for req in &requirements {
            let row = inventory::load(tx.conn(), &req.product_id).await?;
            let level = resolve_stock(row.as_ref());
            if req.quantity > level.quantity {
                return Err(CoreError::InsufficientStock {
                    product_id: req.product_id.clone(),
                    name: req.name.clone(),
                    available: level.quantity,
                    requested: req.quantity,
                }
                .into());
            }
            levels.push(row.map(|r| r.level()));
        }

        let mut plan = plan(tx.conn(), &request.draft, tax, now).await?;
        let services = service::load_all(tx.conn()).await?;
        let employees = employee::load_all(tx.conn()).await?;
        for item in &mut plan.items {
            let svc = item.service_id.as_ref().and_then(|id| services.get(id));
            item.commission_cents = Some(resolve_commission(item, svc, &employees).cents());
        }
        plan.ticket.payment_method = Some(request.payment_method);

        write_plan(&mut tx, &plan).await?;

        sqlx::query("UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?")
            .bind(TicketStatus::Paid)
            .bind(now)
            .bind(&plan.ticket.id)
            .execute(tx.conn())
            .await?;

        tx.record_upsert("tickets", &plan.ticket.id).await?;
        for item in &plan.items {
            tx.record_upsert("ticket_items", &item.id).await?;
        }
        for id in &plan.removed {
            tx.record_delete("ticket_items", id).await?;
        }

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_SALE_REASON);

        let mut logs = Vec::with_capacity(requirements.len());
        for (req, before) in requirements.iter().zip(levels) {
            let current = before.unwrap_or_default();
            let after = StockLevel::new(current.quantity - req.quantity, current.threshold);
            let Some(entry) = NewLogEntry::for_change(
                &req.product_id,
                &req.name,
                before,
                after,
                Some(reason),
                None,
                request.actor.as_ref(),
            )?
            else {
                continue;
            };
            inventory::write_level(&mut tx, &req.product_id, after).await?;
            logs.push(InventoryLogRepository::record_change(&mut tx, entry).await?);
        }

        let ticket = load(tx.conn(), &plan.ticket.id).await?;
        let items = load_items(tx.conn(), &plan.ticket.id).await?;
        tx.commit().await?;

        info!(
            id = %ticket.id,
            total_cents = ticket.total_cents,
            items = items.len(),
            products_decremented = logs.len(),
            "Checkout completed"
        );
        Ok(CheckoutReceipt {
            ticket,
            items,
            logs,
        })
    }

    /// Closes a parked ticket without payment.
    ///
    /// ## Errors
    /// `DbError::Conflict` unless the ticket is PENDING and `status` is
    /// COMPLETED or CANCELLED.
    pub async fn update_status(&self, id: &str, status: TicketStatus) -> DbResult<Ticket> {
        if !matches!(status, TicketStatus::Completed | TicketStatus::Cancelled) {
            return Err(DbError::Conflict(format!(
                "status {status:?} cannot be set directly"
            )));
        }

        let mut tx = self.store.begin().await?;
        let current = load(tx.conn(), id).await?;
        if current.status != TicketStatus::Pending {
            return Err(DbError::Conflict(format!(
                "ticket {id} is {:?}, only PENDING tickets change status",
                current.status
            )));
        }

        sqlx::query("UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.record_upsert("tickets", id).await?;
        let ticket = load(tx.conn(), id).await?;
        tx.commit().await?;

        info!(id = %id, status = ?status, "Ticket status updated");
        Ok(ticket)
    }

    /// Removes a ticket and its items, whatever its status. Works for parked
    /// tickets and for sales history alike, and cannot be undone.
    ///
    /// ## Errors
    /// `DbError::NotFound` when the ticket does not exist.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        let ticket = load(tx.conn(), id).await?;

        let items = load_items(tx.conn(), id).await?;
        for item in &items {
            sqlx::query("DELETE FROM ticket_items WHERE id = ?")
                .bind(&item.id)
                .execute(tx.conn())
                .await?;
            tx.record_delete("ticket_items", &item.id).await?;
        }
        sqlx::query("DELETE FROM tickets WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.record_delete("tickets", id).await?;
        tx.commit().await?;

        info!(id = %id, status = ?ticket.status, items = items.len(), "Ticket deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    pub async fn view(&self, id: &str) -> DbResult<Option<TicketView>> {
        let Some(ticket) = self.get(id).await? else {
            return Ok(None);
        };
        let items = self.items(id).await?;
        let catalog = self.store.catalog().await?;
        Ok(Some(build_ticket_view(&ticket, &items, &catalog)))
    }

    pub async fn views(&self, status: Option<TicketStatus>) -> DbResult<Vec<TicketView>> {
        let tickets = self.list(status).await?;
        let catalog = self.store.catalog().await?;
        let mut by_ticket = self.items_by_ticket(status).await?;

        Ok(tickets
            .iter()
            .map(|ticket| {
                let items = by_ticket.remove(&ticket.id).unwrap_or_default();
                build_ticket_view(ticket, &items, &catalog)
            })
            .collect())
    }

    pub async fn watch_views(&self) -> DbResult<LiveQuery<Vec<TicketView>>> {
        self.store
            .watch(
                "ticket_views",
                &[
                    "tickets",
                    "ticket_items",
                    "customers",
                    "products",
                    "services",
                    "employees",
                ],
                |store| async move { store.tickets().views(None).await },
            )
            .await
    }

    /// Commission per employee over PAID tickets, optionally since a time.
    pub async fn commission_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<EmployeeCommission>> {
        let rows = sqlx::query_as::<_, TicketItemRow>(
            r#"
            SELECT i.* FROM ticket_items i
            JOIN tickets t ON t.id = i.ticket_id
            WHERE t.status = 'PAID' AND (?1 IS NULL OR t.updated_at >= ?1)
            ORDER BY t.updated_at, i.position
            "#,
        )
        .bind(since)
        .fetch_all(self.store.pool()?)
        .await?;
        let items = rows
            .into_iter()
            .map(TicketItem::try_from)
            .collect::<DbResult<Vec<_>>>()?;

        let catalog = self.store.catalog().await?;
        Ok(commission_by_employee(
            &items,
            &catalog.services,
            &catalog.employees,
        ))
    }

    async fn items_by_ticket(
        &self,
        status: Option<TicketStatus>,
    ) -> DbResult<HashMap<String, Vec<TicketItem>>> {
        let rows = sqlx::query_as::<_, TicketItemRow>(
            r#"
            SELECT i.* FROM ticket_items i
            JOIN tickets t ON t.id = i.ticket_id
            WHERE (?1 IS NULL OR t.status = ?1)
            ORDER BY i.position
            "#,
        )
        .bind(status)
        .fetch_all(self.store.pool()?)
        .await?;

        let mut grouped: HashMap<String, Vec<TicketItem>> = HashMap::new();
        for row in rows {
            let item = TicketItem::try_from(row)?;
            grouped.entry(item.ticket_id.clone()).or_default().push(item);
        }
        Ok(grouped)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_draft(draft: &TicketDraft) -> DbResult<()> {
    if draft.lines.is_empty() {
        return Err(CoreError::EmptyCart.into());
    }
    for line in &draft.lines {
        validate_quantity(line.quantity)?;
    }
    Ok(())
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Ticket> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Ticket", id))
}

async fn load_items(conn: &mut SqliteConnection, ticket_id: &str) -> DbResult<Vec<TicketItem>> {
    let rows = sqlx::query_as::<_, TicketItemRow>(
        "SELECT * FROM ticket_items WHERE ticket_id = ? ORDER BY position, rowid",
    )
    .bind(ticket_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(TicketItem::try_from).collect()
}

/// Resolves the draft against the stored ticket.
async fn plan(
    conn: &mut SqliteConnection,
    draft: &TicketDraft,
    tax: TaxRate,
    now: DateTime<Utc>,
) -> DbResult<Plan> {
    let previous = match &draft.ticket_id {
        Some(id) => {
            let ticket = load(&mut *conn, id).await?;
            if ticket.status != TicketStatus::Pending {
                return Err(DbError::Conflict(format!(
                    "ticket {id} is {:?} and can no longer be edited",
                    ticket.status
                )));
            }
            let items = load_items(&mut *conn, id).await?;
            Some((ticket, items))
        }
        None => None,
    };

    let ticket_id = draft.ticket_id.clone().unwrap_or_else(new_id);
    let stored: HashMap<&str, &TicketItem> = previous
        .iter()
        .flat_map(|(_, items)| items.iter())
        .map(|i| (i.id.as_str(), i))
        .collect();

    let items: Vec<TicketItem> = draft
        .lines
        .iter()
        .enumerate()
        .map(|(position, line)| {
            let existing = line.item_id.as_deref().and_then(|id| stored.get(id));
            to_item(line, &ticket_id, position as i64, existing.copied(), now)
        })
        .collect();

    let removed = previous
        .iter()
        .flat_map(|(_, old)| old.iter())
        .filter(|old| !items.iter().any(|i| i.id == old.id))
        .map(|old| old.id.clone())
        .collect();

    let subtotal: Money = draft.lines.iter().map(CartLine::line_total).sum();
    let tax_amount = subtotal.calculate_tax(tax);
    let name = match draft.name.trim() {
        "" => WALK_IN.to_string(),
        trimmed => trimmed.to_string(),
    };

    let ticket = Ticket {
        id: ticket_id,
        name,
        status: TicketStatus::Pending,
        subtotal_cents: subtotal.cents(),
        tax_rate_bps: i64::from(tax.bps()),
        tax_cents: tax_amount.cents(),
        total_cents: (subtotal + tax_amount).cents(),
        payment_method: None,
        customer_id: draft.customer_id.clone(),
        created_at: previous.as_ref().map_or(now, |(t, _)| t.created_at),
        updated_at: now,
    };

    Ok(Plan {
        ticket,
        items,
        removed,
        previous,
    })
}

fn to_item(
    line: &CartLine,
    ticket_id: &str,
    position: i64,
    existing: Option<&TicketItem>,
    now: DateTime<Utc>,
) -> TicketItem {
    TicketItem {
        id: existing.map_or_else(new_id, |i| i.id.clone()),
        ticket_id: ticket_id.to_string(),
        item_type: line.item_type,
        product_id: line.product_id.clone(),
        service_id: line.service_id.clone(),
        variant_id: line.variant_id.clone(),
        name: line.name.clone(),
        quantity: line.quantity,
        unit_price_cents: line.unit_price_cents,
        unit_cost_cents: line.unit_cost_cents,
        duration_minutes: line.duration_minutes,
        crew: match line.item_type {
            ItemType::Service => line.crew.clone(),
            ItemType::Product => Vec::new(),
        },
        commission_cents: None,
        position,
        created_at: existing.map_or(now, |i| i.created_at),
        updated_at: now,
    }
}

async fn write_plan(tx: &mut WriteTx, plan: &Plan) -> DbResult<()> {
    let t = &plan.ticket;
    sqlx::query(
        r#"
        INSERT INTO tickets (
            id, name, status, subtotal_cents, tax_rate_bps, tax_cents, total_cents,
            payment_method, customer_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            status = excluded.status,
            subtotal_cents = excluded.subtotal_cents,
            tax_rate_bps = excluded.tax_rate_bps,
            tax_cents = excluded.tax_cents,
            total_cents = excluded.total_cents,
            payment_method = excluded.payment_method,
            customer_id = excluded.customer_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&t.id)
    .bind(&t.name)
    .bind(t.status)
    .bind(t.subtotal_cents)
    .bind(t.tax_rate_bps)
    .bind(t.tax_cents)
    .bind(t.total_cents)
    .bind(t.payment_method)
    .bind(&t.customer_id)
    .bind(t.created_at)
    .bind(t.updated_at)
    .execute(tx.conn())
    .await?;

    for id in &plan.removed {
        sqlx::query("DELETE FROM ticket_items WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
    }

    for item in &plan.items {
        sqlx::query(
            r#"
            INSERT INTO ticket_items (
                id, ticket_id, item_type, product_id, service_id, variant_id, name,
                quantity, unit_price_cents, unit_cost_cents, duration_minutes,
                crew_snapshot, commission_cents, position, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                item_type = excluded.item_type,
                product_id = excluded.product_id,
                service_id = excluded.service_id,
                variant_id = excluded.variant_id,
                name = excluded.name,
                quantity = excluded.quantity,
                unit_price_cents = excluded.unit_price_cents,
                unit_cost_cents = excluded.unit_cost_cents,
                duration_minutes = excluded.duration_minutes,
                crew_snapshot = excluded.crew_snapshot,
                commission_cents = excluded.commission_cents,
                position = excluded.position,
                updated_at = excluded.updated_at
            WHERE ticket_items.ticket_id = excluded.ticket_id
            "#,
        )
        .bind(&item.id)
        .bind(&item.ticket_id)
        .bind(item.item_type)
        .bind(&item.product_id)
        .bind(&item.service_id)
        .bind(&item.variant_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_cost_cents)
        .bind(item.duration_minutes)
        .bind(codec::encode_crew(&item.crew)?)
        .bind(item.commission_cents)
        .bind(item.position)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(tx.conn())
        .await?;
    }

    Ok(())
}

/// Products consumed by the lines, merged in first-seen order.
async fn requirements(conn: &mut SqliteConnection, lines: &[CartLine]) -> DbResult<Vec<Requirement>> {
    let mut merged: Vec<Requirement> = Vec::new();

    for line in lines {
        match line.item_type {
            ItemType::Product => {
                let Some(product_id) = line.product_id.as_deref() else {
                    continue;
                };
                let name = product_name(&mut *conn, product_id)
                    .await?
                    .unwrap_or_else(|| line.name.clone());
                add_requirement(&mut merged, product_id, name, line.quantity);
            }
            ItemType::Service => {
                let Some(service_id) = line.service_id.as_deref() else {
                    continue;
                };
                let detail = service::load_detail(&mut *conn, service_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Service", service_id))?;
                let variant = line
                    .variant_id
                    .as_deref()
                    .and_then(|id| detail.variant(id))
                    .ok_or_else(|| CoreError::VariantRequired {
                        service_id: service_id.to_string(),
                    })?;
                for ingredient in &variant.recipe {
                    let name = product_name(&mut *conn, &ingredient.product_id)
                        .await?
                        .unwrap_or_else(|| ingredient.product_id.clone());
                    add_requirement(
                        &mut merged,
                        &ingredient.product_id,
                        name,
                        ingredient.quantity * line.quantity,
                    );
                }
            }
        }
    }

    Ok(merged)
}

fn add_requirement(merged: &mut Vec<Requirement>, product_id: &str, name: String, quantity: i64) {
    match merged.iter_mut().find(|r| r.product_id == product_id) {
        Some(existing) => existing.quantity += quantity,
        None => merged.push(Requirement {
            product_id: product_id.to_string(),
            name,
            quantity,
        }),
    }
}

async fn product_name(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Option<String>> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(name)
}
