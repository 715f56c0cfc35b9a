//! # Domain Types
//!
//! Persisted entities of Gloss POS, mirrored one-to-one by local tables.
//!
//! ## Ownership Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Customer ──owns──► Vehicle                                             │
//! │  Ticket   ──owns──► TicketItem ──snapshot──► [CrewMember]               │
//! │  Service  ──owns──► ServiceVariant ──owns──► RecipeLine                 │
//! │                                                  │                      │
//! │  Product ◄──────────── references ───────────────┘                      │
//! │     │                                                                   │
//! │     └── 1:1 ── Inventory ── audited by ──► InventoryLogEntry            │
//! │                                                                         │
//! │  Employee ──► Role (tags: "pos_crew")        Settings (singleton)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every id is a UUID v4 string generated on the client at creation time so
//! rows can be created while offline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::StockLevel;
use crate::money::Money;
use crate::DEFAULT_LOW_STOCK_THRESHOLD;

/// Generates a new client-side identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Clamps a stored basis-point column into the range `portion_bps` accepts.
pub fn bps_of(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// Settings persist the rate as a decimal fraction (`0.12`); tickets keep
/// the basis points frozen at sale time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from the fraction stored in Settings.
    pub fn from_fraction(fraction: f64) -> Self {
        if !fraction.is_finite() || fraction <= 0.0 {
            return TaxRate(0);
        }
        TaxRate((fraction * 10_000.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a decimal fraction.
    pub fn as_fraction(&self) -> f64 {
        self.0 as f64 / 10_000.0
    }

    /// Returns the rate as a percentage (for display only).
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A retail product or a consumable used by service recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    /// Unit cost, used for recipe material cost.
    pub cost_cents: i64,
    /// Volume / unit descriptor ("500ml", "per pad").
    pub volume: Option<String>,
    pub category_id: Option<String>,
    /// Whether the product appears in the POS grid.
    pub show_in_pos: bool,
    pub image_url: Option<String>,
    /// Soft-deactivation flag; referenced products are deactivated, not deleted.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }
}

/// Stock row, one-to-one with Product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Inventory {
    pub product_id: String,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl Inventory {
    pub fn level(&self) -> StockLevel {
        StockLevel::new(self.stock_quantity, self.low_stock_threshold)
    }
}

/// Resolves an optional inventory row the way every reader must.
pub fn resolve_stock(inventory: Option<&Inventory>) -> StockLevel {
    inventory
        .map(Inventory::level)
        .unwrap_or_else(|| StockLevel::new(0, DEFAULT_LOW_STOCK_THRESHOLD))
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// What an inventory log entry documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InventoryChangeType {
    StockAdjustment,
    ThresholdChange,
    StockAndThreshold,
    InitialStock,
}

impl InventoryChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryChangeType::StockAdjustment => "stock_adjustment",
            InventoryChangeType::ThresholdChange => "threshold_change",
            InventoryChangeType::StockAndThreshold => "stock_and_threshold",
            InventoryChangeType::InitialStock => "initial_stock",
        }
    }
}

/// Immutable record of one inventory mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryLogEntry {
    pub id: String,
    pub product_id: String,
    /// Product name at the time of the change.
    pub product_name: String,
    pub change_type: InventoryChangeType,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub threshold_before: i64,
    pub threshold_after: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Acting employee; `None` for system-initiated changes.
    pub employee_id: Option<String>,
    pub employee_name: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryLogEntry {
    pub fn quantity_delta(&self) -> i64 {
        self.quantity_after - self.quantity_before
    }
}

/// The employee (or other identity) performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Option<String>,
}

// =============================================================================
// Services
// =============================================================================

/// Labor cost of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaborCost {
    /// Flat amount per sold unit, independent of crew size.
    Fixed { amount_cents: i64 },
    /// Share of the unit price in basis points (1000 = 10%).
    Percentage { bps: i64 },
}

impl LaborCost {
    /// Storage tag for the `labor_cost_type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            LaborCost::Fixed { .. } => "fixed",
            LaborCost::Percentage { .. } => "percentage",
        }
    }

    /// Raw value for the `labor_cost_value` column.
    pub fn value(&self) -> i64 {
        match self {
            LaborCost::Fixed { amount_cents } => *amount_cents,
            LaborCost::Percentage { bps } => *bps,
        }
    }

    /// Rebuilds a labor cost from its two storage columns.
    pub fn from_parts(kind: Option<&str>, value: Option<i64>) -> Option<LaborCost> {
        let value = value?;
        match kind? {
            "fixed" => Some(LaborCost::Fixed {
                amount_cents: value,
            }),
            "percentage" => Some(LaborCost::Percentage { bps: value }),
            _ => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.value() > 0
    }

    /// Labor cost for one unit sold at `unit_price`.
    pub fn amount_for(&self, unit_price: Money) -> Money {
        match self {
            LaborCost::Fixed { amount_cents } => Money::from_cents(*amount_cents),
            LaborCost::Percentage { bps } => unit_price.portion_bps(bps_of(*bps)),
        }
    }
}

/// A sellable service. Pricing and recipes live on its variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    /// Base price, copied into the synthetic Standard variant.
    pub price_cents: i64,
    pub labor_cost: Option<LaborCost>,
    pub duration_minutes: Option<i64>,
    pub show_in_pos: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceVariant {
    pub id: String,
    pub service_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: Option<i64>,
    /// Declared order; the first variant breaks availability ties.
    pub sort_order: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ServiceVariant {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// One ingredient of a variant's recipe.
///
/// `variant_id` is `None` only for legacy base-level recipes written before
/// services were normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecipeLine {
    pub id: String,
    pub service_id: String,
    pub variant_id: Option<String>,
    pub product_id: String,
    pub quantity: i64,
}

// =============================================================================
// Customers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub loyalty_points: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Vehicle {
    pub id: String,
    pub customer_id: String,
    pub plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
}

// =============================================================================
// Staff
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PayType {
    #[default]
    Hourly,
    Daily,
    Commission,
}

/// Compensation plan, stored as typed columns on `employees`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Compensation {
    pub pay_type: PayType,
    /// Hourly or daily rate in cents.
    pub pay_rate_cents: i64,
    /// Commission share of unit price in basis points (1000 = 10%).
    pub commission_bps: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub role_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: EmployeeStatus,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub compensation: Compensation,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub permissions: Vec<String>,
    /// Assignment tags such as `pos_crew`.
    pub tags: Vec<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

// =============================================================================
// Tickets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Parked; can be resumed into the cart.
    #[default]
    Pending,
    Completed,
    Cancelled,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Product,
    Service,
}

/// A crew member as captured on a ticket item at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CrewMember {
    pub employee_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Ticket {
    pub id: String,
    pub name: String,
    pub status: TicketStatus,
    pub subtotal_cents: i64,
    /// Tax rate frozen at save time.
    pub tax_rate_bps: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    /// `None` means walk-in.
    pub customer_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(bps_of(self.tax_rate_bps))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TicketItem {
    pub id: String,
    pub ticket_id: String,
    pub item_type: ItemType,
    pub product_id: Option<String>,
    pub service_id: Option<String>,
    pub variant_id: Option<String>,
    /// Display name at sale time.
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub duration_minutes: Option<i64>,
    /// Crew snapshot; immutable once the ticket is paid.
    pub crew: Vec<CrewMember>,
    /// Precomputed commission; `None` is derived on read.
    pub commission_cents: Option<i64>,
    pub position: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl TicketItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Back Office
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseType {
    Opex,
    Capex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
    #[ts(as = "String")]
    pub expense_date: NaiveDate,
    pub notes: Option<String>,
    pub expense_type: ExpenseType,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Singleton store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Settings {
    pub id: String,
    pub store_name: String,
    pub store_address: Option<String>,
    pub currency: String,
    /// Decimal fraction, displayed as percentage ×100.
    pub tax_rate: f64,
    pub notifications_enabled: bool,
    pub receipt_header: Option<String>,
    pub receipt_footer: Option<String>,
    pub printer_name: Option<String>,
    pub theme: String,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    /// Id of the single settings row.
    pub const SINGLETON_ID: &'static str = "default";

    /// Settings used before the operator saves anything.
    pub fn with_defaults(now: DateTime<Utc>) -> Self {
        Settings {
            id: Self::SINGLETON_ID.to_string(),
            store_name: "Gloss Detailing".to_string(),
            store_address: None,
            currency: "USD".to_string(),
            tax_rate: 0.0,
            notifications_enabled: true,
            receipt_header: None,
            receipt_footer: None,
            printer_name: None,
            theme: "light".to_string(),
            updated_at: now,
        }
    }

    pub fn tax(&self) -> TaxRate {
        TaxRate::from_fraction(self.tax_rate)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_fraction_round_trip() {
        let rate = TaxRate::from_fraction(0.0825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.as_fraction() - 0.0825).abs() < 1e-9);
        assert!((rate.percentage() - 8.25).abs() < 1e-9);
    }

    #[test]
    fn test_tax_rate_rejects_garbage() {
        assert_eq!(TaxRate::from_fraction(-0.5).bps(), 0);
        assert_eq!(TaxRate::from_fraction(f64::NAN).bps(), 0);
    }

    #[test]
    fn test_labor_cost_parts() {
        let pct = LaborCost::from_parts(Some("percentage"), Some(1500));
        assert_eq!(pct, Some(LaborCost::Percentage { bps: 1500 }));
        assert_eq!(LaborCost::from_parts(Some("fixed"), None), None);
        assert_eq!(LaborCost::from_parts(Some("bogus"), Some(1)), None);

        let fixed = LaborCost::Fixed { amount_cents: 2500 };
        assert_eq!(fixed.kind(), "fixed");
        assert_eq!(fixed.amount_for(Money::from_cents(99_999)).cents(), 2500);
    }

    #[test]
    fn test_missing_inventory_resolves_to_defaults() {
        let level = resolve_stock(None);
        assert_eq!(level.quantity, 0);
        assert_eq!(level.threshold, DEFAULT_LOW_STOCK_THRESHOLD);
    }

    #[test]
    fn test_ticket_status_serializes_uppercase() {
        let json = serde_json::to_string(&TicketStatus::Paid).unwrap();
        assert_eq!(json, "\"PAID\"");
    }
}
