//! # Cart State Machine
//!
//! The active order on the register. Exactly one cart is being composed at a
//! time; parked tickets live in storage as `PENDING` rows and are swapped in
//! with [`Cart::load`].
//!
//! ## Phases
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌───────┐  add_item / set_customer / load   ┌───────────┐             │
//! │   │ Empty │ ─────────────────────────────────►│ Composing │◄──┐         │
//! │   └───▲───┘                                   └─────┬─────┘   │         │
//! │       │                                             │         │         │
//! │       │ complete_checkout / clear    begin_checkout │         │ fail_   │
//! │       │                                             ▼         │ checkout│
//! │       │                                      ┌─────────────┐  │         │
//! │       └──────────────────────────────────────│ CheckingOut │──┘         │
//! │                                              └─────────────┘            │
//! │                                                                         │
//! │   park(name) persists a PENDING ticket, then clear() → Empty            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every transition is a named method returning a `CoreResult`; the cart
//! never touches storage. The register in the shell drives persistence
//! around it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::service::ServiceDetail;
use crate::types::{
    CrewMember, Customer, ItemType, Product, TaxRate, Ticket, TicketItem, Vehicle,
};
use crate::validation::{validate_cart_size, validate_quantity};
use crate::views::material_cost;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY, WALK_IN};

// =============================================================================
// Line Items
// =============================================================================

/// A fully resolved sellable, ready to become a cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    /// Product id for products, variant id for services.
    pub resolved_id: String,
    pub item_type: ItemType,
    pub product_id: Option<String>,
    pub service_id: Option<String>,
    pub variant_id: Option<String>,
    pub name: String,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub duration_minutes: Option<i64>,
}

impl LineItem {
    pub fn product(product: &Product) -> Self {
        LineItem {
            resolved_id: product.id.clone(),
            item_type: ItemType::Product,
            product_id: Some(product.id.clone()),
            service_id: None,
            variant_id: None,
            name: product.name.clone(),
            unit_price_cents: product.price_cents,
            unit_cost_cents: product.cost_cents,
            duration_minutes: None,
        }
    }

    /// Resolves a service line.
    ///
    /// A service with a single variant resolves on its own; otherwise the
    /// caller must pick one.
    ///
    /// ## Errors
    /// `CoreError::VariantRequired` when `variant_id` is missing or unknown
    /// and the service has more than one variant.
    pub fn service(
        detail: &ServiceDetail,
        variant_id: Option<&str>,
        products: &HashMap<String, Product>,
    ) -> CoreResult<Self> {
        let chosen = match variant_id {
            Some(id) => detail.variant(id),
            None if detail.variants.len() == 1 => detail.variants.first(),
            None => None,
        };

        let Some(chosen) = chosen else {
            return Err(CoreError::VariantRequired {
                service_id: detail.service.id.clone(),
            });
        };

        let name = if detail.variants.len() == 1 {
            detail.service.name.clone()
        } else {
            format!("{} ({})", detail.service.name, chosen.variant.name)
        };

        Ok(LineItem {
            resolved_id: chosen.variant.id.clone(),
            item_type: ItemType::Service,
            product_id: None,
            service_id: Some(detail.service.id.clone()),
            variant_id: Some(chosen.variant.id.clone()),
            name,
            unit_price_cents: chosen.variant.price_cents,
            unit_cost_cents: material_cost(&chosen.recipe, products).cents(),
            duration_minutes: chosen
                .variant
                .duration_minutes
                .or(detail.service.duration_minutes),
        })
    }
}

/// One line of the active cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    /// Resolved id; adding the same sellable again bumps this line.
    pub id: String,
    /// Stored ticket item id, kept across park / resume.
    pub item_id: Option<String>,
    pub item_type: ItemType,
    pub product_id: Option<String>,
    pub service_id: Option<String>,
    pub variant_id: Option<String>,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub duration_minutes: Option<i64>,
    pub crew: Vec<CrewMember>,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    fn from_item(item: LineItem, quantity: i64) -> Self {
        CartLine {
            id: item.resolved_id,
            item_id: None,
            item_type: item.item_type,
            product_id: item.product_id,
            service_id: item.service_id,
            variant_id: item.variant_id,
            name: item.name,
            quantity,
            unit_price_cents: item.unit_price_cents,
            unit_cost_cents: item.unit_cost_cents,
            duration_minutes: item.duration_minutes,
            crew: Vec::new(),
        }
    }

    fn from_ticket_item(item: &TicketItem) -> Self {
        let resolved = match item.item_type {
            ItemType::Product => item.product_id.clone(),
            ItemType::Service => item.variant_id.clone(),
        };

        CartLine {
            id: resolved.unwrap_or_else(|| item.id.clone()),
            item_id: Some(item.id.clone()),
            item_type: item.item_type,
            product_id: item.product_id.clone(),
            service_id: item.service_id.clone(),
            variant_id: item.variant_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            unit_cost_cents: item.unit_cost_cents,
            duration_minutes: item.duration_minutes,
            crew: item.crew.clone(),
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CartPhase {
    #[default]
    Empty,
    Composing,
    CheckingOut,
}

impl CartPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartPhase::Empty => "empty",
            CartPhase::Composing => "composing",
            CartPhase::CheckingOut => "checking out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartCustomer {
    pub id: String,
    pub name: String,
}

/// Subtotal, tax and total of the cart at a given rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    pub subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax: Money,
    pub total: Money,
}

/// Snapshot of the cart handed to the ticket repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TicketDraft {
    /// Set when the cart was resumed from a parked ticket.
    pub ticket_id: Option<String>,
    pub name: String,
    pub customer_id: Option<String>,
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    ticket_id: Option<String>,
    name: String,
    customer: Option<CartCustomer>,
    lines: Vec<CartLine>,
    phase: CartPhase,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            ticket_id: None,
            name: WALK_IN.to_string(),
            customer: None,
            lines: Vec::new(),
            phase: CartPhase::Empty,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn phase(&self) -> CartPhase {
        self.phase
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ticket_id(&self) -> Option<&str> {
        self.ticket_id.as_deref()
    }

    pub fn customer(&self) -> Option<&CartCustomer> {
        self.customer.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, line_id: &str) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn totals(&self, tax_rate: TaxRate) -> CartTotals {
        let subtotal: Money = self.lines.iter().map(CartLine::line_total).sum();
        let tax = subtotal.calculate_tax(tax_rate);
        CartTotals {
            subtotal,
            tax_rate,
            tax,
            total: subtotal + tax,
        }
    }

    // -------------------------------------------------------------------------
    // Composing
    // -------------------------------------------------------------------------

    /// Adds one unit of `item`, or bumps the existing line with the same
    /// resolved id.
    pub fn add_item(&mut self, item: LineItem) -> CoreResult<()> {
        self.add_quantity(item, 1)
    }

    pub fn add_quantity(&mut self, item: LineItem, quantity: i64) -> CoreResult<()> {
        self.ensure_editable("add item")?;
        validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.id == item.resolved_id) {
            let requested = line.quantity + quantity;
            if requested > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested,
                    max: MAX_LINE_QUANTITY,
                });
            }
            line.quantity = requested;
        } else {
            validate_cart_size(self.lines.len()).map_err(|_| CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            })?;
            self.lines.push(CartLine::from_item(item, quantity));
        }

        self.refresh_phase();
        Ok(())
    }

    /// Sets a line's quantity. `0` removes the line; negative values leave
    /// the cart untouched and return `Ok(false)`.
    pub fn update_quantity(&mut self, line_id: &str, quantity: i64) -> CoreResult<bool> {
        self.ensure_editable("update quantity")?;

        if quantity < 0 {
            return Ok(false);
        }

        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        let index = self
            .lines
            .iter()
            .position(|l| l.id == line_id)
            .ok_or_else(|| CoreError::LineNotFound(line_id.to_string()))?;

        if quantity == 0 {
            self.lines.remove(index);
        } else {
            self.lines[index].quantity = quantity;
        }

        self.refresh_phase();
        Ok(true)
    }

    /// Removes a line. Returns whether anything was removed.
    pub fn remove_item(&mut self, line_id: &str) -> CoreResult<bool> {
        self.ensure_editable("remove item")?;

        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        let removed = self.lines.len() != before;

        self.refresh_phase();
        Ok(removed)
    }

    /// Toggles `member` on a service line's crew. Returns `true` when the
    /// member is assigned after the call.
    pub fn assign_crew(&mut self, line_id: &str, member: CrewMember) -> CoreResult<bool> {
        self.ensure_editable("assign crew")?;

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| CoreError::LineNotFound(line_id.to_string()))?;

        if line.item_type != ItemType::Service {
            return Err(CoreError::CrewNotAllowed(line_id.to_string()));
        }

        if let Some(pos) = line
            .crew
            .iter()
            .position(|c| c.employee_id == member.employee_id)
        {
            line.crew.remove(pos);
            Ok(false)
        } else {
            line.crew.push(member);
            Ok(true)
        }
    }

    /// Attaches or detaches the customer and derives the ticket name.
    ///
    /// One vehicle: `"<name> - <plate>"`. Otherwise the customer name.
    /// Detaching resets the name to Walk-in.
    pub fn set_customer(
        &mut self,
        customer: Option<(&Customer, &[Vehicle])>,
    ) -> CoreResult<()> {
        self.ensure_editable("set customer")?;

        match customer {
            Some((customer, vehicles)) => {
                self.name = match vehicles {
                    [only] => format!("{} - {}", customer.name, only.plate),
                    _ => customer.name.clone(),
                };
                self.customer = Some(CartCustomer {
                    id: customer.id.clone(),
                    name: customer.name.clone(),
                });
            }
            None => {
                self.customer = None;
                self.name = WALK_IN.to_string();
            }
        }

        self.refresh_phase();
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) -> CoreResult<()> {
        self.ensure_editable("rename ticket")?;
        let trimmed = name.trim();
        self.name = if trimmed.is_empty() {
            WALK_IN.to_string()
        } else {
            trimmed.to_string()
        };
        Ok(())
    }

    /// Replaces the cart with a parked ticket. Unsaved edits are discarded.
    pub fn load(
        &mut self,
        ticket: &Ticket,
        items: &[TicketItem],
        customer: Option<CartCustomer>,
    ) -> CoreResult<()> {
        if self.phase == CartPhase::CheckingOut {
            return Err(self.phase_error("resume ticket"));
        }

        let mut ordered: Vec<&TicketItem> = items.iter().collect();
        ordered.sort_by_key(|i| i.position);

        self.ticket_id = Some(ticket.id.clone());
        self.name = ticket.name.clone();
        self.customer = customer;
        self.lines = ordered.into_iter().map(CartLine::from_ticket_item).collect();
        self.phase = CartPhase::Composing;
        Ok(())
    }

    /// Snapshot used for park and checkout.
    pub fn to_ticket_draft(&self) -> TicketDraft {
        TicketDraft {
            ticket_id: self.ticket_id.clone(),
            name: self.name.clone(),
            customer_id: self.customer.as_ref().map(|c| c.id.clone()),
            lines: self.lines.clone(),
        }
    }

    /// Resets to an empty walk-in cart.
    pub fn clear(&mut self) {
        *self = Cart::new();
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    /// Moves to CheckingOut and returns the draft to persist.
    ///
    /// ## Errors
    /// - `CoreError::EmptyCart` when there are no lines
    /// - `CoreError::InvalidPhase` when a checkout is already running
    pub fn begin_checkout(&mut self) -> CoreResult<TicketDraft> {
        if self.phase == CartPhase::CheckingOut {
            return Err(self.phase_error("checkout"));
        }
        if self.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        self.phase = CartPhase::CheckingOut;
        Ok(self.to_ticket_draft())
    }

    /// The ticket was paid; the cart starts over.
    pub fn complete_checkout(&mut self) -> CoreResult<()> {
        if self.phase != CartPhase::CheckingOut {
            return Err(self.phase_error("complete checkout"));
        }
        self.clear();
        Ok(())
    }

    /// Checkout failed and was rolled back; back to composing.
    pub fn fail_checkout(&mut self) {
        if self.phase == CartPhase::CheckingOut {
            self.phase = CartPhase::Composing;
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn ensure_editable(&self, operation: &str) -> CoreResult<()> {
        if self.phase == CartPhase::CheckingOut {
            return Err(self.phase_error(operation));
        }
        Ok(())
    }

    fn phase_error(&self, operation: &str) -> CoreError {
        CoreError::InvalidPhase {
            operation: operation.to_string(),
            phase: self.phase.as_str().to_string(),
        }
    }

    fn refresh_phase(&mut self) {
        if self.phase == CartPhase::CheckingOut {
            return;
        }
        let untouched =
            self.lines.is_empty() && self.customer.is_none() && self.ticket_id.is_none();
        self.phase = if untouched {
            CartPhase::Empty
        } else {
            CartPhase::Composing
        };
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketStatus;
    use chrono::Utc;

    fn product_item(id: &str, price: i64) -> LineItem {
        LineItem {
            resolved_id: id.to_string(),
            item_type: ItemType::Product,
            product_id: Some(id.to_string()),
            service_id: None,
            variant_id: None,
            name: format!("Product {id}"),
            unit_price_cents: price,
            unit_cost_cents: price / 2,
            duration_minutes: None,
        }
    }

    fn service_item(variant_id: &str, price: i64) -> LineItem {
        LineItem {
            resolved_id: variant_id.to_string(),
            item_type: ItemType::Service,
            product_id: None,
            service_id: Some("svc".to_string()),
            variant_id: Some(variant_id.to_string()),
            name: "Full Detail".to_string(),
            unit_price_cents: price,
            unit_cost_cents: 0,
            duration_minutes: Some(90),
        }
    }

    fn crew(id: &str) -> CrewMember {
        CrewMember {
            employee_id: id.to_string(),
            name: format!("Emp {id}"),
        }
    }

    fn customer(name: &str) -> Customer {
        let now = Utc::now();
        Customer {
            id: "cust-1".to_string(),
            name: name.to_string(),
            phone: None,
            email: None,
            address: None,
            notes: None,
            loyalty_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn vehicle(plate: &str) -> Vehicle {
        Vehicle {
            id: format!("veh-{plate}"),
            customer_id: "cust-1".to_string(),
            plate: plate.to_string(),
            make: None,
            model: None,
            color: None,
            size: None,
        }
    }

    #[test]
    fn test_add_same_item_increments_quantity() {
        let mut cart = Cart::new();
        assert_eq!(cart.phase(), CartPhase::Empty);

        cart.add_item(product_item("p1", 100)).unwrap();
        cart.add_item(product_item("p1", 100)).unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 2);
        assert_eq!(cart.phase(), CartPhase::Composing);
    }

    #[test]
    fn test_update_quantity_rules() {
        let mut cart = Cart::new();
        cart.add_item(product_item("p1", 100)).unwrap();

        assert!(!cart.update_quantity("p1", -3).unwrap());
        assert_eq!(cart.lines()[0].quantity, 1);

        assert!(cart.update_quantity("p1", 4).unwrap());
        assert_eq!(cart.lines()[0].quantity, 4);

        assert!(cart.update_quantity("p1", 0).unwrap());
        assert!(cart.is_empty());
        assert_eq!(cart.phase(), CartPhase::Empty);

        assert!(matches!(
            cart.update_quantity("missing", 1),
            Err(CoreError::LineNotFound(_))
        ));
    }

    #[test]
    fn test_assign_crew_toggles_and_rejects_products() {
        let mut cart = Cart::new();
        cart.add_item(service_item("v1", 500)).unwrap();
        cart.add_item(product_item("p1", 100)).unwrap();

        assert!(cart.assign_crew("v1", crew("a")).unwrap());
        assert!(cart.assign_crew("v1", crew("b")).unwrap());
        assert!(!cart.assign_crew("v1", crew("a")).unwrap());
        assert_eq!(cart.line("v1").unwrap().crew, vec![crew("b")]);

        assert!(matches!(
            cart.assign_crew("p1", crew("a")),
            Err(CoreError::CrewNotAllowed(_))
        ));
    }

    #[test]
    fn test_set_customer_names_ticket() {
        let mut cart = Cart::new();
        let alice = customer("Alice");

        let one = [vehicle("ABC 123")];
        cart.set_customer(Some((&alice, &one[..]))).unwrap();
        assert_eq!(cart.name(), "Alice - ABC 123");

        let two = [vehicle("ABC 123"), vehicle("XYZ 9")];
        cart.set_customer(Some((&alice, &two[..]))).unwrap();
        assert_eq!(cart.name(), "Alice");

        cart.set_customer(None).unwrap();
        assert_eq!(cart.name(), WALK_IN);
        assert!(cart.customer().is_none());
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::new();
        cart.add_quantity(product_item("p1", 1000), 2).unwrap();
        cart.add_item(service_item("v1", 500)).unwrap();

        let totals = cart.totals(TaxRate::from_bps(1200));
        assert_eq!(totals.subtotal.cents(), 2500);
        assert_eq!(totals.tax.cents(), 300);
        assert_eq!(totals.total.cents(), 2800);
    }

    #[test]
    fn test_checkout_empty_cart_is_blocked() {
        let mut cart = Cart::new();
        assert!(matches!(cart.begin_checkout(), Err(CoreError::EmptyCart)));
        assert_eq!(cart.phase(), CartPhase::Empty);
    }

    #[test]
    fn test_checkout_lifecycle() {
        let mut cart = Cart::new();
        cart.add_item(product_item("p1", 100)).unwrap();

        let draft = cart.begin_checkout().unwrap();
        assert_eq!(draft.lines.len(), 1);
        assert_eq!(cart.phase(), CartPhase::CheckingOut);
        assert!(cart.add_item(product_item("p2", 100)).is_err());

        cart.fail_checkout();
        assert_eq!(cart.phase(), CartPhase::Composing);
        assert_eq!(cart.lines().len(), 1);

        cart.begin_checkout().unwrap();
        cart.complete_checkout().unwrap();
        assert_eq!(cart.phase(), CartPhase::Empty);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_load_replaces_contents_and_keeps_item_ids() {
        let now = Utc::now();
        let ticket = Ticket {
            id: "t-1".to_string(),
            name: "Bob - QQQ 1".to_string(),
            status: TicketStatus::Pending,
            subtotal_cents: 500,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 500,
            payment_method: None,
            customer_id: None,
            created_at: now,
            updated_at: now,
        };
        let item = TicketItem {
            id: "item-9".to_string(),
            ticket_id: "t-1".to_string(),
            item_type: ItemType::Service,
            product_id: None,
            service_id: Some("svc".to_string()),
            variant_id: Some("v1".to_string()),
            name: "Full Detail".to_string(),
            quantity: 1,
            unit_price_cents: 500,
            unit_cost_cents: 0,
            duration_minutes: None,
            crew: vec![crew("a")],
            commission_cents: None,
            position: 0,
            created_at: now,
            updated_at: now,
        };

        let mut cart = Cart::new();
        cart.add_item(product_item("p1", 100)).unwrap();
        cart.load(&ticket, &[item], None).unwrap();

        assert_eq!(cart.ticket_id(), Some("t-1"));
        assert_eq!(cart.name(), "Bob - QQQ 1");
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].id, "v1");
        assert_eq!(cart.lines()[0].item_id.as_deref(), Some("item-9"));
        assert_eq!(cart.lines()[0].crew.len(), 1);
    }
}
