//! # Derived View Builders
//!
//! Pure joins over a [`CatalogSnapshot`]. Live queries in gloss-db load the
//! raw rows, build a snapshot and hand it here; the same inputs always give
//! the same views, in the same order as the input rows.
//!
//! ## Views
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TicketView   ticket + items (resolved names, commission, shares)       │
//! │               customer name or "Walk-in"                                │
//! │                                                                         │
//! │  ProductView  product + category + stock (defaults 0 / 10)              │
//! │               + availability                                            │
//! │                                                                         │
//! │  ServiceView  service + variants                                        │
//! │               each variant: recipe lines with product names,            │
//! │                             cost breakdown, availability                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cost Breakdown
//! ```text
//! material = Σ line.quantity × product.cost
//! labor    = Fixed amount  |  price × bps
//! profit   = price − material − labor
//! margin   = profit / price        (0 when price <= 0)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::{
    product_availability, recipe_availability, service_availability, Availability,
    InventorySnapshot, ServiceAvailability, StockLevel,
};
use crate::commission::{resolve_commission, split_commission, CommissionShare};
use crate::money::Money;
use crate::service::{is_implicit_standard, ServiceDetail};
use crate::types::{
    Category, Customer, Employee, Inventory, ItemType, LaborCost, Product, RecipeLine, Service,
    ServiceVariant, Ticket, TicketItem,
};
use crate::WALK_IN;

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// Everything the view builders may look up, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub products: HashMap<String, Product>,
    pub categories: HashMap<String, Category>,
    pub inventory: InventorySnapshot,
    pub services: HashMap<String, Service>,
    pub employees: HashMap<String, Employee>,
    pub customers: HashMap<String, Customer>,
}

fn by_id<T, F>(rows: Vec<T>, key: F) -> HashMap<String, T>
where
    F: Fn(&T) -> String,
{
    rows.into_iter().map(|row| (key(&row), row)).collect()
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(mut self, rows: Vec<Product>) -> Self {
        self.products = by_id(rows, |p| p.id.clone());
        self
    }

    pub fn with_categories(mut self, rows: Vec<Category>) -> Self {
        self.categories = by_id(rows, |c| c.id.clone());
        self
    }

    pub fn with_inventory(mut self, rows: &[Inventory]) -> Self {
        self.inventory = InventorySnapshot::from_rows(rows);
        self
    }

    pub fn with_services(mut self, rows: Vec<Service>) -> Self {
        self.services = by_id(rows, |s| s.id.clone());
        self
    }

    pub fn with_employees(mut self, rows: Vec<Employee>) -> Self {
        self.employees = by_id(rows, |e| e.id.clone());
        self
    }

    pub fn with_customers(mut self, rows: Vec<Customer>) -> Self {
        self.customers = by_id(rows, |c| c.id.clone());
        self
    }
}

// =============================================================================
// Costing
// =============================================================================

/// Σ quantity × unit cost. Ingredients missing from `products` cost nothing.
pub fn material_cost(recipe: &[RecipeLine], products: &HashMap<String, Product>) -> Money {
    recipe
        .iter()
        .map(|line| {
            products
                .get(&line.product_id)
                .map(|p| p.cost().multiply_quantity(line.quantity))
                .unwrap_or_default()
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostBreakdown {
    pub price: Money,
    pub material: Money,
    pub labor: Money,
    pub profit: Money,
    /// profit / price as a fraction.
    pub margin: f64,
}

pub fn cost_breakdown(
    price: Money,
    recipe: &[RecipeLine],
    labor_cost: Option<LaborCost>,
    products: &HashMap<String, Product>,
) -> CostBreakdown {
    let material = material_cost(recipe, products);
    let labor = labor_cost
        .map(|l| l.amount_for(price))
        .unwrap_or_default();
    let profit = price - material - labor;
    let margin = if price.is_positive() {
        profit.cents() as f64 / price.cents() as f64
    } else {
        0.0
    };

    CostBreakdown {
        price,
        material,
        labor,
        profit,
        margin,
    }
}

// =============================================================================
// Ticket View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TicketItemView {
    pub item: TicketItem,
    /// Current catalog name, or the name captured at sale time.
    pub display_name: String,
    pub line_total: Money,
    pub commission: Money,
    pub shares: Vec<CommissionShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TicketView {
    pub ticket: Ticket,
    pub customer_name: String,
    pub items: Vec<TicketItemView>,
    pub total_commission: Money,
}

pub fn build_ticket_view(
    ticket: &Ticket,
    items: &[TicketItem],
    catalog: &CatalogSnapshot,
) -> TicketView {
    let customer_name = ticket
        .customer_id
        .as_ref()
        .and_then(|id| catalog.customers.get(id))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| WALK_IN.to_string());

    let mut ordered: Vec<&TicketItem> = items.iter().collect();
    ordered.sort_by_key(|i| i.position);

    let items: Vec<TicketItemView> = ordered
        .into_iter()
        .map(|item| {
            let service = item
                .service_id
                .as_ref()
                .and_then(|id| catalog.services.get(id));
            let commission = resolve_commission(item, service, &catalog.employees);
            let display_name = match item.item_type {
                ItemType::Product => item
                    .product_id
                    .as_ref()
                    .and_then(|id| catalog.products.get(id))
                    .map(|p| p.name.clone()),
                ItemType::Service => None,
            }
            .unwrap_or_else(|| item.name.clone());

            TicketItemView {
                display_name,
                line_total: item.line_total(),
                commission,
                shares: split_commission(commission, &item.crew),
                item: item.clone(),
            }
        })
        .collect();

    let total_commission = items.iter().map(|i| i.commission).sum();

    TicketView {
        ticket: ticket.clone(),
        customer_name,
        items,
        total_commission,
    }
}

// =============================================================================
// Product View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductView {
    pub product: Product,
    pub category: Option<Category>,
    pub stock: StockLevel,
    pub availability: Availability,
}

pub fn build_product_views(products: &[Product], catalog: &CatalogSnapshot) -> Vec<ProductView> {
    products
        .iter()
        .map(|product| ProductView {
            category: product
                .category_id
                .as_ref()
                .and_then(|id| catalog.categories.get(id))
                .cloned(),
            stock: catalog.inventory.level(&product.id),
            availability: product_availability(&product.id, &catalog.inventory),
            product: product.clone(),
        })
        .collect()
}

// =============================================================================
// Service View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecipeLineView {
    pub line: RecipeLine,
    /// `None` when the product no longer exists.
    pub product_name: Option<String>,
    pub line_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantView {
    pub variant: ServiceVariant,
    pub recipe: Vec<RecipeLineView>,
    pub cost: CostBreakdown,
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceView {
    pub service: Service,
    pub category: Option<Category>,
    pub variants: Vec<VariantView>,
    /// Hide the variant editor: the only variant is Standard.
    pub implicit_standard: bool,
    pub availability: ServiceAvailability,
}

pub fn build_service_views(
    services: &[ServiceDetail],
    catalog: &CatalogSnapshot,
) -> Vec<ServiceView> {
    services
        .iter()
        .map(|detail| build_service_view(detail, catalog))
        .collect()
}

pub fn build_service_view(detail: &ServiceDetail, catalog: &CatalogSnapshot) -> ServiceView {
    let variants: Vec<VariantView> = detail
        .variants
        .iter()
        .map(|v| {
            let recipe = v
                .recipe
                .iter()
                .map(|line| {
                    let product = catalog.products.get(&line.product_id);
                    RecipeLineView {
                        product_name: product.map(|p| p.name.clone()),
                        line_cost: product
                            .map(|p| p.cost().multiply_quantity(line.quantity))
                            .unwrap_or_default(),
                        line: line.clone(),
                    }
                })
                .collect();

            VariantView {
                cost: cost_breakdown(
                    v.variant.price(),
                    &v.recipe,
                    detail.service.labor_cost,
                    &catalog.products,
                ),
                availability: recipe_availability(&v.recipe, &catalog.inventory),
                recipe,
                variant: v.variant.clone(),
            }
        })
        .collect();

    let stored: Vec<ServiceVariant> = detail.variants.iter().map(|v| v.variant.clone()).collect();

    ServiceView {
        service: detail.service.clone(),
        category: detail
            .service
            .category_id
            .as_ref()
            .and_then(|id| catalog.categories.get(id))
            .cloned(),
        implicit_standard: is_implicit_standard(&stored),
        availability: service_availability(&detail.recipes(), &catalog.inventory),
        variants,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CrewMember, TicketStatus};
    use chrono::Utc;

    fn product(id: &str, price: i64, cost: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            sku: None,
            price_cents: price,
            cost_cents: cost,
            volume: None,
            category_id: Some("cat".to_string()),
            show_in_pos: true,
            image_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn recipe(product_id: &str, quantity: i64) -> RecipeLine {
        RecipeLine {
            id: format!("r-{product_id}"),
            service_id: "svc".to_string(),
            variant_id: None,
            product_id: product_id.to_string(),
            quantity,
        }
    }

    fn service(labor_cost: Option<LaborCost>) -> Service {
        let now = Utc::now();
        Service {
            id: "svc".to_string(),
            name: "Full Detail".to_string(),
            description: None,
            category_id: None,
            price_cents: 10_000,
            labor_cost,
            duration_minutes: None,
            show_in_pos: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cost_breakdown() {
        let products = by_id(vec![product("wax", 0, 500), product("pad", 0, 250)], |p| {
            p.id.clone()
        });
        let lines = [recipe("wax", 2), recipe("pad", 1)];

        let cost = cost_breakdown(
            Money::from_cents(10_000),
            &lines,
            Some(LaborCost::Percentage { bps: 2000 }),
            &products,
        );
        assert_eq!(cost.material.cents(), 1250);
        assert_eq!(cost.labor.cents(), 2000);
        assert_eq!(cost.profit.cents(), 6750);
        assert!((cost.margin - 0.675).abs() < 1e-9);
    }

    #[test]
    fn test_margin_is_zero_for_free_items() {
        let cost = cost_breakdown(Money::zero(), &[], None, &HashMap::new());
        assert_eq!(cost.margin, 0.0);
    }

    #[test]
    fn test_product_view_defaults_and_order() {
        let catalog = CatalogSnapshot::new();
        let products = vec![product("b", 100, 50), product("a", 100, 50)];
        let views = build_product_views(&products, &catalog);

        assert_eq!(views[0].product.id, "b");
        assert_eq!(views[1].product.id, "a");
        assert_eq!(views[0].stock, StockLevel::new(0, 10));
        assert!(views[0].availability.is_out);
        assert!(views[0].category.is_none());
    }

    #[test]
    fn test_ticket_view_walk_in_and_commission() {
        let now = Utc::now();
        let ticket = Ticket {
            id: "t".to_string(),
            name: "Walk-in".to_string(),
            status: TicketStatus::Paid,
            subtotal_cents: 10_000,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: 10_000,
            payment_method: None,
            customer_id: Some("deleted-customer".to_string()),
            created_at: now,
            updated_at: now,
        };
        let item = TicketItem {
            id: "i".to_string(),
            ticket_id: "t".to_string(),
            item_type: ItemType::Service,
            product_id: None,
            service_id: Some("svc".to_string()),
            variant_id: None,
            name: "Full Detail".to_string(),
            quantity: 2,
            unit_price_cents: 5_000,
            unit_cost_cents: 0,
            duration_minutes: None,
            crew: vec![
                CrewMember {
                    employee_id: "a".to_string(),
                    name: "A".to_string(),
                },
                CrewMember {
                    employee_id: "b".to_string(),
                    name: "B".to_string(),
                },
            ],
            commission_cents: None,
            position: 0,
            created_at: now,
            updated_at: now,
        };

        let catalog = CatalogSnapshot::new()
            .with_services(vec![service(Some(LaborCost::Fixed { amount_cents: 801 }))]);
        let view = build_ticket_view(&ticket, &[item], &catalog);

        assert_eq!(view.customer_name, WALK_IN);
        assert_eq!(view.items[0].commission.cents(), 801);
        assert_eq!(view.items[0].shares[0].amount.cents(), 401);
        assert_eq!(view.items[0].shares[1].amount.cents(), 400);
        assert_eq!(view.items[0].line_total.cents(), 10_000);
        assert_eq!(view.total_commission.cents(), 801);
    }

    #[test]
    fn test_service_view_uses_variant_recipes() {
        let products = vec![product("wax", 0, 300)];
        let catalog = CatalogSnapshot::new().with_products(products);
        let detail = ServiceDetail::assemble(service(None), vec![], vec![recipe("wax", 2)]);

        let view = build_service_view(&detail, &catalog);
        assert!(view.implicit_standard);
        assert_eq!(view.variants.len(), 1);
        assert_eq!(view.variants[0].cost.material.cents(), 600);
        assert_eq!(
            view.variants[0].recipe[0].product_name.as_deref(),
            Some("Product wax")
        );
        assert!(view.availability.overall.is_out);
    }
}
