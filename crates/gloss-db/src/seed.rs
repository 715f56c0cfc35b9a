//! # Demo Data
//!
//! A small detailing shop: a few consumables, services that use them, one
//! crew role with a commission-paid detailer and a customer with a car.
//! Shared by the `seed` binary and by tests in this and dependent crates.
//!
//! ```text
//! Consumables            Services                          Staff
//! ─────────────          ─────────────────────────         ─────────────────
//! Carnauba Wax  (20)     Full Detail                       Detailer role
//! Car Shampoo    (5)       ├── Sedan  1× Wax, 1× Shampoo     tag: pos_crew
//! Ceramic Coat   (1)       └── SUV    2× Wax, 1× Shampoo   Dana (10% comm.)
//!                        Ceramic Coating
//!                          └── Single Layer 2× Ceramic     Customer
//!                        Exterior Wash (Standard, 500)     Ana Cruz, ABC 123
//! ```

use gloss_core::service::{RecipeInput, ServiceDraft, VariantDraft};
use gloss_core::{Compensation, EmployeeStatus, PayType, POS_CREW_TAG};
use tracing::info;

use crate::error::DbResult;
use crate::repository::category::CategoryInput;
use crate::repository::customer::{CustomerInput, VehicleInput};
use crate::repository::employee::EmployeeInput;
use crate::repository::product::{NewProduct, ProductInput};
use crate::repository::role::RoleInput;
use crate::store::LocalStore;

/// Ids of the seeded rows.
#[derive(Debug, Clone)]
pub struct DemoData {
    pub category_id: String,
    /// 20 in stock, threshold 5, price 1 500.
    pub wax_id: String,
    /// 5 in stock, price 100.
    pub shampoo_id: String,
    /// 1 in stock.
    pub ceramic_id: String,
    /// Two explicit variants, both consuming wax.
    pub detail_service_id: String,
    pub detail_sedan_variant_id: String,
    /// Single variant priced 200 that needs 2 ceramic.
    pub coating_service_id: String,
    pub coating_variant_id: String,
    /// No labor cost; one Standard variant priced 500.
    pub wash_service_id: String,
    pub wash_variant_id: String,
    pub crew_role_id: String,
    /// Commission plan at 10%.
    pub detailer_id: String,
    pub customer_id: String,
}

fn product(name: &str, sku: &str, price_cents: i64, cost_cents: i64, category_id: &str) -> ProductInput {
    ProductInput {
        name: name.to_string(),
        sku: Some(sku.to_string()),
        price_cents,
        cost_cents,
        volume: None,
        category_id: Some(category_id.to_string()),
        show_in_pos: true,
        image_url: None,
    }
}

fn recipe(product_id: &str, quantity: i64) -> RecipeInput {
    RecipeInput {
        product_id: product_id.to_string(),
        quantity,
    }
}

fn variant(name: &str, price_cents: i64, minutes: i64, recipe: Vec<RecipeInput>) -> VariantDraft {
    VariantDraft {
        id: None,
        name: name.to_string(),
        sku: None,
        price_cents,
        duration_minutes: Some(minutes),
        recipe,
    }
}

/// Populates an empty store.
pub async fn seed_demo(store: &LocalStore) -> DbResult<DemoData> {
    let category = store
        .categories()
        .create(CategoryInput {
            name: "Detailing".to_string(),
            description: Some("Consumables and detailing services".to_string()),
        })
        .await?;

    let stocked = |input: ProductInput, stock: i64, threshold: i64| NewProduct {
        product: input,
        initial_stock: Some(stock),
        low_stock_threshold: Some(threshold),
    };

    let wax = store
        .products()
        .create(
            stocked(product("Carnauba Wax", "WAX-001", 1_500, 600, &category.id), 20, 5),
            None,
        )
        .await?;
    let shampoo = store
        .products()
        .create(
            stocked(product("Car Shampoo", "SHP-001", 100, 40, &category.id), 5, 2),
            None,
        )
        .await?;
    let ceramic = store
        .products()
        .create(
            stocked(product("Ceramic Coat", "CER-001", 4_000, 2_500, &category.id), 1, 1),
            None,
        )
        .await?;

    let detail = store
        .services()
        .create(ServiceDraft {
            name: "Full Detail".to_string(),
            description: Some("Interior and exterior".to_string()),
            category_id: Some(category.id.clone()),
            price_cents: 8_000,
            labor_cost: None,
            duration_minutes: Some(120),
            show_in_pos: true,
            base_recipe: Vec::new(),
            variants: vec![
                variant("Sedan", 8_000, 120, vec![recipe(&wax.id, 1), recipe(&shampoo.id, 1)]),
                variant("SUV", 10_000, 150, vec![recipe(&wax.id, 2), recipe(&shampoo.id, 1)]),
            ],
        })
        .await?;

    let coating = store
        .services()
        .create(ServiceDraft {
            name: "Ceramic Coating".to_string(),
            description: None,
            category_id: Some(category.id.clone()),
            price_cents: 200,
            labor_cost: None,
            duration_minutes: Some(240),
            show_in_pos: true,
            base_recipe: Vec::new(),
            variants: vec![variant("Single Layer", 200, 240, vec![recipe(&ceramic.id, 2)])],
        })
        .await?;

    let wash = store
        .services()
        .create(ServiceDraft {
            name: "Exterior Wash".to_string(),
            description: None,
            category_id: Some(category.id.clone()),
            price_cents: 500,
            labor_cost: None,
            duration_minutes: Some(30),
            show_in_pos: true,
            base_recipe: Vec::new(),
            variants: Vec::new(),
        })
        .await?;

    let role = store
        .roles()
        .create(RoleInput {
            name: "detailer".to_string(),
            display_name: "Detailer".to_string(),
            permissions: vec!["pos.checkout".to_string()],
            tags: vec![POS_CREW_TAG.to_string()],
        })
        .await?;

    let detailer = store
        .employees()
        .create(EmployeeInput {
            name: "Dana Reyes".to_string(),
            username: Some("dana".to_string()),
            role_id: Some(role.id.clone()),
            phone: None,
            email: None,
            status: EmployeeStatus::Active,
            compensation: Compensation {
                pay_type: PayType::Commission,
                pay_rate_cents: 0,
                commission_bps: 1_000,
            },
        })
        .await?;

    let customer = store
        .customers()
        .create(
            CustomerInput {
                name: "Ana Cruz".to_string(),
                phone: Some("555-0100".to_string()),
                email: None,
                address: None,
                notes: None,
                loyalty_points: 0,
            },
            vec![VehicleInput {
                plate: "ABC 123".to_string(),
                make: Some("Toyota".to_string()),
                model: Some("Corolla".to_string()),
                color: Some("White".to_string()),
                size: Some("sedan".to_string()),
            }],
        )
        .await?;

    let first_variant = |detail: &gloss_core::service::ServiceDetail| {
        detail
            .variants
            .first()
            .map(|v| v.variant.id.clone())
            .unwrap_or_default()
    };

    let demo = DemoData {
        category_id: category.id,
        wax_id: wax.id,
        shampoo_id: shampoo.id,
        ceramic_id: ceramic.id,
        detail_sedan_variant_id: first_variant(&detail),
        detail_service_id: detail.service.id,
        coating_variant_id: first_variant(&coating),
        coating_service_id: coating.service.id,
        wash_variant_id: first_variant(&wash),
        wash_service_id: wash.service.id,
        crew_role_id: role.id,
        detailer_id: detailer.id,
        customer_id: customer.customer.id,
    };

    info!(products = 3, services = 3, "Demo data seeded");
    Ok(demo)
}
