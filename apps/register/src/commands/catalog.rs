//! # Catalog Commands
//!
//! Products, services and categories. Listings return the derived views
//! (stock, availability, costing) so the POS grid never joins on its own.

use tracing::debug;

use gloss_core::service::{ServiceDetail, ServiceDraft};
use gloss_core::views::{ProductView, ServiceView};
use gloss_core::{Category, Product};
use gloss_db::{CategoryInput, NewProduct, ProductInput};

use crate::commands::report_write;
use crate::error::ApiError;
use crate::Shell;

// =============================================================================
// Products
// =============================================================================

pub async fn list_products(shell: &Shell) -> Result<Vec<ProductView>, ApiError> {
    Ok(shell.store.products().views().await?)
}

/// Name / SKU search over active products.
pub async fn search_products(
    shell: &Shell,
    query: &str,
    limit: Option<u32>,
) -> Result<Vec<Product>, ApiError> {
    let limit = limit.unwrap_or(20).clamp(1, 100);
    debug!(%query, limit, "search_products command");
    Ok(shell.store.products().search(query, limit).await?)
}

/// Creates a product; an opening stock writes an `initial_stock` log entry
/// stamped with the signed-in user.
pub async fn create_product(shell: &Shell, new: NewProduct) -> Result<Product, ApiError> {
    let actor = shell.actor();
    let result = shell.store.products().create(new, actor.as_ref()).await;
    report_write(shell, "Create product", result, |p| format!("{} created", p.name))
}

pub async fn update_product(
    shell: &Shell,
    product_id: &str,
    input: ProductInput,
) -> Result<Product, ApiError> {
    let result = shell.store.products().update(product_id, input).await;
    report_write(shell, "Update product", result, |p| format!("{} saved", p.name))
}

/// Hides a product from sale without touching recipes or history.
pub async fn deactivate_product(shell: &Shell, product_id: &str) -> Result<Product, ApiError> {
    let result = shell.store.products().deactivate(product_id).await;
    report_write(shell, "Deactivate product", result, |p| {
        format!("{} hidden from sale", p.name)
    })
}

/// Deletes a product together with the recipe lines and inventory row
/// that reference it, all or nothing.
pub async fn delete_product(shell: &Shell, product_id: &str) -> Result<(), ApiError> {
    let result = shell.store.products().delete(product_id).await;
    report_write(shell, "Delete product", result, |_| "Product deleted".to_string())
}

// =============================================================================
// Services
// =============================================================================

pub async fn list_services(shell: &Shell) -> Result<Vec<ServiceView>, ApiError> {
    Ok(shell.store.services().views().await?)
}

pub async fn get_service(shell: &Shell, service_id: &str) -> Result<ServiceDetail, ApiError> {
    shell
        .store
        .services()
        .get(service_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service", service_id))
}

/// Saves a new service. Without variants it gets a single Standard
/// variant carrying the base price and recipe.
pub async fn create_service(shell: &Shell, draft: ServiceDraft) -> Result<ServiceDetail, ApiError> {
    let result = shell.store.services().create(draft).await;
    report_write(shell, "Create service", result, |d| {
        format!("{} created with {} variants", d.service.name, d.variants.len())
    })
}

pub async fn update_service(
    shell: &Shell,
    service_id: &str,
    draft: ServiceDraft,
) -> Result<ServiceDetail, ApiError> {
    let result = shell.store.services().update(service_id, draft).await;
    report_write(shell, "Update service", result, |d| format!("{} saved", d.service.name))
}

pub async fn delete_service(shell: &Shell, service_id: &str) -> Result<(), ApiError> {
    let result = shell.store.services().delete(service_id).await;
    report_write(shell, "Delete service", result, |_| "Service deleted".to_string())
}

// =============================================================================
// Categories
// =============================================================================

pub async fn list_categories(shell: &Shell) -> Result<Vec<Category>, ApiError> {
    Ok(shell.store.categories().list().await?)
}

pub async fn create_category(shell: &Shell, input: CategoryInput) -> Result<Category, ApiError> {
    let result = shell.store.categories().create(input).await;
    report_write(shell, "Create category", result, |c| format!("{} created", c.name))
}

pub async fn update_category(
    shell: &Shell,
    category_id: &str,
    input: CategoryInput,
) -> Result<Category, ApiError> {
    let result = shell.store.categories().update(category_id, input).await;
    report_write(shell, "Update category", result, |c| format!("{} saved", c.name))
}

/// Deletes a category; products and services in it become uncategorized.
pub async fn delete_category(shell: &Shell, category_id: &str) -> Result<(), ApiError> {
    let result = shell.store.categories().delete(category_id).await;
    report_write(shell, "Delete category", result, |_| "Category deleted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::notify::NotificationLevel;
    use crate::testing::fixture;

    fn product_input(name: &str, sku: &str) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            sku: Some(sku.to_string()),
            price_cents: 900,
            cost_cents: 300,
            volume: None,
            category_id: None,
            show_in_pos: true,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_product_with_opening_stock_is_logged_with_actor() {
        let fx = fixture().await;
        let product = create_product(
            &fx.shell,
            NewProduct {
                product: product_input("Tire Shine", "TS-01"),
                initial_stock: Some(12),
                low_stock_threshold: Some(3),
            },
        )
        .await
        .unwrap();

        let logs = fx
            .shell
            .store
            .inventory_logs()
            .list(&gloss_core::ledger::LogFilter {
                product_id: Some(product.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].quantity_after, 12);
        assert_eq!(logs[0].employee_name.as_deref(), Some("Rosa"));
        assert_eq!(fx.notes.last().unwrap().level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn test_negative_price_is_rejected_before_write() {
        let fx = fixture().await;
        let mut input = product_input("Bad Price", "BP-01");
        input.price_cents = -1;
        let before = fx.shell.store.outbox().count_pending().await.unwrap();

        let err = create_product(
            &fx.shell,
            NewProduct {
                product: input,
                initial_stock: None,
                low_stock_threshold: None,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(fx.notes.last().unwrap().code, Some(ErrorCode::ValidationError));
        assert_eq!(fx.shell.store.outbox().count_pending().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_recipe_product_updates_service_view() {
        let fx = fixture().await;
        delete_product(&fx.shell, &fx.demo.ceramic_id).await.unwrap();

        let coating = get_service(&fx.shell, &fx.demo.coating_service_id).await.unwrap();
        assert!(coating.variants[0].recipe.is_empty());
        assert!(fx.shell.store.inventory().get(&fx.demo.ceramic_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivated_product_cannot_be_added() {
        let fx = fixture().await;
        deactivate_product(&fx.shell, &fx.demo.wax_id).await.unwrap();

        let err = crate::commands::cart::add_product(&fx.shell, &fx.demo.wax_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_service_without_variants_gets_standard() {
        let fx = fixture().await;
        let detail = create_service(
            &fx.shell,
            ServiceDraft {
                name: "Engine Bay Clean".to_string(),
                description: None,
                category_id: None,
                price_cents: 1_500,
                labor_cost: None,
                duration_minutes: Some(45),
                show_in_pos: true,
                base_recipe: Vec::new(),
                variants: Vec::new(),
            },
        )
        .await
        .unwrap();

        assert_eq!(detail.variants.len(), 1);
        assert_eq!(detail.variants[0].variant.name, gloss_core::STANDARD_VARIANT_NAME);
        assert_eq!(detail.variants[0].variant.price_cents, 1_500);
    }
}
