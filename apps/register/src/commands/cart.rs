//! # Cart Commands
//!
//! Composition of the active order. Nothing here touches the store except
//! to look up what is being added.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Lifecycle                                       │
//! │                                                                         │
//! │  ┌──────────┐  add_product   ┌───────────┐  checkout   ┌─────────────┐  │
//! │  │  Empty   │──add_service──►│ Composing │────────────►│ CheckingOut │  │
//! │  └──────────┘                └───────────┘◄── error ───└─────────────┘  │
//! │       ▲                        │  ▲    │                     │          │
//! │       │                 park   │  │ resume                   │ paid     │
//! │       │                        ▼  │                          │          │
//! │       │                  ┌──────────────┐                    │          │
//! │       └──────────────────│ PENDING rows │                    │          │
//! │                          └──────────────┘                    │          │
//! │       ▲                                                      │          │
//! │       └──────────────────────────────────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tracing::debug;

use gloss_core::cart::{Cart, CartTotals, LineItem};
use gloss_core::{CrewMember, Employee};

use crate::commands::report;
use crate::error::ApiError;
use crate::Shell;

/// The cart with totals at the stored tax rate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub cart: Cart,
    pub totals: CartTotals,
    /// `totals.total` formatted for the display
    pub total_display: String,
}

pub(crate) async fn respond(shell: &Shell, cart: &Cart) -> Result<CartResponse, ApiError> {
    let tax_rate = shell.store.settings().tax_rate().await?;
    let totals = cart.totals(tax_rate);
    Ok(CartResponse {
        cart: cart.clone(),
        totals,
        total_display: shell.config().format_currency(totals.total.cents()),
    })
}

pub async fn get_cart(shell: &Shell) -> Result<CartResponse, ApiError> {
    let cart = shell.register.snapshot().await;
    respond(shell, &cart).await
}

// =============================================================================
// Composition
// =============================================================================

/// Adds `quantity` (default 1) of a product.
pub async fn add_product(
    shell: &Shell,
    product_id: &str,
    quantity: Option<i64>,
) -> Result<CartResponse, ApiError> {
    let quantity = quantity.unwrap_or(1);
    debug!(%product_id, quantity, "add_product command");

    let result: Result<CartResponse, ApiError> = async {
        let product = shell
            .store
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Product", product_id))?;
        if !product.is_active {
            return Err(ApiError::validation(format!(
                "{} is not available for sale",
                product.name
            )));
        }

        let mut cart = shell.register.lock().await;
        cart.add_quantity(LineItem::product(&product), quantity)?;
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Add item", result, |r| {
        format!("{} lines, total {}", r.cart.lines().len(), r.total_display)
    })
}

/// Adds one unit of a service. `variant_id` may be omitted only when the
/// service has a single variant.
pub async fn add_service(
    shell: &Shell,
    service_id: &str,
    variant_id: Option<&str>,
) -> Result<CartResponse, ApiError> {
    debug!(%service_id, ?variant_id, "add_service command");

    let result: Result<CartResponse, ApiError> = async {
        let detail = shell
            .store
            .services()
            .get(service_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Service", service_id))?;
        let catalog = shell.store.catalog().await?;
        let item = LineItem::service(&detail, variant_id, &catalog.products)?;

        let mut cart = shell.register.lock().await;
        cart.add_item(item)?;
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Add service", result, |r| {
        format!("{} lines, total {}", r.cart.lines().len(), r.total_display)
    })
}

/// Sets a line's quantity; `0` removes it.
pub async fn update_line_quantity(
    shell: &Shell,
    line_id: &str,
    quantity: i64,
) -> Result<CartResponse, ApiError> {
    let result: Result<CartResponse, ApiError> = async {
        let mut cart = shell.register.lock().await;
        if !cart.update_quantity(line_id, quantity)? {
            return Err(ApiError::validation("Quantity cannot be negative"));
        }
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Update quantity", result, |r| {
        format!("Total {}", r.total_display)
    })
}

pub async fn remove_line(shell: &Shell, line_id: &str) -> Result<CartResponse, ApiError> {
    let result: Result<CartResponse, ApiError> = async {
        let mut cart = shell.register.lock().await;
        if !cart.remove_item(line_id)? {
            return Err(ApiError::not_found("Cart line", line_id));
        }
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Remove item", result, |r| {
        format!("Total {}", r.total_display)
    })
}

/// Toggles an employee on a service line's crew.
///
/// Only crew candidates (active, role tagged for crew work) can be added.
/// Someone already on the line can always be taken off, even after they
/// were deactivated or lost the crew role.
pub async fn toggle_crew(
    shell: &Shell,
    line_id: &str,
    employee_id: &str,
) -> Result<CartResponse, ApiError> {
    let result: Result<(bool, String, CartResponse), ApiError> = async {
        let mut cart = shell.register.lock().await;
        let on_line = cart
            .line(line_id)
            .and_then(|l| l.crew.iter().find(|c| c.employee_id == employee_id))
            .cloned();

        let member = match on_line {
            Some(member) => member,
            None => {
                let candidates = shell.store.employees().crew_candidates().await?;
                let employee = candidates
                    .into_iter()
                    .find(|e| e.id == employee_id)
                    .ok_or_else(|| ApiError::validation("Employee cannot be assigned as crew"))?;
                CrewMember {
                    employee_id: employee.id,
                    name: employee.name,
                }
            }
        };

        let name = member.name.clone();
        let assigned = cart.assign_crew(line_id, member)?;
        debug!(%line_id, %employee_id, assigned, "Crew toggled");
        Ok((assigned, name, respond(shell, &cart).await?))
    }
    .await;

    report(shell, "Assign crew", result, |(assigned, name, _)| {
        if *assigned {
            format!("{name} assigned")
        } else {
            format!("{name} removed")
        }
    })
    .map(|(_, _, response)| response)
}

/// Attaches a customer (and derives the ticket name), or detaches with
/// `None`.
pub async fn set_customer(
    shell: &Shell,
    customer_id: Option<&str>,
) -> Result<CartResponse, ApiError> {
    let result: Result<CartResponse, ApiError> = async {
        let found = match customer_id {
            Some(id) => Some(
                shell
                    .store
                    .customers()
                    .with_vehicles(id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Customer", id))?,
            ),
            None => None,
        };

        let mut cart = shell.register.lock().await;
        cart.set_customer(
            found
                .as_ref()
                .map(|c| (&c.customer, c.vehicles.as_slice())),
        )?;
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Customer", result, |r| r.cart.name().to_string())
}

pub async fn rename_ticket(shell: &Shell, name: &str) -> Result<CartResponse, ApiError> {
    let result: Result<CartResponse, ApiError> = async {
        let mut cart = shell.register.lock().await;
        cart.set_name(name)?;
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Rename", result, |r| r.cart.name().to_string())
}

/// Discards the active cart. A parked ticket it was loaded from stays
/// parked.
pub async fn clear_cart(shell: &Shell) -> Result<CartResponse, ApiError> {
    let result: Result<CartResponse, ApiError> = async {
        let mut cart = shell.register.lock().await;
        if cart.phase() == gloss_core::cart::CartPhase::CheckingOut {
            return Err(ApiError::cart("Cannot clear the cart during checkout"));
        }
        cart.clear();
        respond(shell, &cart).await
    }
    .await;

    report(shell, "Clear cart", result, |_| "Cart cleared".to_string())
}

/// Employees that can be put on a service line.
pub async fn crew_candidates(shell: &Shell) -> Result<Vec<Employee>, ApiError> {
    Ok(shell.store.employees().crew_candidates().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::notify::NotificationLevel;
    use crate::testing::fixture;
    use gloss_core::cart::CartPhase;
    use gloss_core::EmployeeStatus;
    use gloss_db::EmployeeInput;

    #[tokio::test]
    async fn test_add_product_twice_bumps_one_line() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.shampoo_id, None).await.unwrap();
        let response = add_product(&fx.shell, &fx.demo.shampoo_id, Some(2)).await.unwrap();

        assert_eq!(response.cart.lines().len(), 1);
        assert_eq!(response.cart.lines()[0].quantity, 3);
        assert_eq!(response.cart.phase(), CartPhase::Composing);
        assert_eq!(fx.notes.len(), 2);
    }

    #[tokio::test]
    async fn test_add_unknown_product_notifies_error() {
        let fx = fixture().await;
        let err = add_product(&fx.shell, "missing", None).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(fx.notes.last().unwrap().level, NotificationLevel::Error);
        assert!(fx.shell.register.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_multi_variant_service_requires_variant() {
        let fx = fixture().await;
        let err = add_service(&fx.shell, &fx.demo.detail_service_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::VariantRequired);

        let response = add_service(
            &fx.shell,
            &fx.demo.detail_service_id,
            Some(&fx.demo.detail_sedan_variant_id),
        )
        .await
        .unwrap();
        assert_eq!(response.cart.lines()[0].id, fx.demo.detail_sedan_variant_id);
    }

    #[tokio::test]
    async fn test_crew_toggle_on_service_line() {
        let fx = fixture().await;
        add_service(&fx.shell, &fx.demo.wash_service_id, None).await.unwrap();
        let line_id = fx.demo.wash_variant_id.clone();

        let on = toggle_crew(&fx.shell, &line_id, &fx.demo.detailer_id).await.unwrap();
        assert_eq!(on.cart.lines()[0].crew.len(), 1);

        let off = toggle_crew(&fx.shell, &line_id, &fx.demo.detailer_id).await.unwrap();
        assert!(off.cart.lines()[0].crew.is_empty());
    }

    #[tokio::test]
    async fn test_deactivated_crew_can_still_be_removed() {
        let fx = fixture().await;
        add_service(&fx.shell, &fx.demo.wash_service_id, None).await.unwrap();
        let line_id = fx.demo.wash_variant_id.clone();
        toggle_crew(&fx.shell, &line_id, &fx.demo.detailer_id).await.unwrap();

        let employees = fx.shell.store.employees();
        let dana = employees.get(&fx.demo.detailer_id).await.unwrap().unwrap();
        employees
            .update(
                &dana.id,
                EmployeeInput {
                    name: dana.name.clone(),
                    username: dana.username.clone(),
                    role_id: dana.role_id.clone(),
                    phone: dana.phone.clone(),
                    email: dana.email.clone(),
                    status: EmployeeStatus::Inactive,
                    compensation: dana.compensation.clone(),
                },
            )
            .await
            .unwrap();

        let off = toggle_crew(&fx.shell, &line_id, &fx.demo.detailer_id).await.unwrap();
        assert!(off.cart.lines()[0].crew.is_empty());
        assert_eq!(fx.notes.last().unwrap().message, "Dana Reyes removed");

        let err = toggle_crew(&fx.shell, &line_id, &fx.demo.detailer_id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_crew_on_product_line_is_rejected() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.wax_id, None).await.unwrap();

        let err = toggle_crew(&fx.shell, &fx.demo.wax_id, &fx.demo.detailer_id)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CartError);
    }

    #[tokio::test]
    async fn test_customer_attach_and_detach() {
        let fx = fixture().await;
        let attached = set_customer(&fx.shell, Some(&fx.demo.customer_id)).await.unwrap();
        assert_ne!(attached.cart.name(), gloss_core::WALK_IN);
        assert!(attached.cart.customer().is_some());

        let detached = set_customer(&fx.shell, None).await.unwrap();
        assert_eq!(detached.cart.name(), gloss_core::WALK_IN);
    }

    #[tokio::test]
    async fn test_zero_quantity_removes_line() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.shampoo_id, None).await.unwrap();

        let response = update_line_quantity(&fx.shell, &fx.demo.shampoo_id, 0)
            .await
            .unwrap();
        assert!(response.cart.is_empty());
        assert_eq!(response.cart.phase(), CartPhase::Empty);
    }
}
