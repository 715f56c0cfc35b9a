//! # Customer Commands
//!
//! Customer records and the vehicles they bring in. A ticket keeps the
//! customer id after the customer is gone, so deletes never touch tickets.

use tracing::debug;

use gloss_core::{Customer, Vehicle};
use gloss_db::{CustomerInput, CustomerWithVehicles, VehicleInput};

use crate::commands::report_write;
use crate::error::ApiError;
use crate::Shell;

pub async fn list_customers(shell: &Shell) -> Result<Vec<Customer>, ApiError> {
    Ok(shell.store.customers().list().await?)
}

/// Matches name, phone or plate. A blank query returns nothing.
pub async fn search_customers(
    shell: &Shell,
    query: &str,
    limit: Option<u32>,
) -> Result<Vec<Customer>, ApiError> {
    let limit = limit.unwrap_or(20).clamp(1, 100);
    debug!(%query, limit, "search_customers command");
    Ok(shell.store.customers().search(query, limit).await?)
}

pub async fn get_customer(shell: &Shell, customer_id: &str) -> Result<CustomerWithVehicles, ApiError> {
    shell
        .store
        .customers()
        .with_vehicles(customer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer", customer_id))
}

/// Creates a customer together with their vehicles in one write.
pub async fn create_customer(
    shell: &Shell,
    input: CustomerInput,
    vehicles: Vec<VehicleInput>,
) -> Result<CustomerWithVehicles, ApiError> {
    let result = shell.store.customers().create(input, vehicles).await;
    report_write(shell, "Create customer", result, |c| {
        format!("{} added", c.customer.name)
    })
}

pub async fn update_customer(
    shell: &Shell,
    customer_id: &str,
    input: CustomerInput,
) -> Result<Customer, ApiError> {
    let result = shell.store.customers().update(customer_id, input).await;
    report_write(shell, "Update customer", result, |c| format!("{} saved", c.name))
}

pub async fn add_vehicle(
    shell: &Shell,
    customer_id: &str,
    input: VehicleInput,
) -> Result<Vehicle, ApiError> {
    let result = shell.store.customers().add_vehicle(customer_id, input).await;
    report_write(shell, "Add vehicle", result, |v| format!("{} added", v.plate))
}

pub async fn remove_vehicle(shell: &Shell, vehicle_id: &str) -> Result<(), ApiError> {
    let result = shell.store.customers().remove_vehicle(vehicle_id).await;
    report_write(shell, "Remove vehicle", result, |_| "Vehicle removed".to_string())
}

/// Deletes a customer and their vehicles. A cart holding this customer
/// falls back to walk-in.
pub async fn delete_customer(shell: &Shell, customer_id: &str) -> Result<(), ApiError> {
    let result: Result<(), ApiError> = async {
        shell.store.customers().delete(customer_id).await?;

        let mut cart = shell.register.lock().await;
        let attached = cart
            .customer()
            .is_some_and(|c| c.id == customer_id);
        if attached {
            cart.set_customer(None)?;
        }
        Ok(())
    }
    .await;

    report_write(shell, "Delete customer", result, |_| "Customer deleted".to_string())
}
