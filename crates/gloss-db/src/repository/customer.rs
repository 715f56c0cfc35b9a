//! # Customer Repository
//!
//! Customers own their vehicles. Deleting a customer removes the vehicles
//! first so each removal reaches the remote; tickets keep the customer id
//! as plain history.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use gloss_core::validation::{validate_name, validate_plate, validate_search_query};
use gloss_core::{new_id, Customer, Vehicle};

use crate::error::{DbError, DbResult};
use crate::store::{LocalStore, WriteTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub loyalty_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInput {
    pub plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerWithVehicles {
    pub customer: Customer,
    pub vehicles: Vec<Vehicle>,
}

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    store: LocalStore,
}

impl CustomerRepository {
    pub fn new(store: LocalStore) -> Self {
        CustomerRepository { store }
    }

    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let rows = sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY name")
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let row = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    /// Name, phone or plate match.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let query = validate_search_query(query)?;
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", query);
        let rows = sqlx::query_as::<_, Customer>(
            r#"
            SELECT DISTINCT c.* FROM customers c
            LEFT JOIN customer_vehicles v ON v.customer_id = c.id
            WHERE c.name LIKE ?1 OR c.phone LIKE ?1 OR v.plate LIKE ?1
            ORDER BY c.name
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn vehicles(&self, customer_id: &str) -> DbResult<Vec<Vehicle>> {
        let mut conn = self.store.pool()?.acquire().await?;
        load_vehicles(&mut conn, customer_id).await
    }

    pub async fn with_vehicles(&self, id: &str) -> DbResult<Option<CustomerWithVehicles>> {
        let Some(customer) = self.get(id).await? else {
            return Ok(None);
        };
        let vehicles = self.vehicles(id).await?;
        Ok(Some(CustomerWithVehicles { customer, vehicles }))
    }

    pub async fn create(
        &self,
        input: CustomerInput,
        vehicles: Vec<VehicleInput>,
    ) -> DbResult<CustomerWithVehicles> {
        validate_customer(&input)?;
        for v in &vehicles {
            validate_plate(&v.plate)?;
        }

        let now = Utc::now();
        let customer = Customer {
            id: new_id(),
            name: input.name.trim().to_string(),
            phone: input.phone,
            email: input.email,
            address: input.address,
            notes: input.notes,
            loyalty_points: input.loyalty_points,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, phone, email, address, notes, loyalty_points, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(&customer.notes)
        .bind(customer.loyalty_points)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("customers", &customer.id).await?;

        let mut stored = Vec::with_capacity(vehicles.len());
        for input in vehicles {
            stored.push(insert_vehicle(&mut tx, &customer.id, input).await?);
        }

        tx.commit().await?;

        info!(id = %customer.id, vehicles = stored.len(), "Customer created");
        Ok(CustomerWithVehicles {
            customer,
            vehicles: stored,
        })
    }

    pub async fn update(&self, id: &str, input: CustomerInput) -> DbResult<Customer> {
        validate_customer(&input)?;

        let mut tx = self.store.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                name = ?2, phone = ?3, email = ?4, address = ?5, notes = ?6,
                loyalty_points = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.notes)
        .bind(input.loyalty_points)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        tx.record_upsert("customers", id).await?;
        let customer = load(tx.conn(), id).await?;
        tx.commit().await?;

        debug!(id = %id, "Customer updated");
        Ok(customer)
    }

    pub async fn add_vehicle(&self, customer_id: &str, input: VehicleInput) -> DbResult<Vehicle> {
        validate_plate(&input.plate)?;

        let mut tx = self.store.begin().await?;
        load(tx.conn(), customer_id).await?;
        let vehicle = insert_vehicle(&mut tx, customer_id, input).await?;
        tx.commit().await?;

        debug!(customer_id = %customer_id, plate = %vehicle.plate, "Vehicle added");
        Ok(vehicle)
    }

    pub async fn remove_vehicle(&self, vehicle_id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        let result = sqlx::query("DELETE FROM customer_vehicles WHERE id = ?")
            .bind(vehicle_id)
            .execute(tx.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Vehicle", vehicle_id));
        }
        tx.record_delete("customer_vehicles", vehicle_id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        load(tx.conn(), id).await?;

        let vehicles = load_vehicles(tx.conn(), id).await?;
        for vehicle in &vehicles {
            sqlx::query("DELETE FROM customer_vehicles WHERE id = ?")
                .bind(&vehicle.id)
                .execute(tx.conn())
                .await?;
            tx.record_delete("customer_vehicles", &vehicle.id).await?;
        }

        sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.record_delete("customers", id).await?;
        tx.commit().await?;

        info!(id = %id, vehicles = vehicles.len(), "Customer deleted");
        Ok(())
    }
}

fn validate_customer(input: &CustomerInput) -> DbResult<()> {
    validate_name("name", &input.name, 200)?;
    Ok(())
}

pub(crate) async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Customer> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", id))
}

pub(crate) async fn load_vehicles(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<Vec<Vehicle>> {
    let rows = sqlx::query_as::<_, Vehicle>(
        "SELECT * FROM customer_vehicles WHERE customer_id = ? ORDER BY rowid",
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

async fn insert_vehicle(tx: &mut WriteTx, customer_id: &str, input: VehicleInput) -> DbResult<Vehicle> {
    let vehicle = Vehicle {
        id: new_id(),
        customer_id: customer_id.to_string(),
        plate: input.plate.trim().to_uppercase(),
        make: input.make,
        model: input.model,
        color: input.color,
        size: input.size,
    };

    sqlx::query(
        r#"
        INSERT INTO customer_vehicles (id, customer_id, plate, make, model, color, size, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&vehicle.id)
    .bind(&vehicle.customer_id)
    .bind(&vehicle.plate)
    .bind(&vehicle.make)
    .bind(&vehicle.model)
    .bind(&vehicle.color)
    .bind(&vehicle.size)
    .bind(Utc::now())
    .execute(tx.conn())
    .await?;
    tx.record_upsert("customer_vehicles", &vehicle.id).await?;

    Ok(vehicle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    fn customer(name: &str) -> CustomerInput {
        CustomerInput {
            name: name.to_string(),
            phone: Some("555-0100".to_string()),
            email: None,
            address: None,
            notes: None,
            loyalty_points: 0,
        }
    }

    fn vehicle(plate: &str) -> VehicleInput {
        VehicleInput {
            plate: plate.to_string(),
            make: Some("Toyota".to_string()),
            model: None,
            color: None,
            size: Some("sedan".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_with_vehicles_and_search_by_plate() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let created = store
            .customers()
            .create(customer("Ana Cruz"), vec![vehicle("abc 123")])
            .await
            .unwrap();
        assert_eq!(created.vehicles[0].plate, "ABC 123");

        let hits = store.customers().search("abc", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, created.customer.id);
    }

    #[tokio::test]
    async fn test_delete_removes_vehicles() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let created = store
            .customers()
            .create(customer("Ana Cruz"), vec![vehicle("ABC 123"), vehicle("XYZ 9")])
            .await
            .unwrap();

        store.customers().delete(&created.customer.id).await.unwrap();

        assert!(store.customers().get(&created.customer.id).await.unwrap().is_none());
        assert!(store.customers().vehicles(&created.customer.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_vehicle_to_unknown_customer_fails() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let err = store
            .customers()
            .add_vehicle("missing", vehicle("ABC 123"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
