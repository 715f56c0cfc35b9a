//! # Employee Repository
//!
//! Staff records with their compensation plan. The plan lives in typed
//! columns (`pay_type`, `pay_rate_cents`, `commission_bps`) so the
//! commission engine never parses JSON.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use gloss_core::validation::{validate_amount_cents, validate_bps, validate_name};
use gloss_core::{new_id, Compensation, Employee, EmployeeStatus, POS_CREW_TAG};

use crate::error::{DbError, DbResult};
use crate::store::LocalStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeInput {
    pub name: String,
    pub username: Option<String>,
    pub role_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub status: EmployeeStatus,
    #[serde(default)]
    pub compensation: Compensation,
}

impl EmployeeInput {
    fn validate(&self) -> DbResult<()> {
        validate_name("name", &self.name, 200)?;
        validate_amount_cents("pay rate", self.compensation.pay_rate_cents)?;
        validate_bps("commission", self.compensation.commission_bps)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmployeeRepository {
    store: LocalStore,
}

impl EmployeeRepository {
    pub fn new(store: LocalStore) -> Self {
        EmployeeRepository { store }
    }

    pub async fn list(&self) -> DbResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, Employee>("SELECT * FROM employees ORDER BY name")
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Employee>> {
        let row = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    /// Active employees whose role carries the `pos_crew` tag.
    pub async fn crew_candidates(&self) -> DbResult<Vec<Employee>> {
        let roles = self.store.roles().list().await?;
        let crew_roles: Vec<&str> = roles
            .iter()
            .filter(|r| r.has_tag(POS_CREW_TAG))
            .map(|r| r.id.as_str())
            .collect();

        let employees = self.list().await?;
        Ok(employees
            .into_iter()
            .filter(|e| e.is_active())
            .filter(|e| {
                e.role_id
                    .as_deref()
                    .is_some_and(|role| crew_roles.contains(&role))
            })
            .collect())
    }

    pub async fn create(&self, input: EmployeeInput) -> DbResult<Employee> {
        input.validate()?;

        let now = Utc::now();
        let id = new_id();

        let mut tx = self.store.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO employees (
                id, name, username, role_id, phone, email, status,
                pay_type, pay_rate_cents, commission_bps, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(&input.username)
        .bind(&input.role_id)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(input.status)
        .bind(input.compensation.pay_type)
        .bind(input.compensation.pay_rate_cents)
        .bind(input.compensation.commission_bps)
        .bind(now)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("employees", &id).await?;
        let employee = load(tx.conn(), &id).await?;
        tx.commit().await?;

        info!(id = %id, name = %employee.name, "Employee created");
        Ok(employee)
    }

    pub async fn update(&self, id: &str, input: EmployeeInput) -> DbResult<Employee> {
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE employees SET
                name = ?2, username = ?3, role_id = ?4, phone = ?5, email = ?6, status = ?7,
                pay_type = ?8, pay_rate_cents = ?9, commission_bps = ?10, updated_at = ?11
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.username)
        .bind(&input.role_id)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(input.status)
        .bind(input.compensation.pay_type)
        .bind(input.compensation.pay_rate_cents)
        .bind(input.compensation.commission_bps)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Employee", id));
        }

        tx.record_upsert("employees", id).await?;
        let employee = load(tx.conn(), id).await?;
        tx.commit().await?;

        debug!(id = %id, "Employee updated");
        Ok(employee)
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        let result = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Employee", id));
        }
        tx.record_delete("employees", id).await?;
        tx.commit().await?;

        info!(id = %id, "Employee deleted");
        Ok(())
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Employee> {
    sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Employee", id))
}

/// Every employee keyed by id, for commission resolution inside a
/// transaction.
pub(crate) async fn load_all(conn: &mut SqliteConnection) -> DbResult<HashMap<String, Employee>> {
    let rows = sqlx::query_as::<_, Employee>("SELECT * FROM employees")
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(|e| (e.id.clone(), e)).collect())
}
