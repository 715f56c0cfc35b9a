//! # Role Repository
//!
//! Roles carry permission strings and assignment tags, each stored as a
//! versioned envelope column decoded by [`codec`](crate::codec).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::info;

use gloss_core::validation::validate_name;
use gloss_core::{new_id, Role};

use crate::codec;
use crate::error::{DbError, DbResult};
use crate::store::LocalStore;

#[derive(Debug, Clone, FromRow)]
struct RoleRow {
    id: String,
    name: String,
    display_name: String,
    permissions: String,
    tags: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoleRow> for Role {
    type Error = DbError;

    fn try_from(row: RoleRow) -> DbResult<Self> {
        Ok(Role {
            permissions: codec::decode_strings("permissions", &row.permissions)?,
            tags: codec::decode_strings("tags", &row.tags)?,
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInput {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RoleRepository {
    store: LocalStore,
}

impl RoleRepository {
    pub fn new(store: LocalStore) -> Self {
        RoleRepository { store }
    }

    pub async fn list(&self) -> DbResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>("SELECT * FROM roles ORDER BY display_name")
            .fetch_all(self.store.pool()?)
            .await?;
        rows.into_iter().map(Role::try_from).collect()
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        row.map(Role::try_from).transpose()
    }

    pub async fn create(&self, input: RoleInput) -> DbResult<Role> {
        validate_name("name", &input.name, 50)?;
        validate_name("display name", &input.display_name, 100)?;

        let id = new_id();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, display_name, permissions, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.display_name.trim())
        .bind(codec::encode_strings(&input.permissions)?)
        .bind(codec::encode_strings(&input.tags)?)
        .bind(now)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("roles", &id).await?;
        let role = load(tx.conn(), &id).await?;
        tx.commit().await?;

        info!(id = %id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn update(&self, id: &str, input: RoleInput) -> DbResult<Role> {
        validate_name("name", &input.name, 50)?;
        validate_name("display name", &input.display_name, 100)?;

        let mut tx = self.store.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE roles SET
                name = ?2, display_name = ?3, permissions = ?4, tags = ?5, updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.display_name.trim())
        .bind(codec::encode_strings(&input.permissions)?)
        .bind(codec::encode_strings(&input.tags)?)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Role", id));
        }

        tx.record_upsert("roles", id).await?;
        let role = load(tx.conn(), id).await?;
        tx.commit().await?;
        Ok(role)
    }

    /// Deletes the role after unassigning it from every employee.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        load(tx.conn(), id).await?;

        let employee_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM employees WHERE role_id = ?")
            .bind(id)
            .fetch_all(tx.conn())
            .await?;
        let now = Utc::now();
        for employee_id in &employee_ids {
            sqlx::query("UPDATE employees SET role_id = NULL, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(employee_id)
                .execute(tx.conn())
                .await?;
            tx.record_upsert("employees", employee_id).await?;
        }

        sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        tx.record_delete("roles", id).await?;
        tx.commit().await?;

        info!(id = %id, unassigned = employee_ids.len(), "Role deleted");
        Ok(())
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Role> {
    sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Role", id))
        .and_then(Role::try_from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::employee::EmployeeInput;
    use gloss_core::{Compensation, EmployeeStatus};

    fn input(name: &str) -> RoleInput {
        RoleInput {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            permissions: vec!["inventory.adjust".to_string()],
            tags: vec!["pos_crew".to_string()],
        }
    }

    #[tokio::test]
    async fn test_envelope_columns_round_trip() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let role = store.roles().create(input("detailer")).await.unwrap();

        assert_eq!(role.permissions, vec!["inventory.adjust".to_string()]);
        assert!(role.has_tag("pos_crew"));

        let raw: String = sqlx::query_scalar("SELECT tags FROM roles WHERE id = ?")
            .bind(&role.id)
            .fetch_one(store.pool().unwrap())
            .await
            .unwrap();
        assert_eq!(raw, r#"{"v":1,"data":["pos_crew"]}"#);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        store.roles().create(input("detailer")).await.unwrap();
        let err = store.roles().create(input("detailer")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_delete_unassigns_employees() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let role = store.roles().create(input("detailer")).await.unwrap();
        let employee = store
            .employees()
            .create(EmployeeInput {
                name: "Ana".to_string(),
                username: None,
                role_id: Some(role.id.clone()),
                phone: None,
                email: None,
                status: EmployeeStatus::Active,
                compensation: Compensation::default(),
            })
            .await
            .unwrap();

        store.roles().delete(&role.id).await.unwrap();

        let reloaded = store.employees().get(&employee.id).await.unwrap().unwrap();
        assert_eq!(reloaded.role_id, None);
    }
}
