//! # Category Repository
//!
//! Categories group products and services in the catalog. Deleting one
//! clears the reference on every product and service first, so the change
//! reaches the remote as ordinary row updates.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use gloss_core::validation::validate_name;
use gloss_core::{new_id, Category};

use crate::error::{DbError, DbResult};
use crate::store::{LocalStore, WriteTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    store: LocalStore,
}

impl CategoryRepository {
    pub fn new(store: LocalStore) -> Self {
        CategoryRepository { store }
    }

    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Category>> {
        let row = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, input: CategoryInput) -> DbResult<Category> {
        validate_name("name", &input.name, 100)?;

        let now = Utc::now();
        let category = Category {
            id: new_id(),
            name: input.name.trim().to_string(),
            description: input.description,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("categories", &category.id).await?;
        tx.commit().await?;

        info!(id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn update(&self, id: &str, input: CategoryInput) -> DbResult<Category> {
        validate_name("name", &input.name, 100)?;

        let mut tx = self.store.begin().await?;
        let result = sqlx::query(
            "UPDATE categories SET name = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        tx.record_upsert("categories", id).await?;
        let category = load(tx.conn(), id).await?;
        tx.commit().await?;

        debug!(id = %id, "Category updated");
        Ok(category)
    }

    /// Deletes a category after clearing it from products and services.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;

        clear_references(&mut tx, "products", id).await?;
        clear_references(&mut tx, "services", id).await?;

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }
        tx.record_delete("categories", id).await?;
        tx.commit().await?;

        info!(id = %id, "Category deleted");
        Ok(())
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Category> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Category", id))
}

async fn clear_references(tx: &mut WriteTx, table: &str, category_id: &str) -> DbResult<()> {
    let select = format!("SELECT id FROM {table} WHERE category_id = ?");
    let ids: Vec<String> = sqlx::query_scalar(&select)
        .bind(category_id)
        .fetch_all(tx.conn())
        .await?;

    if ids.is_empty() {
        return Ok(());
    }

    let update = format!("UPDATE {table} SET category_id = NULL, updated_at = ? WHERE id = ?");
    let now = Utc::now();
    for row_id in &ids {
        sqlx::query(&update)
            .bind(now)
            .bind(row_id)
            .execute(tx.conn())
            .await?;
        tx.record_upsert(table, row_id).await?;
    }

    debug!(table = %table, count = ids.len(), "Category references cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::seed;

    #[tokio::test]
    async fn test_create_update_list() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let repo = store.categories();

        let created = repo
            .create(CategoryInput {
                name: "  Exterior ".to_string(),
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Exterior");

        let updated = repo
            .update(
                &created.id,
                CategoryInput {
                    name: "Exterior care".to_string(),
                    description: Some("Wash and wax".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("Wash and wax"));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_rejected_before_write() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let err = store
            .categories()
            .create(CategoryInput {
                name: "   ".to_string(),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(_)));
        assert_eq!(store.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_clears_product_reference() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let demo = seed::seed_demo(&store).await.unwrap();

        store.categories().delete(&demo.category_id).await.unwrap();

        let product = store.products().get(&demo.wax_id).await.unwrap().unwrap();
        assert_eq!(product.category_id, None);
        assert!(store.categories().get(&demo.category_id).await.unwrap().is_none());
    }
}
