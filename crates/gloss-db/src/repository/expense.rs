//! # Expense Repository

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

use gloss_core::validation::{validate_amount_cents, validate_name};
use gloss_core::{new_id, Expense, ExpenseType, Money};

use crate::error::{DbError, DbResult};
use crate::store::LocalStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseInput {
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
    pub expense_date: NaiveDate,
    pub notes: Option<String>,
    pub expense_type: ExpenseType,
}

impl ExpenseInput {
    fn validate(&self) -> DbResult<()> {
        validate_name("description", &self.description, 500)?;
        validate_amount_cents("amount", self.amount_cents)?;
        Ok(())
    }
}

/// Operating vs capital spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpenseTotals {
    pub opex: Money,
    pub capex: Money,
    pub total: Money,
}

#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    store: LocalStore,
}

impl ExpenseRepository {
    pub fn new(store: LocalStore) -> Self {
        ExpenseRepository { store }
    }

    /// Newest expense date first.
    pub async fn list(&self) -> DbResult<Vec<Expense>> {
        let rows = sqlx::query_as::<_, Expense>(
            "SELECT * FROM expenses ORDER BY expense_date DESC, created_at DESC",
        )
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Expense>> {
        let row = sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, input: ExpenseInput) -> DbResult<Expense> {
        input.validate()?;

        let id = new_id();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, description, amount_cents, category, expense_date, notes, expense_type,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&id)
        .bind(input.description.trim())
        .bind(input.amount_cents)
        .bind(&input.category)
        .bind(input.expense_date)
        .bind(&input.notes)
        .bind(input.expense_type)
        .bind(now)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("expenses", &id).await?;
        let expense = load(tx.conn(), &id).await?;
        tx.commit().await?;

        info!(id = %id, amount_cents = expense.amount_cents, "Expense recorded");
        Ok(expense)
    }

    pub async fn update(&self, id: &str, input: ExpenseInput) -> DbResult<Expense> {
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE expenses SET
                description = ?2, amount_cents = ?3, category = ?4, expense_date = ?5,
                notes = ?6, expense_type = ?7, updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.description.trim())
        .bind(input.amount_cents)
        .bind(&input.category)
        .bind(input.expense_date)
        .bind(&input.notes)
        .bind(input.expense_type)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Expense", id));
        }

        tx.record_upsert("expenses", id).await?;
        let expense = load(tx.conn(), id).await?;
        tx.commit().await?;
        Ok(expense)
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.store.begin().await?;
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id)
            .execute(tx.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Expense", id));
        }
        tx.record_delete("expenses", id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn totals(&self) -> DbResult<ExpenseTotals> {
        let rows: Vec<(ExpenseType, i64)> = sqlx::query_as(
            "SELECT expense_type, COALESCE(SUM(amount_cents), 0) FROM expenses GROUP BY expense_type",
        )
        .fetch_all(self.store.pool()?)
        .await?;

        let mut totals = ExpenseTotals::default();
        for (kind, cents) in rows {
            let amount = Money::from_cents(cents);
            match kind {
                ExpenseType::Opex => totals.opex = amount,
                ExpenseType::Capex => totals.capex = amount,
            }
        }
        totals.total = totals.opex + totals.capex;
        Ok(totals)
    }
}

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Expense> {
    sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Expense", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    fn input(description: &str, cents: i64, kind: ExpenseType) -> ExpenseInput {
        ExpenseInput {
            description: description.to_string(),
            amount_cents: cents,
            category: Some("supplies".to_string()),
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            notes: None,
            expense_type: kind,
        }
    }

    #[tokio::test]
    async fn test_totals_by_type() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let expenses = store.expenses();
        expenses.create(input("Soap", 2_500, ExpenseType::Opex)).await.unwrap();
        expenses.create(input("Towels", 1_500, ExpenseType::Opex)).await.unwrap();
        expenses.create(input("Pressure washer", 40_000, ExpenseType::Capex)).await.unwrap();

        let totals = expenses.totals().await.unwrap();
        assert_eq!(totals.opex.cents(), 4_000);
        assert_eq!(totals.capex.cents(), 40_000);
        assert_eq!(totals.total.cents(), 44_000);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let created = store
            .expenses()
            .create(input("Soap", 2_500, ExpenseType::Opex))
            .await
            .unwrap();

        let updated = store
            .expenses()
            .update(&created.id, input("Soap (bulk)", 3_000, ExpenseType::Opex))
            .await
            .unwrap();
        assert_eq!(updated.amount_cents, 3_000);
        assert_eq!(updated.expense_date, created.expense_date);

        store.expenses().delete(&created.id).await.unwrap();
        assert!(store.expenses().get(&created.id).await.unwrap().is_none());
        assert!(store.expenses().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_amount_is_rejected() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let err = store
            .expenses()
            .create(input("Refund", -1, ExpenseType::Opex))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(_)));
    }
}
