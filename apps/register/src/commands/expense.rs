//! # Expense Commands

use gloss_core::Expense;
use gloss_db::{ExpenseInput, ExpenseTotals};

use crate::commands::report_write;
use crate::error::ApiError;
use crate::Shell;

/// Expenses, most recent date first.
pub async fn list_expenses(shell: &Shell) -> Result<Vec<Expense>, ApiError> {
    Ok(shell.store.expenses().list().await?)
}

pub async fn create_expense(shell: &Shell, input: ExpenseInput) -> Result<Expense, ApiError> {
    let result = shell.store.expenses().create(input).await;
    report_write(shell, "Record expense", result, |e| {
        format!(
            "{} ({})",
            e.description,
            shell.config().format_currency(e.amount_cents)
        )
    })
}

pub async fn update_expense(
    shell: &Shell,
    expense_id: &str,
    input: ExpenseInput,
) -> Result<Expense, ApiError> {
    let result = shell.store.expenses().update(expense_id, input).await;
    report_write(shell, "Update expense", result, |e| format!("{} saved", e.description))
}

pub async fn delete_expense(shell: &Shell, expense_id: &str) -> Result<(), ApiError> {
    let result = shell.store.expenses().delete(expense_id).await;
    report_write(shell, "Delete expense", result, |_| "Expense deleted".to_string())
}

/// Opex, capex and their sum.
pub async fn expense_totals(shell: &Shell) -> Result<ExpenseTotals, ApiError> {
    Ok(shell.store.expenses().totals().await?)
}
