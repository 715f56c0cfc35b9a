//! # Inventory Commands
//!
//! Operator stock edits and the append-only log behind them. Every edit
//! that changes something writes exactly one log row in the same
//! transaction; an edit that changes nothing writes nothing.

use serde::Serialize;

use gloss_core::ledger::{LogFilter, LogSummary};
use gloss_core::availability::StockLevel;
use gloss_core::InventoryLogEntry;
use gloss_db::InventoryUpdate;

use crate::commands::report_write;
use crate::error::ApiError;
use crate::Shell;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustResponse {
    pub level: StockLevel,
    /// `None` when the edit matched the stored values.
    pub entry: Option<InventoryLogEntry>,
}

/// Sets a product's stock and threshold. A quantity change requires a
/// reason.
pub async fn adjust_stock(shell: &Shell, update: InventoryUpdate) -> Result<AdjustResponse, ApiError> {
    let product_id = update.product_id.clone();
    let result: Result<AdjustResponse, ApiError> = async {
        let actor = shell.actor();
        let entry = shell.store.inventory().adjust(update, actor.as_ref()).await?;
        let level = shell.store.inventory().level(&product_id).await?;
        Ok(AdjustResponse { level, entry })
    }
    .await;

    report_write(shell, "Adjust stock", result, |r| match &r.entry {
        Some(entry) => format!(
            "{}: {} → {}",
            entry.product_name, entry.quantity_before, entry.quantity_after
        ),
        None => "No changes".to_string(),
    })
}

pub async fn stock_level(shell: &Shell, product_id: &str) -> Result<StockLevel, ApiError> {
    Ok(shell.store.inventory().level(product_id).await?)
}

/// Log entries, newest first.
pub async fn inventory_history(
    shell: &Shell,
    filter: LogFilter,
) -> Result<Vec<InventoryLogEntry>, ApiError> {
    Ok(shell.store.inventory_logs().list(&filter).await?)
}

pub async fn inventory_summary(shell: &Shell, filter: LogFilter) -> Result<LogSummary, ApiError> {
    Ok(shell.store.inventory_logs().summary(&filter).await?)
}
