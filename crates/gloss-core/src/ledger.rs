//! # Inventory Ledger Rules
//!
//! Pure half of the inventory audit trail: deciding what kind of change a
//! mutation is, enforcing the reason rule, and summarizing filtered logs.
//! Persistence (always inside the caller's transaction) lives in gloss-db.
//!
//! ## Classification
//! ```text
//! ┌──────────────────────────┬──────────────────────────────┐
//! │ before → after           │ change type                  │
//! ├──────────────────────────┼──────────────────────────────┤
//! │ (no row) → any           │ initial_stock                │
//! │ qty changed, thr same    │ stock_adjustment             │
//! │ qty same, thr changed    │ threshold_change             │
//! │ both changed             │ stock_and_threshold          │
//! │ nothing changed          │ (no entry)                   │
//! └──────────────────────────┴──────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::StockLevel;
use crate::error::CoreResult;
use crate::types::{Actor, InventoryChangeType, InventoryLogEntry};
use crate::validation::validate_adjustment_reason;

/// Derives the change type, or `None` when nothing changed.
pub fn classify_change(
    before: Option<StockLevel>,
    after: StockLevel,
) -> Option<InventoryChangeType> {
    let Some(before) = before else {
        return Some(InventoryChangeType::InitialStock);
    };

    let quantity_changed = before.quantity != after.quantity;
    let threshold_changed = before.threshold != after.threshold;

    match (quantity_changed, threshold_changed) {
        (true, true) => Some(InventoryChangeType::StockAndThreshold),
        (true, false) => Some(InventoryChangeType::StockAdjustment),
        (false, true) => Some(InventoryChangeType::ThresholdChange),
        (false, false) => None,
    }
}

// =============================================================================
// New Entries
// =============================================================================

/// A log entry that has been classified and validated but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub product_id: String,
    pub product_name: String,
    pub change_type: InventoryChangeType,
    pub before: StockLevel,
    pub after: StockLevel,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<Actor>,
}

impl NewLogEntry {
    /// Builds the entry for a mutation, or `Ok(None)` when the mutation is a
    /// no-op. A missing `before` row is treated as stock 0 / threshold 0 for
    /// the recorded before-values.
    ///
    /// ## Errors
    /// `ValidationError::Required` when the quantity changes without a reason.
    pub fn for_change(
        product_id: &str,
        product_name: &str,
        before: Option<StockLevel>,
        after: StockLevel,
        reason: Option<&str>,
        notes: Option<&str>,
        actor: Option<&Actor>,
    ) -> CoreResult<Option<NewLogEntry>> {
        let Some(change_type) = classify_change(before, after) else {
            return Ok(None);
        };

        let recorded_before = before.unwrap_or(StockLevel::new(0, 0));
        validate_adjustment_reason(recorded_before.quantity, after.quantity, reason)?;

        Ok(Some(NewLogEntry {
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            change_type,
            before: recorded_before,
            after,
            reason: non_blank(reason),
            notes: non_blank(notes),
            actor: actor.cloned(),
        }))
    }

    /// Materializes the stored row.
    pub fn into_entry(self, id: String, created_at: DateTime<Utc>) -> InventoryLogEntry {
        let (employee_id, employee_name) = match self.actor {
            Some(actor) => (Some(actor.id), Some(actor.name)),
            None => (None, None),
        };

        InventoryLogEntry {
            id,
            product_id: self.product_id,
            product_name: self.product_name,
            change_type: self.change_type,
            quantity_before: self.before.quantity,
            quantity_after: self.after.quantity,
            threshold_before: self.before.threshold,
            threshold_after: self.after.threshold,
            reason: self.reason,
            notes: self.notes,
            employee_id,
            employee_name,
            created_at,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Filtering and Summaries
// =============================================================================

/// Filter applied to log listings and summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LogFilter {
    pub product_id: Option<String>,
    pub change_type: Option<InventoryChangeType>,
    /// Case-insensitive match on product name, reason or actor name.
    pub search: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, entry: &InventoryLogEntry) -> bool {
        if let Some(product_id) = &self.product_id {
            if &entry.product_id != product_id {
                return false;
            }
        }

        if let Some(change_type) = self.change_type {
            if entry.change_type != change_type {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                [
                    Some(entry.product_name.as_str()),
                    entry.reason.as_deref(),
                    entry.employee_name.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// Aggregates over a filtered set of log entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LogSummary {
    pub total: u32,
    pub stock_adjustments: u32,
    pub threshold_changes: u32,
    pub stock_and_threshold: u32,
    pub initial_stock: u32,
    /// Σ (quantity_after − quantity_before).
    pub net_quantity_delta: i64,
}

pub fn summarize<'a, I>(entries: I) -> LogSummary
where
    I: IntoIterator<Item = &'a InventoryLogEntry>,
{
    entries
        .into_iter()
        .fold(LogSummary::default(), |mut summary, entry| {
            summary.total += 1;
            summary.net_quantity_delta += entry.quantity_delta();
            match entry.change_type {
                InventoryChangeType::StockAdjustment => summary.stock_adjustments += 1,
                InventoryChangeType::ThresholdChange => summary.threshold_changes += 1,
                InventoryChangeType::StockAndThreshold => summary.stock_and_threshold += 1,
                InventoryChangeType::InitialStock => summary.initial_stock += 1,
            }
            summary
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;

    fn entry(change_type: InventoryChangeType, before: i64, after: i64) -> InventoryLogEntry {
        InventoryLogEntry {
            id: format!("log-{before}-{after}"),
            product_id: "wax".to_string(),
            product_name: "Carnauba Wax".to_string(),
            change_type,
            quantity_before: before,
            quantity_after: after,
            threshold_before: 10,
            threshold_after: 10,
            reason: Some("Sale".to_string()),
            notes: None,
            employee_id: None,
            employee_name: Some("Dana".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_classify_change() {
        let base = StockLevel::new(10, 5);
        assert_eq!(
            classify_change(None, base),
            Some(InventoryChangeType::InitialStock)
        );
        assert_eq!(
            classify_change(Some(base), StockLevel::new(8, 5)),
            Some(InventoryChangeType::StockAdjustment)
        );
        assert_eq!(
            classify_change(Some(base), StockLevel::new(10, 3)),
            Some(InventoryChangeType::ThresholdChange)
        );
        assert_eq!(
            classify_change(Some(base), StockLevel::new(8, 3)),
            Some(InventoryChangeType::StockAndThreshold)
        );
        assert_eq!(classify_change(Some(base), base), None);
    }

    #[test]
    fn test_threshold_only_change_needs_no_reason() {
        let entry = NewLogEntry::for_change(
            "wax",
            "Wax",
            Some(StockLevel::new(10, 5)),
            StockLevel::new(10, 2),
            None,
            None,
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(entry.change_type, InventoryChangeType::ThresholdChange);
        assert_eq!(entry.reason, None);
    }

    #[test]
    fn test_quantity_change_without_reason_is_rejected() {
        let err = NewLogEntry::for_change(
            "wax",
            "Wax",
            Some(StockLevel::new(10, 5)),
            StockLevel::new(7, 5),
            Some(""),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_into_entry_copies_actor() {
        let actor = Actor {
            id: "emp-1".to_string(),
            name: "Dana".to_string(),
            role: None,
        };
        let new = NewLogEntry::for_change(
            "wax",
            "Wax",
            None,
            StockLevel::new(24, 10),
            Some("Initial stock"),
            None,
            Some(&actor),
        )
        .unwrap()
        .unwrap();

        let stored = new.into_entry("log-1".to_string(), Utc::now());
        assert_eq!(stored.quantity_before, 0);
        assert_eq!(stored.quantity_after, 24);
        assert_eq!(stored.employee_id.as_deref(), Some("emp-1"));
    }

    #[test]
    fn test_filter_free_text_is_case_insensitive() {
        let e = entry(InventoryChangeType::StockAdjustment, 10, 8);
        let by_actor = LogFilter {
            search: Some("dana".to_string()),
            ..Default::default()
        };
        let by_type = LogFilter {
            change_type: Some(InventoryChangeType::ThresholdChange),
            ..Default::default()
        };
        assert!(by_actor.matches(&e));
        assert!(!by_type.matches(&e));
    }

    #[test]
    fn test_summarize_counts_and_net_delta() {
        let entries = vec![
            entry(InventoryChangeType::InitialStock, 0, 20),
            entry(InventoryChangeType::StockAdjustment, 20, 18),
            entry(InventoryChangeType::StockAdjustment, 18, 15),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.initial_stock, 1);
        assert_eq!(summary.stock_adjustments, 2);
        assert_eq!(summary.net_quantity_delta, 15);
    }
}
