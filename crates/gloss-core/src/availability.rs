//! # Availability Resolver
//!
//! Decides whether a product or service can be sold right now, using an
//! already-fetched [`InventorySnapshot`]. Runs on every render of the
//! sellable grid, so it does nothing but map lookups.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product                                                                │
//! │    out  : stock <= 0                                                    │
//! │    low  : 0 < stock <= threshold                                        │
//! │                                                                         │
//! │  Recipe (one variant)                                                   │
//! │    out  : any line.quantity > stock(line.product)                       │
//! │    low  : any ingredient with 0 < stock <= threshold                    │
//! │                                                                         │
//! │  Service                                                                │
//! │    each variant evaluated on its own recipe                             │
//! │    available  : at least one variant available                          │
//! │    all out    : missing list comes from the first declared variant      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{Inventory, RecipeLine};
use crate::DEFAULT_LOW_STOCK_THRESHOLD;

// =============================================================================
// Stock Level
// =============================================================================

/// Resolved stock of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLevel {
    pub quantity: i64,
    pub threshold: i64,
}

impl StockLevel {
    pub const fn new(quantity: i64, threshold: i64) -> Self {
        StockLevel {
            quantity,
            threshold,
        }
    }

    #[inline]
    pub const fn is_out(&self) -> bool {
        self.quantity <= 0
    }

    #[inline]
    pub const fn is_low(&self) -> bool {
        self.quantity > 0 && self.quantity <= self.threshold
    }
}

impl Default for StockLevel {
    fn default() -> Self {
        StockLevel::new(0, DEFAULT_LOW_STOCK_THRESHOLD)
    }
}

/// In-memory stock lookup keyed by product id.
///
/// Products without a row resolve to the defaults (0 in stock, threshold 10).
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    levels: HashMap<String, StockLevel>,
}

impl InventorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a Inventory>,
    {
        let levels = rows
            .into_iter()
            .map(|row| (row.product_id.clone(), row.level()))
            .collect();
        InventorySnapshot { levels }
    }

    pub fn insert(&mut self, product_id: impl Into<String>, level: StockLevel) {
        self.levels.insert(product_id.into(), level);
    }

    pub fn level(&self, product_id: &str) -> StockLevel {
        self.levels.get(product_id).copied().unwrap_or_default()
    }
}

// =============================================================================
// Results
// =============================================================================

/// An ingredient whose stock cannot cover one unit of the recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MissingIngredient {
    pub product_id: String,
    pub required: i64,
    pub in_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Availability {
    pub available: bool,
    pub is_out: bool,
    pub is_low: bool,
    pub missing: Vec<MissingIngredient>,
}

impl Availability {
    fn in_stock(is_low: bool) -> Self {
        Availability {
            available: true,
            is_out: false,
            is_low,
            missing: Vec::new(),
        }
    }
}

/// Availability of a service and of each of its variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceAvailability {
    #[serde(flatten)]
    #[ts(flatten)]
    pub overall: Availability,
    /// Per-variant results in declared order.
    pub variants: Vec<VariantAvailability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantAvailability {
    pub variant_id: String,
    pub availability: Availability,
}

/// A variant id paired with its recipe, in declared order.
#[derive(Debug, Clone, Copy)]
pub struct VariantRecipe<'a> {
    pub variant_id: &'a str,
    pub lines: &'a [RecipeLine],
}

// =============================================================================
// Resolvers
// =============================================================================

pub fn product_availability(product_id: &str, snapshot: &InventorySnapshot) -> Availability {
    let level = snapshot.level(product_id);
    Availability {
        available: !level.is_out(),
        is_out: level.is_out(),
        is_low: level.is_low(),
        missing: Vec::new(),
    }
}

/// Evaluates one recipe. An empty recipe is always available.
pub fn recipe_availability(lines: &[RecipeLine], snapshot: &InventorySnapshot) -> Availability {
    let mut missing = Vec::new();
    let mut is_low = false;

    for line in lines {
        let level = snapshot.level(&line.product_id);
        if line.quantity > level.quantity {
            missing.push(MissingIngredient {
                product_id: line.product_id.clone(),
                required: line.quantity,
                in_stock: level.quantity,
            });
        }
        if level.is_low() {
            is_low = true;
        }
    }

    if missing.is_empty() {
        return Availability::in_stock(is_low);
    }

    Availability {
        available: false,
        is_out: true,
        is_low,
        missing,
    }
}

/// Evaluates every variant and folds the results into the service verdict.
///
/// A service with no variants has nothing it can sell and is reported out
/// with an empty missing list; persisted services always carry at least the
/// Standard variant.
pub fn service_availability(
    variants: &[VariantRecipe<'_>],
    snapshot: &InventorySnapshot,
) -> ServiceAvailability {
    let per_variant: Vec<VariantAvailability> = variants
        .iter()
        .map(|v| VariantAvailability {
            variant_id: v.variant_id.to_string(),
            availability: recipe_availability(v.lines, snapshot),
        })
        .collect();

    let any_available = per_variant.iter().any(|v| v.availability.available);

    let overall = if any_available {
        Availability::in_stock(per_variant.iter().any(|v| v.availability.is_low))
    } else {
        let missing = per_variant
            .first()
            .map(|v| v.availability.missing.clone())
            .unwrap_or_default();
        Availability {
            available: false,
            is_out: true,
            is_low: false,
            missing,
        }
    };

    ServiceAvailability {
        overall,
        variants: per_variant,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: &str, quantity: i64) -> RecipeLine {
        RecipeLine {
            id: format!("r-{product_id}"),
            service_id: "svc".to_string(),
            variant_id: Some("v".to_string()),
            product_id: product_id.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_stock_at_threshold_is_low_not_out() {
        let level = StockLevel::new(10, 10);
        assert!(level.is_low());
        assert!(!level.is_out());
    }

    #[test]
    fn test_zero_stock_is_out() {
        let level = StockLevel::new(0, 10);
        assert!(level.is_out());
        assert!(!level.is_low());
    }

    #[test]
    fn test_missing_row_defaults_to_out() {
        let snapshot = InventorySnapshot::new();
        let result = product_availability("ghost", &snapshot);
        assert!(result.is_out);
        assert!(!result.available);
    }

    #[test]
    fn test_recipe_out_when_required_exceeds_stock() {
        let mut snapshot = InventorySnapshot::new();
        snapshot.insert("wax", StockLevel::new(1, 10));

        let result = recipe_availability(&[line("wax", 2)], &snapshot);
        assert!(result.is_out);
        assert_eq!(
            result.missing,
            vec![MissingIngredient {
                product_id: "wax".to_string(),
                required: 2,
                in_stock: 1,
            }]
        );
    }

    #[test]
    fn test_recipe_low_when_ingredient_near_threshold() {
        let mut snapshot = InventorySnapshot::new();
        snapshot.insert("wax", StockLevel::new(5, 10));
        snapshot.insert("soap", StockLevel::new(100, 10));

        let result = recipe_availability(&[line("wax", 1), line("soap", 1)], &snapshot);
        assert!(result.available);
        assert!(result.is_low);
    }

    #[test]
    fn test_service_available_if_any_variant_is() {
        let mut snapshot = InventorySnapshot::new();
        snapshot.insert("wax", StockLevel::new(1, 10));
        snapshot.insert("soap", StockLevel::new(50, 10));

        let large = [line("wax", 3)];
        let small = [line("soap", 1)];
        let variants = [
            VariantRecipe {
                variant_id: "large",
                lines: &large,
            },
            VariantRecipe {
                variant_id: "small",
                lines: &small,
            },
        ];

        let result = service_availability(&variants, &snapshot);
        assert!(result.overall.available);
        assert!(result.variants[0].availability.is_out);
        assert!(!result.variants[1].availability.is_out);
    }

    #[test]
    fn test_all_variants_out_reports_first_missing_list() {
        let snapshot = InventorySnapshot::new();

        let first = [line("wax", 1)];
        let second = [line("soap", 1), line("pad", 1)];
        let variants = [
            VariantRecipe {
                variant_id: "a",
                lines: &first,
            },
            VariantRecipe {
                variant_id: "b",
                lines: &second,
            },
        ];

        let result = service_availability(&variants, &snapshot);
        assert!(result.overall.is_out);
        assert_eq!(result.overall.missing.len(), 1);
        assert_eq!(result.overall.missing[0].product_id, "wax");
    }
}
