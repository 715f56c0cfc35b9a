//! # Validation Module
//!
//! Input rules shared by every write path in Gloss POS.
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Shell command (apps/register)                                 │
//! │  └── Deserialized input handed to repositories                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (called by gloss-db before BEGIN)                 │
//! │  ├── Names, SKUs, prices, quantities                                    │
//! │  └── Adjustment reason when stock changes                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── CHECK (stock_quantity >= 0)                                        │
//! │  ├── Foreign keys / cascades                                            │
//! │  └── Append-only triggers on inventory_logs                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed validation never opens a transaction, so nothing is written.
//!
//! ```rust
//! use gloss_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("WAX-500").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required display name for `field`.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most `max` characters
pub fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use gloss_core::validation::validate_sku;
///
/// assert!(validate_sku("WAX-500").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a vehicle plate.
pub fn validate_plate(plate: &str) -> ValidationResult<()> {
    validate_name("plate", plate, 20)?;

    if !plate
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == ' ')
    {
        return Err(ValidationError::InvalidFormat {
            field: "plate".to_string(),
            reason: "must contain only letters, numbers, spaces, and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validates a free-text search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

/// Requires a reason whenever a stock quantity actually changes.
///
/// ## User Workflow
/// ```text
/// Adjust stock: 12 → 9
///      │
///      ▼
/// validate_adjustment_reason(12, 9, reason) ← THIS FUNCTION
///      │
///      ├── quantity unchanged?   → OK (threshold-only edits need no reason)
///      ├── reason blank?         → Error: "reason is required"
///      └── OK → inventory update + log entry in one transaction
/// ```
pub fn validate_adjustment_reason(
    quantity_before: i64,
    quantity_after: i64,
    reason: Option<&str>,
) -> ValidationResult<()> {
    if quantity_before == quantity_after {
        return Ok(());
    }

    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => {
            if r.len() > 500 {
                return Err(ValidationError::TooLong {
                    field: "reason".to_string(),
                    max: 500,
                });
            }
            Ok(())
        }
        _ => Err(ValidationError::Required {
            field: "reason".to_string(),
        }),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stored amount in cents (prices, costs, expenses).
///
/// Zero is allowed (free items, complimentary services).
///
/// ```rust
/// use gloss_core::validation::validate_amount_cents;
///
/// assert!(validate_amount_cents("price", 1099).is_ok());
/// assert!(validate_amount_cents("price", 0).is_ok());
/// assert!(validate_amount_cents("price", -100).is_err());
/// ```
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a stock quantity or threshold (never negative).
pub fn validate_stock_value(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a recipe ingredient quantity.
pub fn validate_recipe_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "recipe quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a percentage expressed in basis points (0% to 100%).
pub fn validate_bps(field: &str, bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates the Settings tax rate, stored as a decimal fraction.
pub fn validate_tax_fraction(fraction: f64) -> ValidationResult<()> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(ValidationError::InvalidFormat {
            field: "tax_rate".to_string(),
            reason: "must be a fraction between 0 and 1".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that another distinct line fits in the cart.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 0,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a client-generated UUID.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Full Detail", 200).is_ok());
        assert!(validate_name("name", "   ", 200).is_err());
        assert!(validate_name("name", &"A".repeat(201), 200).is_err());
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("WAX-500").is_ok());
        assert!(validate_sku("pad_3").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_plate() {
        assert!(validate_plate("ABC 1234").is_ok());
        assert!(validate_plate("").is_err());
        assert!(validate_plate("AB#12").is_err());
    }

    #[test]
    fn test_reason_required_only_when_quantity_changes() {
        assert!(validate_adjustment_reason(10, 10, None).is_ok());
        assert!(validate_adjustment_reason(10, 7, Some("Used on job")).is_ok());
        assert!(validate_adjustment_reason(10, 7, None).is_err());
        assert!(validate_adjustment_reason(10, 7, Some("  ")).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_bps_and_tax() {
        assert!(validate_bps("commission", 1000).is_ok());
        assert!(validate_bps("commission", 10_001).is_err());
        assert!(validate_bps("commission", -1).is_err());
        assert!(validate_tax_fraction(0.12).is_ok());
        assert!(validate_tax_fraction(1.5).is_err());
        assert!(validate_tax_fraction(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
