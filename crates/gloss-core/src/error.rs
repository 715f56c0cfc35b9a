//! # Error Types
//!
//! Domain-specific error types for gloss-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  gloss-core (this file)                                                │
//! │  ├── CoreError        - Cart / ticket rule violations                  │
//! │  └── ValidationError  - Field-level input failures                     │
//! │                                                                         │
//! │  gloss-db                                                              │
//! │  └── DbError          - Storage failures (wraps CoreError)             │
//! │                                                                         │
//! │  apps/register                                                         │
//! │  └── ApiError         - What the operator is shown                     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Notification │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Checkout was requested on a cart without lines.
    ///
    /// ## When This Occurs
    /// - Operator presses "Charge" before adding anything
    /// - A parked ticket was resumed after all its lines were removed
    #[error("Cart is empty")]
    EmptyCart,

    /// A consumed product does not have enough stock.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: Full Detail ×2 (recipe: 1× Wax each)
    ///      │
    ///      ▼
    /// Required Wax: 2, in stock: 1
    ///      │
    ///      ▼
    /// InsufficientStock { name: "Wax", available: 1, requested: 2 }
    ///      │
    ///      ▼
    /// Checkout blocked, nothing written
    /// ```
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        name: String,
        available: i64,
        requested: i64,
    },

    /// The cart has no line with the given id.
    #[error("Cart line not found: {0}")]
    LineNotFound(String),

    /// Crew can only be attached to service lines.
    #[error("Crew cannot be assigned to product line {0}")]
    CrewNotAllowed(String),

    /// The operation is not valid in the cart's current phase.
    #[error("Cannot {operation} while cart is {phase}")]
    InvalidPhase { operation: String, phase: String },

    /// A service was sold without resolving one of its variants.
    #[error("Service {service_id} requires a variant")]
    VariantRequired { service_id: String },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad tax fraction, bad plate).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            name: "Wax".to_string(),
            available: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Wax: available 1, requested 2"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::Required {
            field: "reason".to_string(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: reason is required");
    }
}
