//! # gloss-core: Pure Business Logic for Gloss POS
//!
//! Everything in this crate is deterministic and free of I/O. The storage
//! layer (`gloss-db`) feeds it rows; it answers with decisions and views.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Gloss POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/register (shell commands)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ gloss-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐ │   │
//! │  │   │   cart    │  │ commission │  │   views   │  │  ledger   │ │   │
//! │  │   │   Cart    │  │  resolve   │  │ Ticket/   │  │ classify  │ │   │
//! │  │   │   phases  │  │  split     │  │ Product/  │  │ summarize │ │   │
//! │  │   └───────────┘  └────────────┘  │ Service   │  └───────────┘ │   │
//! │  │   ┌───────────┐  ┌────────────┐  └───────────┘  ┌───────────┐ │   │
//! │  │   │availability│ │  service   │                 │   money   │ │   │
//! │  │   │ out / low │  │  Standard  │                 │   cents   │ │   │
//! │  │   └───────────┘  └────────────┘                 └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    gloss-db (Local Store)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Persisted entities (Product, Service, Ticket, ...)
//! - [`money`] - Integer cents arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input rules shared by every write path
//! - [`availability`] - Out / low stock resolution for products and recipes
//! - [`commission`] - Commission resolution and crew splits
//! - [`ledger`] - Inventory change classification and log summaries
//! - [`service`] - Variant normalization ("Standard" variant)
//! - [`cart`] - The cart / ticket state machine
//! - [`views`] - Derived view builders and cost breakdowns
//!
//! ## Example Usage
//!
//! ```rust
//! use gloss_core::money::Money;
//! use gloss_core::types::TaxRate;
//!
//! let subtotal = Money::from_cents(10_000);
//! let tax = subtotal.calculate_tax(TaxRate::from_fraction(0.12));
//! assert_eq!(tax.cents(), 1_200);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod cart;
pub mod commission;
pub mod error;
pub mod ledger;
pub mod money;
pub mod service;
pub mod types;
pub mod validation;
pub mod views;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Threshold assumed for products that have no inventory row yet.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Display name used for tickets and customers when nothing better is known.
pub const WALK_IN: &str = "Walk-in";

/// Role tag marking employees that can be assigned as service crew.
pub const POS_CREW_TAG: &str = "pos_crew";

/// Name of the variant materialized for services saved without variants.
pub const STANDARD_VARIANT_NAME: &str = "Standard";

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single cart line.
pub const MAX_LINE_QUANTITY: i64 = 999;
