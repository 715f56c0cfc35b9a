//! # gloss-db: Local Relational Store for Gloss POS
//!
//! Embedded SQLite holding every mirrored table. All reads hit this store;
//! all writes go through a serialized [`WriteTx`] that records outbox rows
//! for the sync engine in the same transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Gloss POS Data Flow                              │
//! │                                                                         │
//! │  Shell command (checkout)            gloss-sync (pull / upload)        │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     gloss-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐  │   │
//! │  │   │  LocalStore  │   │ Repositories  │   │  QueryRegistry   │  │   │
//! │  │   │  (store.rs)  │◄──│ tickets()     │   │  (live.rs)       │  │   │
//! │  │   │  WriteTx     │   │ products()    │   │  subscribe/watch │  │   │
//! │  │   │  write mutex │   │ services() …  │   │  re-run on commit│  │   │
//! │  │   └──────┬───────┘   └───────────────┘   └──────────────────┘  │   │
//! │  │          │                                                      │   │
//! │  │   ┌──────▼───────┐   ┌───────────────┐   ┌──────────────────┐  │   │
//! │  │   │   Database   │   │  Migrations   │   │  schema / codec  │  │   │
//! │  │   │  (pool.rs)   │   │  (embedded)   │   │  mirror applies  │  │   │
//! │  │   └──────────────┘   └───────────────┘   └──────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  gloss.db (SQLite, WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`store`] - `LocalStore`, `WriteTx` and single-row execution
//! - [`live`] - Live query registry
//! - [`schema`] - Static description of the mirrored tables
//! - [`mirror`] - Applying remote rows through the schema
//! - [`codec`] - Versioned JSON column envelopes
//! - [`repository`] - Repository implementations
//! - [`seed`] - Demo data shared by the seed binary and tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gloss_db::{DbConfig, LocalStore};
//!
//! let store = LocalStore::open(DbConfig::new("path/to/gloss.db")).await?;
//! let parked = store.tickets().parked().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codec;
pub mod error;
pub mod live;
pub mod migrations;
pub mod mirror;
pub mod pool;
pub mod repository;
pub mod schema;
pub mod seed;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use live::{LiveQuery, LiveQuerySpec, QueryRegistry, SqlParam};
pub use pool::{Database, DbConfig};
pub use store::{LocalStore, WriteTx};

pub use repository::category::{CategoryInput, CategoryRepository};
pub use repository::customer::{CustomerInput, CustomerRepository, CustomerWithVehicles, VehicleInput};
pub use repository::employee::{EmployeeInput, EmployeeRepository};
pub use repository::expense::{ExpenseInput, ExpenseRepository, ExpenseTotals};
pub use repository::inventory::{InventoryRepository, InventoryUpdate};
pub use repository::inventory_log::InventoryLogRepository;
pub use repository::product::{NewProduct, ProductInput, ProductRepository};
pub use repository::role::{RoleInput, RoleRepository};
pub use repository::service::ServiceRepository;
pub use repository::settings::{SettingsRepository, SettingsUpdate};
pub use repository::sync::{OutboxEntry, OutboxOp, OutboxStatus, SyncOutboxRepository};
pub use repository::ticket::{CheckoutReceipt, CheckoutRequest, ParkedTicket, TicketRepository};
