//! # Repository Module
//!
//! Repositories over the [`LocalStore`](crate::store::LocalStore).
//!
//! ## Read / Write Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Shell command                                                          │
//! │       │                                                                 │
//! │       │  store.products().delete(id)                                    │
//! │       ▼                                                                 │
//! │  ProductRepository                                                      │
//! │  ├── reads:  store.pool()?          (last committed state)              │
//! │  └── writes: store.begin().await?   (serialized WriteTx)                │
//! │                 ├── DELETE service_recipes … → record_delete            │
//! │                 ├── DELETE inventory …       → record_delete            │
//! │                 ├── DELETE products …        → record_delete            │
//! │                 └── commit                                              │
//! │                                                                         │
//! │  Helpers taking `&mut SqliteConnection` are crate-visible so one        │
//! │  repository can read another's rows inside the same transaction.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`category::CategoryRepository`]
//! - [`product::ProductRepository`] - Products, create-with-stock, cascading delete
//! - [`inventory::InventoryRepository`] - Stock levels and adjustments
//! - [`inventory_log::InventoryLogRepository`] - Append-only ledger
//! - [`service::ServiceRepository`] - Services, variants, recipes
//! - [`customer::CustomerRepository`] - Customers and vehicles
//! - [`employee::EmployeeRepository`], [`role::RoleRepository`]
//! - [`ticket::TicketRepository`] - Park, resume, checkout
//! - [`expense::ExpenseRepository`], [`settings::SettingsRepository`]
//! - [`sync::SyncOutboxRepository`] - Outbox queue and sync bookkeeping

pub mod category;
pub mod customer;
pub mod employee;
pub mod expense;
pub mod inventory;
pub mod inventory_log;
pub mod product;
pub mod role;
pub mod service;
pub mod settings;
pub mod sync;
pub mod ticket;
