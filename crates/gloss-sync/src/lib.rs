//! # gloss-sync: Sync Engine for Gloss POS
//!
//! Keeps the local store and the remote source of truth converging while
//! the register keeps selling offline.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncEngine (engine.rs)                      │  │
//! │  │                                                                  │  │
//! │  │  Spawned as a Tokio task by the register shell                  │  │
//! │  │  Status published through tokio::sync::watch                    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ upload_pending │  │  RemoteStore   │  │  pull_changes          │    │
//! │  │ (outbox.rs)    │  │  (remote.rs)   │  │  (inbound.rs)          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ sync_outbox in │─▶│ upload / pull  │─▶│ LWW merge per row,    │    │
//! │  │ seq order      │  │ MemoryRemote   │  │ cursor in sync_state  │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SyncEngine`, `SyncHandle`, `SyncStatus`
//! - [`config`] - Sync configuration (mode, device id, remote URL)
//! - [`error`] - Sync error types
//! - [`outbox`] - FIFO upload of local mutations
//! - [`inbound`] - Pull and last-writer-wins merge
//! - [`remote`] - `RemoteStore` trait and the in-process `MemoryRemote`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gloss_sync::{MemoryRemote, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let engine = SyncEngine::new(store.clone(), MemoryRemote::new(), config);
//! let (handle, _task) = engine.spawn();
//!
//! handle.trigger();
//! println!("Pending: {}", handle.status().pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod inbound;
pub mod outbox;
pub mod remote;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DeviceConfig, SyncConfig, SyncMode, SyncSettings};
pub use engine::{NoOpEmitter, SyncEngine, SyncEventEmitter, SyncHandle, SyncReport, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use inbound::{Merge, PullReport};
pub use outbox::UploadReport;
pub use remote::{MemoryRemote, OutboundChange, PullPage, RemoteChange, RemoteStore, UploadAck};
