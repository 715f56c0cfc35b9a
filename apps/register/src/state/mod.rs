//! # State Module
//!
//! Focused state types owned by the [`Shell`](crate::Shell). Each command
//! touches only what it needs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐   │
//! │  │RegisterState │ │ ConfigState  │ │ LocalSession │ │  SyncState   │   │
//! │  │              │ │              │ │              │ │              │   │
//! │  │ tokio Mutex  │ │ store name   │ │ RwLock<      │ │ SyncHandle   │   │
//! │  │ <Cart>       │ │ currency     │ │  Option<     │ │ engine task  │   │
//! │  │              │ │ sale reason  │ │   Actor>>    │ │              │   │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └──────────────┘   │
//! │                                                                         │
//! │  THREAD SAFETY:                                                         │
//! │  • RegisterState: async Mutex, held across checkout                     │
//! │  • ConfigState: read-only after startup                                 │
//! │  • LocalSession: RwLock, sign in / out swaps the actor                  │
//! │  • SyncState: the handle is Clone; the engine owns its own state        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod register;
mod session;
mod sync;

pub use config::ConfigState;
pub use register::RegisterState;
pub use session::{LocalSession, SessionProvider};
pub use sync::SyncState;
