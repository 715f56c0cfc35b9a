//! # Register State
//!
//! Owns the one active [`Cart`] of this register.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Ownership                                       │
//! │                                                                         │
//! │  cart commands ──┐                                                      │
//! │                  ├──► RegisterState ──► tokio::Mutex<Cart>              │
//! │  ticket commands ┘                                                      │
//! │                                                                         │
//! │  The lock is async because checkout holds it across the store write:   │
//! │  begin_checkout ──► tickets().checkout().await ──► complete / fail     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::{Mutex, MutexGuard};

use gloss_core::cart::Cart;

#[derive(Debug, Default)]
pub struct RegisterState {
    cart: Mutex<Cart>,
}

impl RegisterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access to the cart for the duration of a command.
    pub async fn lock(&self) -> MutexGuard<'_, Cart> {
        self.cart.lock().await
    }

    /// Copy of the cart for display.
    pub async fn snapshot(&self) -> Cart {
        self.cart.lock().await.clone()
    }
}
