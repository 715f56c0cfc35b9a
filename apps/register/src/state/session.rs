//! # Session
//!
//! Who is operating the register. Inventory log entries and checkout are
//! stamped with this actor; `None` means nobody signed in and the entries
//! carry no actor.

use std::sync::{PoisonError, RwLock};

use gloss_core::Actor;

pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<Actor>;

    fn sign_in(&self, actor: Actor);

    fn sign_out(&self);
}

/// In-process session with sign in / sign out.
#[derive(Debug, Default)]
pub struct LocalSession {
    current: RwLock<Option<Actor>>,
}

impl LocalSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(actor: Actor) -> Self {
        LocalSession {
            current: RwLock::new(Some(actor)),
        }
    }
}

impl SessionProvider for LocalSession {
    fn current_user(&self) -> Option<Actor> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn sign_in(&self, actor: Actor) {
        tracing::info!(user = %actor.name, "Signed in");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(actor);
    }

    fn sign_out(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
