//! # Commands Module
//!
//! Everything the UI can ask of the register.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (report helper)
//! ├── cart.rs      ◄─── add / quantity / remove / crew / customer
//! ├── ticket.rs    ◄─── park / resume / checkout / delete / status
//! ├── catalog.rs   ◄─── products, services, categories
//! ├── inventory.rs ◄─── stock edits, log, summary
//! ├── customer.rs  ◄─── customers and vehicles
//! ├── staff.rs     ◄─── employees, roles, crew, commission
//! ├── expense.rs   ◄─── expenses and totals
//! ├── settings.rs  ◄─── store settings
//! └── sync.rs      ◄─── status and manual trigger
//! ```
//!
//! ## Mutation Boundary
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pub async fn park_ticket(shell, name) -> Result<Ticket, ApiError>      │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  report(shell, "Park ticket", result, |t| format!("Parked {}", t.name)) │
//! │         │                                                               │
//! │         ├── Ok  ──► Notification::success ──► Ok(value)                 │
//! │         └── Err ──► tracing::warn! ──► ApiError ──► Notification::error │
//! │                                                 ──► Err(ApiError)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads (`get_cart`, `list_products`, ...) return `ApiError` but do not
//! notify.

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod expense;
pub mod inventory;
pub mod settings;
pub mod staff;
pub mod sync;
pub mod ticket;

use std::fmt::Display;

use tracing::warn;

use crate::error::ApiError;
use crate::notify::Notification;
use crate::Shell;

/// Turns the outcome of a mutating command into exactly one notification.
pub(crate) fn report<T, E>(
    shell: &Shell,
    action: &str,
    result: Result<T, E>,
    success: impl FnOnce(&T) -> String,
) -> Result<T, ApiError>
where
    E: Into<ApiError> + Display,
{
    match result {
        Ok(value) => {
            shell
                .notifier
                .notify(Notification::success(action, success(&value)));
            Ok(value)
        }
        Err(e) => {
            warn!(action, error = %e, "Command failed");
            let err: ApiError = e.into();
            shell.notifier.notify(Notification::error(action, &err));
            Err(err)
        }
    }
}

/// [`report`] for commands that wrote to the store: a success also
/// nudges the sync engine.
pub(crate) fn report_write<T, E>(
    shell: &Shell,
    action: &str,
    result: Result<T, E>,
    success: impl FnOnce(&T) -> String,
) -> Result<T, ApiError>
where
    E: Into<ApiError> + Display,
{
    let reported = report(shell, action, result, success);
    if reported.is_ok() {
        shell.local_write_committed();
    }
    reported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::notify::NotificationLevel;
    use crate::testing::fixture;
    use gloss_db::DbError;

    #[tokio::test]
    async fn test_report_success_notifies_once() {
        let fx = fixture().await;
        let value = report(&fx.shell, "Save", Ok::<_, ApiError>(7), |v| format!("Saved {v}")).unwrap();

        assert_eq!(value, 7);
        let notes = fx.notes.take();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert_eq!(notes[0].message, "Saved 7");
    }

    #[tokio::test]
    async fn test_report_converts_and_notifies_error() {
        let fx = fixture().await;
        let err = report(
            &fx.shell,
            "Delete",
            Err::<(), _>(DbError::not_found("Product", "p-9")),
            |_| String::new(),
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::NotFound);
        let note = fx.notes.last().unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert_eq!(note.code, Some(ErrorCode::NotFound));
        assert_eq!(note.title, "Delete");
    }
}
