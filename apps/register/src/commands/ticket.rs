//! # Ticket Commands
//!
//! Persisting the active cart: park, resume, checkout, and the ticket
//! history around them.
//!
//! ## Checkout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock cart ──► begin_checkout() ──► TicketDraft      (CheckingOut)      │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │        tickets().checkout(request)  ← one WriteTx: PAID ticket, items,  │
//! │                      │               crew snapshots, stock, logs,       │
//! │          ┌───────────┴───────────┐   outbox rows                        │
//! │          ▼                       ▼                                      │
//! │   complete_checkout()      fail_checkout()                              │
//! │   (Empty)                  (Composing, nothing written)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart lock is held for the whole checkout, so nothing can edit the
//! cart between the draft and the result.

use serde::Serialize;
use tracing::{debug, info};

use gloss_core::views::TicketView;
use gloss_core::{PaymentMethod, Ticket, TicketStatus};
use gloss_db::{CheckoutReceipt, CheckoutRequest};

use crate::commands::cart::{respond, CartResponse};
use crate::commands::report_write;
use crate::error::ApiError;
use crate::Shell;

/// What the receipt printer needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub ticket_id: String,
    pub store_name: String,
    pub ticket_name: String,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: String,
    pub tax: String,
    pub total: String,
    pub payment_method: PaymentMethod,
    pub cashier: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price: String,
    pub line_total: String,
    pub crew: Vec<String>,
}

impl ReceiptResponse {
    fn build(shell: &Shell, receipt: &CheckoutReceipt, payment_method: PaymentMethod) -> Self {
        let config = shell.config();
        let money = |cents: i64| config.format_currency(cents);
        ReceiptResponse {
            ticket_id: receipt.ticket.id.clone(),
            store_name: config.store_name.clone(),
            ticket_name: receipt.ticket.name.clone(),
            lines: receipt
                .items
                .iter()
                .map(|item| ReceiptLine {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: money(item.unit_price_cents),
                    line_total: money(item.unit_price_cents * item.quantity),
                    crew: item.crew.iter().map(|c| c.name.clone()).collect(),
                })
                .collect(),
            subtotal: money(receipt.ticket.subtotal_cents),
            tax: money(receipt.ticket.tax_cents),
            total: money(receipt.ticket.total_cents),
            payment_method,
            cashier: shell.actor().map(|a| a.name),
        }
    }
}

// =============================================================================
// Park / Resume
// =============================================================================

/// Saves the cart as a PENDING ticket and empties the register.
///
/// Parking a resumed ticket updates it in place; parking it again with no
/// edits writes nothing.
pub async fn park_ticket(shell: &Shell, name: Option<&str>) -> Result<Ticket, ApiError> {
    let result: Result<Ticket, ApiError> = async {
        let mut cart = shell.register.lock().await;
        if let Some(name) = name {
            cart.set_name(name)?;
        }
        let ticket = shell.store.tickets().park(&cart.to_ticket_draft()).await?;
        cart.clear();
        Ok(ticket)
    }
    .await;

    report_write(shell, "Park ticket", result, |t| format!("Parked {}", t.name))
}

pub async fn list_parked(shell: &Shell) -> Result<Vec<Ticket>, ApiError> {
    Ok(shell.store.tickets().parked().await?)
}

/// Loads a parked ticket into the register, replacing whatever was there.
pub async fn resume_ticket(shell: &Shell, ticket_id: &str) -> Result<CartResponse, ApiError> {
    let result: Result<CartResponse, ApiError> = async {
        let parked = shell.store.tickets().resume(ticket_id).await?;
        let mut cart = shell.register.lock().await;
        if !cart.is_empty() && cart.ticket_id() != Some(ticket_id) {
            debug!(discarded = cart.lines().len(), "Unsaved cart replaced by resume");
        }
        cart.load(&parked.ticket, &parked.items, parked.customer)?;
        respond(shell, &cart).await
    }
    .await;

    crate::commands::report(shell, "Resume ticket", result, |r| {
        format!("Resumed {}", r.cart.name())
    })
}

// =============================================================================
// Checkout
// =============================================================================

pub async fn checkout(
    shell: &Shell,
    payment_method: PaymentMethod,
) -> Result<ReceiptResponse, ApiError> {
    let result: Result<ReceiptResponse, ApiError> = async {
        let mut cart = shell.register.lock().await;
        let draft = cart.begin_checkout()?;

        let request = CheckoutRequest {
            draft,
            payment_method,
            reason: shell.config().sale_reason,
            actor: shell.actor(),
        };

        match shell.store.tickets().checkout(request).await {
            Ok(receipt) => {
                cart.complete_checkout()?;
                info!(
                    ticket_id = %receipt.ticket.id,
                    total_cents = receipt.ticket.total_cents,
                    decremented = receipt.logs.len(),
                    "Checkout complete"
                );
                Ok(ReceiptResponse::build(shell, &receipt, payment_method))
            }
            Err(e) => {
                cart.fail_checkout();
                Err(e.into())
            }
        }
    }
    .await;

    report_write(shell, "Checkout", result, |r| format!("Paid {}", r.total))
}

// =============================================================================
// History
// =============================================================================

/// Removes a ticket and its items, parked or paid. There is no undo.
///
/// When the ticket is the one loaded in the register, the register is
/// cleared as well.
pub async fn delete_ticket(shell: &Shell, ticket_id: &str) -> Result<(), ApiError> {
    let result: Result<(), ApiError> = async {
        let mut cart = shell.register.lock().await;
        shell.store.tickets().delete(ticket_id).await?;
        if cart.ticket_id() == Some(ticket_id) {
            cart.clear();
        }
        Ok(())
    }
    .await;

    report_write(shell, "Delete ticket", result, |_| "Ticket deleted".to_string())
}

/// Closes a parked ticket as COMPLETED or CANCELLED.
pub async fn set_ticket_status(
    shell: &Shell,
    ticket_id: &str,
    status: TicketStatus,
) -> Result<Ticket, ApiError> {
    let result: Result<Ticket, ApiError> = async {
        let mut cart = shell.register.lock().await;
        let ticket = shell.store.tickets().update_status(ticket_id, status).await?;
        if cart.ticket_id() == Some(ticket_id) {
            cart.clear();
        }
        Ok(ticket)
    }
    .await;

    report_write(shell, "Ticket status", result, |t| {
        format!("{} is now {:?}", t.name, t.status)
    })
}

pub async fn ticket_views(
    shell: &Shell,
    status: Option<TicketStatus>,
) -> Result<Vec<TicketView>, ApiError> {
    Ok(shell.store.tickets().views(status).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::{add_product, add_service, toggle_crew};
    use crate::error::ErrorCode;
    use crate::notify::NotificationLevel;
    use crate::testing::fixture;
    use gloss_core::cart::CartPhase;

    #[tokio::test]
    async fn test_checkout_clears_cart_and_prints_receipt() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.shampoo_id, None).await.unwrap();

        let receipt = checkout(&fx.shell, PaymentMethod::Cash).await.unwrap();

        assert_eq!(receipt.total, "$1.00");
        assert_eq!(receipt.cashier.as_deref(), Some("Rosa"));
        assert_eq!(fx.shell.register.snapshot().await.phase(), CartPhase::Empty);
        let level = fx.shell.store.inventory().level(&fx.demo.shampoo_id).await.unwrap();
        assert_eq!(level.quantity, 4);
        assert_eq!(fx.notes.last().unwrap().title, "Checkout");
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart_composing() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.ceramic_id, Some(2)).await.unwrap();

        let err = checkout(&fx.shell, PaymentMethod::Card).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientStock);
        let cart = fx.shell.register.snapshot().await;
        assert_eq!(cart.phase(), CartPhase::Composing);
        assert_eq!(cart.lines()[0].quantity, 2);
        assert_eq!(fx.notes.last().unwrap().level, NotificationLevel::Error);
        assert!(fx.shell.store.tickets().list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_checkout_is_a_cart_error() {
        let fx = fixture().await;
        let err = checkout(&fx.shell, PaymentMethod::Cash).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CartError);
    }

    #[tokio::test]
    async fn test_park_resume_park_round_trip() {
        let fx = fixture().await;
        add_service(&fx.shell, &fx.demo.wash_service_id, None).await.unwrap();
        toggle_crew(&fx.shell, &fx.demo.wash_variant_id, &fx.demo.detailer_id)
            .await
            .unwrap();

        let parked = park_ticket(&fx.shell, Some("Bay 1")).await.unwrap();
        assert!(fx.shell.register.snapshot().await.is_empty());
        assert_eq!(list_parked(&fx.shell).await.unwrap().len(), 1);

        let resumed = resume_ticket(&fx.shell, &parked.id).await.unwrap();
        assert_eq!(resumed.cart.ticket_id(), Some(parked.id.as_str()));
        assert_eq!(resumed.cart.lines()[0].crew.len(), 1);

        let outbox_before = fx.shell.store.outbox().count_pending().await.unwrap();
        let again = park_ticket(&fx.shell, None).await.unwrap();
        assert_eq!(again.id, parked.id);
        assert_eq!(again.updated_at, parked.updated_at);
        assert_eq!(
            fx.shell.store.outbox().count_pending().await.unwrap(),
            outbox_before
        );
        assert_eq!(list_parked(&fx.shell).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_replaces_unsaved_cart() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.wax_id, None).await.unwrap();
        let parked = park_ticket(&fx.shell, Some("Morning")).await.unwrap();

        add_product(&fx.shell, &fx.demo.shampoo_id, Some(3)).await.unwrap();
        let resumed = resume_ticket(&fx.shell, &parked.id).await.unwrap();

        assert_eq!(resumed.cart.lines().len(), 1);
        assert_eq!(resumed.cart.lines()[0].id, fx.demo.wax_id);
    }

    #[tokio::test]
    async fn test_delete_loaded_ticket_clears_register() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.wax_id, None).await.unwrap();
        let parked = park_ticket(&fx.shell, None).await.unwrap();
        resume_ticket(&fx.shell, &parked.id).await.unwrap();

        delete_ticket(&fx.shell, &parked.id).await.unwrap();

        assert!(fx.shell.register.snapshot().await.is_empty());
        assert!(fx.shell.store.tickets().get(&parked.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_paid_ticket_from_history() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.wax_id, None).await.unwrap();
        let receipt = checkout(&fx.shell, PaymentMethod::Cash).await.unwrap();

        delete_ticket(&fx.shell, &receipt.ticket_id).await.unwrap();

        assert!(fx.shell.store.tickets().get(&receipt.ticket_id).await.unwrap().is_none());
        assert!(fx.shell.store.tickets().items(&receipt.ticket_id).await.unwrap().is_empty());

        let err = delete_ticket(&fx.shell, &receipt.ticket_id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_cancel_parked_ticket() {
        let fx = fixture().await;
        add_product(&fx.shell, &fx.demo.wax_id, None).await.unwrap();
        let parked = park_ticket(&fx.shell, None).await.unwrap();

        let cancelled = set_ticket_status(&fx.shell, &parked.id, TicketStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
        assert!(list_parked(&fx.shell).await.unwrap().is_empty());
    }
}
