//! # Gloss Register Entry Point
//!
//! Headless register: opens the local store, starts sync and, on a fresh
//! database, seeds the demo catalog and rings up one sale.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  init_tracing ──► database_path ──► open_shell ──► start_sync           │
//! │                                                        │                │
//! │            fresh store? ──► seed_demo ──► demo sale ───┤                │
//! │                                                        ▼                │
//! │                                      print sync status ──► shutdown     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `GLOSS_DB_PATH` picks the database file; `RUST_LOG` the log level. The
//! sync remote is the in-process one, so this binary never needs a network.

use std::error::Error;
use std::sync::Arc;

use tracing::info;

use gloss_core::PaymentMethod;
use gloss_db::seed::{seed_demo, DemoData};
use gloss_db::DbConfig;
use gloss_register::commands::{cart, staff, sync, ticket};
use gloss_register::notify::LogNotifier;
use gloss_register::state::LocalSession;
use gloss_register::{database_path, init_tracing, open_shell, Shell};
use gloss_sync::{MemoryRemote, SyncConfig};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("gloss-register: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let path = database_path()?;
    info!(?path, "Opening register database");

    let mut shell = open_shell(
        DbConfig::new(path),
        Arc::new(LocalSession::anonymous()),
        Arc::new(LogNotifier),
    )
    .await?;

    let demo = if shell.store.products().list().await?.is_empty() {
        Some(seed_demo(&shell.store).await?)
    } else {
        None
    };

    shell.start_sync(MemoryRemote::new(), SyncConfig::load_or_default(None))?;

    if let Some(demo) = demo {
        demo_sale(&shell, &demo).await?;
    } else {
        let parked = ticket::list_parked(&shell).await?;
        info!(parked = parked.len(), "Existing store, skipping demo sale");
    }

    let status = sync::sync_status(&shell).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    shell.shutdown().await;
    Ok(())
}

/// Park, resume and pay for a wash with a shampoo add-on.
async fn demo_sale(shell: &Shell, demo: &DemoData) -> Result<(), Box<dyn Error>> {
    staff::sign_in(shell, &demo.detailer_id).await?;

    cart::add_service(shell, &demo.wash_service_id, None).await?;
    cart::toggle_crew(shell, &demo.wash_variant_id, &demo.detailer_id).await?;
    cart::add_product(shell, &demo.shampoo_id, None).await?;
    cart::set_customer(shell, Some(&demo.customer_id)).await?;

    let parked = ticket::park_ticket(shell, None).await?;
    ticket::resume_ticket(shell, &parked.id).await?;

    let receipt = ticket::checkout(shell, PaymentMethod::Cash).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}
