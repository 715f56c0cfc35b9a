//! # Demo Data Seeder
//!
//! Populates a local store with the demo detailing shop.
//!
//! ## Usage
//! ```bash
//! # Seed ./gloss_dev.db (default)
//! cargo run -p gloss-db --bin seed
//!
//! # Specify database path
//! cargo run -p gloss-db --bin seed -- --db ./data/gloss.db
//! ```
//!
//! Nothing is written when the store already holds products.

use std::env;

use gloss_db::seed::seed_demo;
use gloss_db::{DbConfig, LocalStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./gloss_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Gloss POS Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./gloss_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    println!("Gloss POS Demo Seeder");
    println!("=====================");
    println!("Database: {}", db_path);
    println!();

    let store = LocalStore::open(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = store.products().list().await?.len();
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let demo = seed_demo(&store).await?;
    let services = store.services().views().await?;
    let pending = store.outbox().count_pending().await?;

    println!();
    println!("✓ Seeded {} services", services.len());
    for view in &services {
        let state = if view.availability.overall.is_out {
            "out of stock"
        } else if view.availability.overall.is_low {
            "low stock"
        } else {
            "available"
        };
        println!("  {} ({} variants): {}", view.service.name, view.variants.len(), state);
    }
    println!("  Crew: {}", demo.detailer_id);
    println!("  Outbox entries waiting for sync: {}", pending);

    println!();
    println!("✓ Seed complete!");
    store.close().await;

    Ok(())
}
