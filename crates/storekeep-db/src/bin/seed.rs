//! # Seed Data Generator
//!
//! Populates a development database with a small catalog, a few customers
//! and a discount code.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in storekeep.toml (or the platform default)
//! cargo run -p storekeep-db --bin seed
//!
//! # Explicit config file and product count
//! cargo run -p storekeep-db --bin seed -- --config ./storekeep.toml --count 200
//!
//! # More logging
//! RUST_LOG=debug cargo run -p storekeep-db --bin seed
//! ```
//!
//! ## Generated Data
//! - Products: `{CATEGORY}-{NAME}-{INDEX}` SKUs, stock 0-60, minimum level 5
//! - Customers: three accounts with the default credit limit
//! - Discount: `WELCOME10`, 10% off orders of $20.00 or more, 30 days

use std::env;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use storekeep_core::{DiscountKind, InventoryAction, NewCustomer, NewDiscount, NewProduct};
use storekeep_db::{Database, StoreConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Product categories for realistic test data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &["Green Tea", "Black Tea", "Instant Coffee", "Mango Juice", "Still Water"],
    ),
    (
        "GRO",
        &["Basmati Rice", "Maize Flour", "Sugar", "Cooking Oil", "Red Lentils"],
    ),
    (
        "DRY",
        &["Fresh Milk", "Yogurt", "Butter", "Cheddar", "Eggs Tray"],
    ),
    (
        "HOU",
        &["Bar Soap", "Laundry Powder", "Dish Liquid", "Matches", "Candles"],
    ),
];

const CUSTOMERS: &[(&str, &str)] = &[
    ("Amina Njeri", "amina@example.com"),
    ("Brian Otieno", "brian@example.com"),
    ("Chen Wei", "chen@example.com"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storekeep=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 20;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(count);
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storekeep Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of products to generate (default: 20)");
                println!("      --config <PATH>  storekeep.toml to load");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let config = StoreConfig::load(config_path)?;
    info!(path = %config.database.path.display(), count, "Seeding database");

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(config.db_config()).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        db.close().await;
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;

    'outer: for (category, names) in CATEGORIES {
        for (index, name) in names.iter().enumerate() {
            if generated >= count {
                break 'outer;
            }

            let seed = generated * 7 + index;
            let input = NewProduct {
                sku: format!(
                    "{}-{}-{:03}",
                    category,
                    name.replace(' ', "").to_uppercase().chars().take(3).collect::<String>(),
                    generated
                ),
                barcode: Some(format!("590{:010}", seed)),
                name: name.to_string(),
                description: None,
                price_cents: 99 + ((seed * 37) % 1900) as i64,
                cost_cents: 60 + ((seed * 23) % 1000) as i64,
                min_stock_level: Some(5),
            };

            let product = match db.products().create(&input).await {
                Ok(product) => product,
                Err(e) => {
                    warn!(sku = %input.sku, error = %e, "Failed to insert product");
                    continue;
                }
            };

            let stock = (seed % 61) as i64;
            db.inventory()
                .set_quantity(&product.id, stock, "Opening stock", InventoryAction::Restock, Some("seed"))
                .await?;

            generated += 1;
        }
    }

    for (name, email) in CUSTOMERS {
        db.customers()
            .create(&NewCustomer {
                name: name.to_string(),
                email: Some(email.to_string()),
                ..NewCustomer::default()
            })
            .await?;
    }

    let now = Utc::now();
    db.discounts()
        .create(&NewDiscount {
            code: "WELCOME10".to_string(),
            name: "Welcome 10%".to_string(),
            description: Some("10% off a first order".to_string()),
            kind: DiscountKind::Percentage,
            value: 1_000,
            min_order_cents: Some(2_000),
            max_discount_cents: None,
            starts_at: now,
            ends_at: now + Duration::days(30),
            usage_limit: None,
        })
        .await?;

    let low = db.inventory().get_low_stock().await?;
    info!(
        products = generated,
        customers = CUSTOMERS.len(),
        low_stock = low.len(),
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}
