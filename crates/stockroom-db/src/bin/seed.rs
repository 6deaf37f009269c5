//! # Seed Data Generator
//!
//! Populates the database with a sample catalog for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 products (default) in the configured database
//! cargo run -p stockroom-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p stockroom-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p stockroom-db --bin seed -- --db ./data/stockroom.db
//! ```
//!
//! ## Generated Products
//! Realistic grocery items across categories. A share of them is seeded
//! close to the low-stock threshold or near expiry so that the alert scan
//! printed at the end has something to report.

use chrono::{Days, NaiveDate, Utc};
use std::env;
use std::path::PathBuf;
use stockroom_core::NewProduct;
use stockroom_db::{AlertMonitor, Database, DbConfig, StockroomConfig};
use tracing_subscriber::EnvFilter;

/// Product categories and whether their items carry an expiry date.
const CATEGORIES: &[(&str, bool, &[&str])] = &[
    (
        "Beverages",
        false,
        &[
            "Sparkling Water",
            "Orange Juice",
            "Apple Juice",
            "Iced Tea",
            "Cola",
            "Ginger Ale",
            "Cold Brew Coffee",
            "Lemonade",
        ],
    ),
    (
        "Dairy",
        true,
        &[
            "Whole Milk",
            "Oat Milk",
            "Greek Yoghurt",
            "Cheddar",
            "Mozzarella",
            "Butter",
            "Cream Cheese",
            "Eggs Dozen",
        ],
    ),
    (
        "Bakery",
        true,
        &[
            "White Bread",
            "Sourdough",
            "Bagels",
            "Croissants",
            "Tortillas",
            "Muffins",
        ],
    ),
    (
        "Pantry",
        false,
        &[
            "Rice",
            "Spaghetti",
            "Penne",
            "Canned Tomatoes",
            "Chickpeas",
            "Peanut Butter",
            "Honey",
            "Rolled Oats",
            "Flour",
            "Sugar",
        ],
    ),
    (
        "Frozen",
        true,
        &[
            "Vanilla Ice Cream",
            "Frozen Peas",
            "Fish Fingers",
            "Frozen Pizza",
            "Berries Mix",
        ],
    ),
];

/// Pack sizes and their price addon in cents.
const SIZES: &[(&str, i64)] = &[("Small", 0), ("Regular", 120), ("Family", 340), ("Bulk", 700)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,sqlx=warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
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
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>      Database file path (default: from config)");
                println!("      --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    let mut config = StockroomConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    let resolved = config.database.resolved_path();

    println!("Stockroom Seed Data Generator");
    println!("=============================");
    println!("Database: {}", resolved.display());
    println!("Products: {}", count);
    println!();

    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(DbConfig::from_settings(&config.database)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating products...");

    let today = Utc::now().date_naive();
    let mut generated = 0;
    let start = std::time::Instant::now();

    'outer: for (category, perishable, names) in CATEGORIES {
        for name in names.iter() {
            for (price_addon, size) in SIZES.iter().map(|(s, a)| (*a, *s)) {
                if generated >= count {
                    break 'outer;
                }

                let product = generate_product(
                    category,
                    *perishable,
                    name,
                    size,
                    price_addon,
                    generated,
                    today,
                );

                if let Err(e) = db.products().insert(&product).await {
                    eprintln!("Failed to insert {}: {}", product.name, e);
                    continue;
                }

                generated += 1;
                if generated % 50 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);

    println!();
    println!("Scanning for alerts...");
    let (monitor, _handle) = AlertMonitor::new(db.clone(), config.alerts.clone());
    let report = monitor.scan_once().await?;
    println!("  Low stock: {}", report.low_stock().count());
    println!("  Expired or expiring soon: {}", report.expiry().count());

    let search_results = db.products().search("milk", 10).await?;
    println!("  Search 'milk': {} results", search_results.len());

    db.close().await;
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates one product. `seed` drives price, stock and expiry spread.
fn generate_product(
    category: &str,
    perishable: bool,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
    today: NaiveDate,
) -> NewProduct {
    // 0.99 - 8.98 + size addon
    let price_cents = 99 + ((seed * 37) % 800) as i64 + price_addon;

    // roughly one in six lands at or under the default low-stock threshold
    let quantity = if seed % 6 == 0 {
        (seed % 8) as i64
    } else {
        20 + ((seed * 13) % 180) as i64
    };

    // perishables: -2 .. 57 days out, so a few are expired or expiring
    let expiry_date = perishable.then(|| {
        let offset = (seed * 7) % 60;
        if offset < 2 {
            today.checked_sub_days(Days::new(2 - offset as u64))
        } else {
            today.checked_add_days(Days::new(offset as u64 - 2))
        }
    });

    NewProduct {
        name: format!("{} {}", name, size),
        category: category.to_string(),
        quantity,
        price_cents,
        expiry_date: expiry_date.flatten(),
    }
}
