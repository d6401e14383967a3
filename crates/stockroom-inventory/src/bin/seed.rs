//! # Inventory Seed & Walkthrough
//!
//! Seeds a catalog of sizes with stock and walks one order through its
//! lifecycle, printing the resulting stock and ledger.
//!
//! ## Usage
//! ```bash
//! # In-memory database (default)
//! cargo run -p stockroom-inventory --bin seed
//!
//! # Persist to a file
//! cargo run -p stockroom-inventory --bin seed -- --db ./stockroom_dev.db
//!
//! # Load settings from a config file
//! cargo run -p stockroom-inventory --bin seed -- --config ./inventory.toml
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use stockroom_core::{ItemKey, LineItem, Money, Order, Percent, StockInRequest};
use stockroom_inventory::{
    init_tracing, Collaborators, InMemoryStockStatusCache, InventoryConfig, InventoryService,
    StaticOrderReferences, StaticVariantCatalog,
};

/// (variant, colour code, unit cost of the first batch)
const VARIANTS: &[(&str, &str, i64)] = &[
    ("tee-black", "BLK", 80),
    ("tee-white", "WHT", 75),
    ("tee-navy", "NVY", 90),
];

const SIZES: &[&str] = &["S", "M", "L", "XL"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Inventory Seed");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: in-memory)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = InventoryConfig::load_or_default(config_path);
    if db_path.is_some() {
        config.database.path = db_path;
    }

    println!("🌱 Stockroom Inventory Seed");
    println!("===========================");
    match &config.database.path {
        Some(path) => println!("Database: {}", path.display()),
        None => println!("Database: in-memory"),
    }
    println!();

    let mut catalog = StaticVariantCatalog::new();
    for (variant, colour, _) in VARIANTS {
        for size in SIZES {
            catalog = catalog.with_sku(
                ItemKey::new("tee", *variant, *size),
                format!("TEE-{}-{}", colour, size),
            );
        }
    }

    let cache = Arc::new(InMemoryStockStatusCache::new());
    let service = InventoryService::open(
        config,
        Collaborators {
            catalog: Arc::new(catalog),
            orders: Arc::new(StaticOrderReferences::new()),
            stock_status: cache.clone(),
        },
    )
    .await?;

    println!("✓ Connected to database");

    // Two batches per size: the second one 20% dearer
    let mut received = 0;
    for (variant, _, cost) in VARIANTS {
        for (n, size) in SIZES.iter().enumerate() {
            let key = ItemKey::new("tee", *variant, *size);
            let first = StockInRequest::restock(20 + 5 * n as i64, Money::from_units(*cost))
                .target_profit(Percent::from_percent(40))
                .discount(Percent::from_percent(10))
                .reference(format!("PO-{}-{}-1", variant, size));
            let second = StockInRequest::restock(10, Money::from_units(cost * 6 / 5))
                .reference(format!("PO-{}-{}-2", variant, size));

            for request in [first, second] {
                match service.stock_in(&key, &request).await {
                    Ok(_) => received += 1,
                    Err(e) if e.is_duplicate() => {}
                    Err(e) => eprintln!("Failed to receive {}: {}", key, e),
                }
            }
        }
    }
    println!("✓ Received {} batches", received);

    let order = Order {
        id: "ORD-SEED-1".to_string(),
        items: vec![
            LineItem::new(ItemKey::new("tee", "tee-black", "M"), 2),
            LineItem::new(ItemKey::new("tee", "tee-navy", "XL"), 1),
        ],
    };

    println!();
    println!("Order {}:", order.id);
    service.reserve(&order.items, &order.id).await?;
    println!("  ✓ reserved");
    match service.deduct_for_order(&order, Some("seed")).await {
        Ok(receipts) => println!("  ✓ deducted {} lines", receipts.len()),
        Err(e) if e.is_duplicate() => {
            service.release(&order.items, &order.id).await?;
            println!("  ⚠ already deducted in this database; hold released");
        }
        Err(e) => return Err(e.into()),
    }

    println!();
    println!("{:<14} {:>5} {:>5} {:>8} {:>8}", "SKU", "QTY", "RES", "AVG", "PRICE");
    let pricing = service.get_variant_pricing("tee-black").await?;
    for size in &pricing.sizes {
        println!(
            "{:<14} {:>5} {:>5} {:>8} {:>8}",
            size.sku,
            size.quantity,
            size.quantity - size.available,
            size.average_cost_price.units(),
            size.final_price.units()
        );
    }

    let info = service.get_product_stock_info("tee").await?;
    println!();
    println!(
        "Product tee: {} ({} on hand, {} available)",
        info.status, info.total_quantity, info.total_available
    );
    if let Some(published) = cache.get("tee").await {
        println!("Catalog cache: {}", published.status);
    }

    let history = service
        .item_history(&ItemKey::new("tee", "tee-black", "M"))
        .await?;
    println!();
    println!("Ledger for TEE-BLK-M:");
    for row in history {
        println!(
            "  #{:<4} {:<6} {:<10} {:>+5} → {:>4} @ {}",
            row.seq,
            row.transaction_type.to_string(),
            row.reason.to_string(),
            row.quantity_change,
            row.quantity_after,
            row.cost_price
        );
    }

    let pending = service.pending_reconciliation().await?;
    println!();
    println!("Pending reconciliation: {}", pending.len());

    service.database().close().await;
    println!();
    println!("✓ Done");

    Ok(())
}
