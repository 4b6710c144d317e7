//! pos-insights-import - load POS records into the local record store
//!
//! Reads a JSON snapshot (categories, products, stock movements, customers,
//! loans and sales) and writes it into SQLite in a single transaction.

use anyhow::{Context, Result};
use clap::Parser;
use pos_insights_core::{Config, Database, Snapshot};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pos-insights-import")]
#[command(about = "Import a JSON snapshot of POS records")]
#[command(version)]
struct Args {
    /// Snapshot file to import
    snapshot: PathBuf,

    /// Database file (default: from config, else $XDG_DATA_HOME/pos-insights/data.db)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Keep cached reports instead of clearing them after the import
    #[arg(long)]
    keep_cache: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        pos_insights_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(path = %args.snapshot.display(), "Importing snapshot");
    let json = std::fs::read_to_string(&args.snapshot)
        .with_context(|| format!("failed to read {}", args.snapshot.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse snapshot {}", args.snapshot.display()))?;

    // Open database
    let db_path = args.database.unwrap_or_else(|| config.database_path());
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let summary = db
        .import_snapshot(&snapshot)
        .context("failed to import snapshot")?;

    println!("Import complete: {}", db_path.display());
    println!("  Categories:      {}", summary.categories);
    println!("  Products:        {}", summary.products);
    println!("  Stock movements: {}", summary.stock_movements);
    println!("  Customers:       {}", summary.customers);
    println!("  Loans:           {}", summary.loans);
    println!("  Sales:           {}", summary.sales);
    println!("  Sale items:      {}", summary.sale_items);

    if !args.keep_cache {
        let removed = db
            .clear_report_cache()
            .context("failed to clear cached reports")?;
        if removed > 0 {
            println!("Cleared {} cached report(s)", removed);
        }
    }

    Ok(())
}
