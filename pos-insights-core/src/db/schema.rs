//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Timestamps are stored as fixed-width RFC 3339 UTC text so that range
//! filters can compare them lexically.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: POS records
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS products (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        sku              TEXT NOT NULL,
        cost_price       REAL,
        stock_quantity   INTEGER NOT NULL DEFAULT 0,
        category_id      TEXT REFERENCES categories(id),
        supplier_id      TEXT,
        created_at       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_products_stock ON products(stock_quantity);

    CREATE TABLE IF NOT EXISTS stock_movements (
        id               TEXT PRIMARY KEY,
        product_id       TEXT NOT NULL REFERENCES products(id),
        quantity         INTEGER NOT NULL,
        reason           TEXT,
        created_at       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_stock_movements_product
        ON stock_movements(product_id, created_at DESC);

    CREATE TABLE IF NOT EXISTS customers (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        email            TEXT,
        phone            TEXT,
        created_at       TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS loans (
        id               TEXT PRIMARY KEY,
        customer_id      TEXT NOT NULL REFERENCES customers(id),
        amount           REAL NOT NULL,
        created_at       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_loans_customer ON loans(customer_id);

    CREATE TABLE IF NOT EXISTS sales (
        id               TEXT PRIMARY KEY,
        customer_id      TEXT REFERENCES customers(id),
        status           TEXT NOT NULL,
        created_at       TEXT NOT NULL,
        total_amount     REAL NOT NULL,
        payment_method   TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sales_status_created ON sales(status, created_at);
    CREATE INDEX IF NOT EXISTS idx_sales_customer ON sales(customer_id);

    CREATE TABLE IF NOT EXISTS sale_items (
        id               TEXT PRIMARY KEY,
        sale_id          TEXT NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
        position         INTEGER NOT NULL,
        product_id       TEXT NOT NULL REFERENCES products(id),
        quantity         INTEGER NOT NULL CHECK (quantity > 0),
        unit_price       REAL NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sale_items_sale ON sale_items(sale_id, position);
    CREATE INDEX IF NOT EXISTS idx_sale_items_product ON sale_items(product_id);
    "#,
    // Version 2: persistent report cache
    r#"
    CREATE TABLE IF NOT EXISTS report_cache (
        key              TEXT PRIMARY KEY,
        value            TEXT NOT NULL,
        created_at       TEXT NOT NULL,
        expires_at       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_report_cache_expiry ON report_cache(expires_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
