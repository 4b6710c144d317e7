//! Database repository layer
//!
//! Provides the SQLite-backed [`RecordSource`] and [`ResultCache`], plus the
//! write operations used by the importer and tests.

use crate::cache::{self, ResultCache};
use crate::error::{Error, Result};
use crate::source::RecordSource;
use crate::types::*;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Product columns shared by every query that loads a product with its
/// category. Read with [`ProductRow::read`].
const PRODUCT_COLUMNS: &str = "p.id, p.name, p.sku, p.cost_price, p.stock_quantity, \
     p.supplier_id, p.created_at, c.id, c.name";
const PRODUCT_COLUMN_COUNT: usize = 9;

/// Counts of rows written by [`Database::import_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub categories: usize,
    pub products: usize,
    pub stock_movements: usize,
    pub customers: usize,
    pub loans: usize,
    pub sales: usize,
    pub sale_items: usize,
}

/// Encode a timestamp for storage.
///
/// Fixed-width microsecond precision with a `Z` suffix keeps lexical order
/// equal to chronological order.
pub(crate) fn to_db_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(table: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad timestamp {:?}: {}", value, e)))
}

fn corrupt(table: &str, message: impl Into<String>) -> Error {
    Error::CorruptRecord {
        table: table.to_string(),
        message: message.into(),
    }
}

/// Latest expiry the text encoding can represent in order.
fn max_stored_expiry() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================
// Raw rows
// ============================================

struct ProductRow {
    id: String,
    name: String,
    sku: String,
    cost_price: Option<f64>,
    stock_quantity: i64,
    supplier_id: Option<String>,
    created_at: String,
    category_id: Option<String>,
    category_name: Option<String>,
}

impl ProductRow {
    /// Read [`PRODUCT_COLUMNS`] starting at column `offset`.
    fn read(row: &Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            sku: row.get(offset + 2)?,
            cost_price: row.get(offset + 3)?,
            stock_quantity: row.get(offset + 4)?,
            supplier_id: row.get(offset + 5)?,
            created_at: row.get(offset + 6)?,
            category_id: row.get(offset + 7)?,
            category_name: row.get(offset + 8)?,
        })
    }

    fn into_product(self) -> Result<Product> {
        let category = match (self.category_id, self.category_name) {
            (Some(id), Some(name)) => Some(Category { id, name }),
            _ => None,
        };
        Ok(Product {
            created_at: parse_ts("products", &self.created_at)?,
            id: self.id,
            name: self.name,
            sku: self.sku,
            cost_price: self.cost_price,
            stock_quantity: self.stock_quantity,
            category,
            supplier_id: self.supplier_id,
        })
    }
}

struct SaleRow {
    id: String,
    customer_id: Option<String>,
    status: String,
    created_at: String,
    total_amount: f64,
    payment_method: String,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItem>) -> Result<Sale> {
        Ok(Sale {
            status: self
                .status
                .parse()
                .map_err(|e: String| corrupt("sales", e))?,
            payment_method: self
                .payment_method
                .parse()
                .map_err(|e: String| corrupt("sales", e))?,
            created_at: parse_ts("sales", &self.created_at)?,
            id: self.id,
            customer_id: self.customer_id,
            items,
            total_amount: self.total_amount,
        })
    }
}

struct SaleItemRow {
    sale_id: String,
    id: String,
    quantity: i64,
    unit_price: f64,
    product: ProductRow,
}

impl SaleItemRow {
    fn into_item(self) -> Result<SaleItem> {
        let quantity = u32::try_from(self.quantity).map_err(|_| {
            corrupt(
                "sale_items",
                format!("quantity {} out of range for item {}", self.quantity, self.id),
            )
        })?;
        Ok(SaleItem {
            product: self.product.into_product()?,
            id: self.id,
            quantity,
            unit_price: self.unit_price,
        })
    }
}

// ============================================
// Database
// ============================================

/// Database handle (single connection behind a mutex)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        super::schema::run_migrations(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Source("database connection lock poisoned".to_string()))
    }

    // ============================================
    // Write operations
    // ============================================

    /// Insert or update a category
    pub fn upsert_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn()?;
        Self::write_category(&conn, category)
    }

    /// Insert or update a product, and its category when it has one
    pub fn upsert_product(&self, product: &Product) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(category) = &product.category {
            Self::write_category(&tx, category)?;
        }
        Self::write_product(&tx, &SnapshotProduct::from(product))?;
        tx.commit()?;
        Ok(())
    }

    /// Record a stock movement
    pub fn insert_stock_movement(&self, movement: &StockMovement) -> Result<()> {
        let conn = self.conn()?;
        Self::write_stock_movement(&conn, movement)
    }

    /// Insert or update a customer
    pub fn upsert_customer(&self, customer: &Customer) -> Result<()> {
        let conn = self.conn()?;
        Self::write_customer(&conn, customer)
    }

    /// Record a loan
    pub fn insert_loan(&self, loan: &Loan) -> Result<()> {
        let conn = self.conn()?;
        Self::write_loan(&conn, loan)
    }

    /// Insert or replace a sale together with its items.
    ///
    /// Products referenced by the items must already exist.
    pub fn insert_sale(&self, sale: &Sale) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::write_sale(&tx, &SnapshotSale::from(sale))?;
        tx.commit()?;
        Ok(())
    }

    /// Load a full snapshot in one transaction.
    ///
    /// Existing rows with the same ids are overwritten; nothing is written
    /// if any row fails.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<ImportSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for category in &snapshot.categories {
            Self::write_category(&tx, category)?;
        }
        for product in &snapshot.products {
            Self::write_product(&tx, product)?;
        }
        for movement in &snapshot.stock_movements {
            Self::write_stock_movement(&tx, movement)?;
        }
        for customer in &snapshot.customers {
            Self::write_customer(&tx, customer)?;
        }
        for loan in &snapshot.loans {
            Self::write_loan(&tx, loan)?;
        }
        for sale in &snapshot.sales {
            Self::write_sale(&tx, sale)?;
        }

        tx.commit()?;

        let summary = ImportSummary {
            categories: snapshot.categories.len(),
            products: snapshot.products.len(),
            stock_movements: snapshot.stock_movements.len(),
            customers: snapshot.customers.len(),
            loans: snapshot.loans.len(),
            sales: snapshot.sales.len(),
            sale_items: snapshot.sales.iter().map(|s| s.items.len()).sum(),
        };
        tracing::info!(?summary, "Snapshot imported");
        Ok(summary)
    }

    fn write_category(conn: &Connection, category: &Category) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO categories (id, name) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
            params![category.id, category.name],
        )?;
        Ok(())
    }

    fn write_product(conn: &Connection, product: &SnapshotProduct) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO products (id, name, sku, cost_price, stock_quantity, category_id,
                                  supplier_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                sku = excluded.sku,
                cost_price = excluded.cost_price,
                stock_quantity = excluded.stock_quantity,
                category_id = excluded.category_id,
                supplier_id = excluded.supplier_id
            "#,
            params![
                product.id,
                product.name,
                product.sku,
                product.cost_price,
                product.stock_quantity,
                product.category_id,
                product.supplier_id,
                to_db_ts(product.created_at),
            ],
        )?;
        Ok(())
    }

    fn write_stock_movement(conn: &Connection, movement: &StockMovement) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO stock_movements (id, product_id, quantity, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                movement.id,
                movement.product_id,
                movement.quantity,
                movement.reason,
                to_db_ts(movement.created_at),
            ],
        )?;
        Ok(())
    }

    fn write_customer(conn: &Connection, customer: &Customer) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO customers (id, name, email, phone, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone
            "#,
            params![
                customer.id,
                customer.name,
                customer.email,
                customer.phone,
                to_db_ts(customer.created_at),
            ],
        )?;
        Ok(())
    }

    fn write_loan(conn: &Connection, loan: &Loan) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO loans (id, customer_id, amount, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                loan.id,
                loan.customer_id,
                loan.amount,
                to_db_ts(loan.created_at),
            ],
        )?;
        Ok(())
    }

    fn write_sale(conn: &Connection, sale: &SnapshotSale) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO sales (id, customer_id, status, created_at, total_amount, payment_method)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                customer_id = excluded.customer_id,
                status = excluded.status,
                created_at = excluded.created_at,
                total_amount = excluded.total_amount,
                payment_method = excluded.payment_method
            "#,
            params![
                sale.id,
                sale.customer_id,
                sale.status.as_str(),
                to_db_ts(sale.created_at),
                sale.total_amount,
                sale.payment_method.as_str(),
            ],
        )?;

        conn.execute("DELETE FROM sale_items WHERE sale_id = ?1", [&sale.id])?;

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO sale_items (id, sale_id, position, product_id, quantity, unit_price)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;
        for (position, item) in sale.items.iter().enumerate() {
            stmt.execute(params![
                item.id,
                sale.id,
                position as i64,
                item.product_id,
                item.quantity,
                item.unit_price,
            ])?;
        }
        Ok(())
    }

    // ============================================
    // Read operations
    // ============================================

    /// Load sales matching `filter` (a predicate over alias `s`) with their
    /// items, products and categories, in two queries.
    fn load_sales(conn: &Connection, filter: &str, args: &[&dyn ToSql]) -> Result<Vec<Sale>> {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT s.id, s.customer_id, s.status, s.created_at, s.total_amount, s.payment_method
            FROM sales s
            WHERE {filter}
            ORDER BY s.created_at, s.id
            "#
        ))?;
        let sale_rows = stmt
            .query_map(args, |row| {
                Ok(SaleRow {
                    id: row.get(0)?,
                    customer_id: row.get(1)?,
                    status: row.get(2)?,
                    created_at: row.get(3)?,
                    total_amount: row.get(4)?,
                    payment_method: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT si.sale_id, si.id, si.quantity, si.unit_price, {PRODUCT_COLUMNS}
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            JOIN products p ON p.id = si.product_id
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE {filter}
            ORDER BY si.sale_id, si.position
            "#
        ))?;
        let item_rows = stmt
            .query_map(args, |row| {
                Ok(SaleItemRow {
                    sale_id: row.get(0)?,
                    id: row.get(1)?,
                    quantity: row.get(2)?,
                    unit_price: row.get(3)?,
                    product: ProductRow::read(row, 4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut items_by_sale: HashMap<String, Vec<SaleItem>> = HashMap::new();
        for row in item_rows {
            let sale_id = row.sale_id.clone();
            items_by_sale
                .entry(sale_id)
                .or_default()
                .push(row.into_item()?);
        }

        sale_rows
            .into_iter()
            .map(|row| {
                let items = items_by_sale.remove(&row.id).unwrap_or_default();
                row.into_sale(items)
            })
            .collect()
    }

    /// Count rows in a table (for diagnostics and tests)
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        const TABLES: &[&str] = &[
            "categories",
            "products",
            "stock_movements",
            "customers",
            "loans",
            "sales",
            "sale_items",
            "report_cache",
        ];
        if !TABLES.contains(&table) {
            return Err(Error::InvalidArgument(format!("unknown table: {}", table)));
        }
        let conn = self.conn()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(count)
    }

    /// Drop every cached report. Returns the number of entries removed.
    ///
    /// Called after an import, since any cached report may now be stale.
    pub fn clear_report_cache(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM report_cache", [])?;
        tracing::debug!(removed, "Cleared report cache");
        Ok(removed)
    }
}

impl RecordSource for Database {
    fn sales_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: SaleStatus,
    ) -> Result<Vec<Sale>> {
        let conn = self.conn()?;
        let (start, end) = (to_db_ts(start), to_db_ts(end));
        Self::load_sales(
            &conn,
            "s.status = ?1 AND s.created_at >= ?2 AND s.created_at <= ?3",
            params![status.as_str(), start, end],
        )
    }

    fn products_in_stock(&self, sales_since: DateTime<Utc>) -> Result<Vec<StockedProduct>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS},
                   (SELECT MAX(m.created_at) FROM stock_movements m WHERE m.product_id = p.id)
            FROM products p
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE p.stock_quantity > 0
            ORDER BY p.name, p.id
            "#
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    ProductRow::read(row, 0)?,
                    row.get::<_, Option<String>>(PRODUCT_COLUMN_COUNT)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT si.product_id, si.quantity
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            JOIN products p ON p.id = si.product_id
            WHERE s.status = ?1 AND s.created_at >= ?2 AND p.stock_quantity > 0
            ORDER BY s.created_at, si.position
            "#,
        )?;
        let sold = stmt
            .query_map(
                params![SaleStatus::Completed.as_str(), to_db_ts(sales_since)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut sold_by_product: HashMap<String, Vec<u32>> = HashMap::new();
        for (product_id, quantity) in sold {
            let quantity = u32::try_from(quantity).map_err(|_| {
                corrupt(
                    "sale_items",
                    format!("quantity {} out of range for product {}", quantity, product_id),
                )
            })?;
            sold_by_product.entry(product_id).or_default().push(quantity);
        }

        rows.into_iter()
            .map(|(product, last_movement)| {
                let product = product.into_product()?;
                let last_movement_at = last_movement
                    .map(|ts| parse_ts("stock_movements", &ts))
                    .transpose()?;
                Ok(StockedProduct {
                    recent_sale_quantities: sold_by_product.remove(&product.id).unwrap_or_default(),
                    product,
                    last_movement_at,
                })
            })
            .collect()
    }

    fn customers(&self, customer_id: Option<&str>) -> Result<Vec<CustomerRecord>> {
        let conn = self.conn()?;

        let (customer_filter, sale_filter, loan_filter) = match customer_id {
            Some(_) => ("id = ?1", "s.customer_id = ?1", "customer_id = ?1"),
            None => ("1=1", "s.customer_id IS NOT NULL", "1=1"),
        };
        let args: Vec<&dyn ToSql> = match &customer_id {
            Some(id) => vec![id as &dyn ToSql],
            None => Vec::new(),
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, email, phone, created_at FROM customers
             WHERE {customer_filter} ORDER BY name, id"
        ))?;
        let customer_rows = stmt
            .query_map(args.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut sales_by_customer: HashMap<String, Vec<Sale>> = HashMap::new();
        for sale in Self::load_sales(&conn, sale_filter, args.as_slice())? {
            if let Some(owner) = sale.customer_id.clone() {
                sales_by_customer.entry(owner).or_default().push(sale);
            }
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT id, customer_id, amount, created_at FROM loans
             WHERE {loan_filter} ORDER BY created_at, id"
        ))?;
        let loan_rows = stmt
            .query_map(args.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut loans_by_customer: HashMap<String, Vec<Loan>> = HashMap::new();
        for (id, owner, amount, created_at) in loan_rows {
            let loan = Loan {
                id,
                customer_id: owner.clone(),
                amount,
                created_at: parse_ts("loans", &created_at)?,
            };
            loans_by_customer.entry(owner).or_default().push(loan);
        }

        customer_rows
            .into_iter()
            .map(|(id, name, email, phone, created_at)| {
                Ok(CustomerRecord {
                    sales: sales_by_customer.remove(&id).unwrap_or_default(),
                    loans: loans_by_customer.remove(&id).unwrap_or_default(),
                    customer: Customer {
                        id,
                        name,
                        email,
                        phone,
                        created_at: parse_ts("customers", &created_at)?,
                    },
                })
            })
            .collect()
    }
}

impl ResultCache for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM report_cache WHERE key = ?1 AND expires_at > ?2",
            params![key, to_db_ts(Utc::now())],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now();
        let expires_at = cache::expires_at(now, ttl).min(max_stored_expiry());

        conn.execute(
            "DELETE FROM report_cache WHERE expires_at <= ?1",
            [to_db_ts(now)],
        )?;
        conn.execute(
            r#"
            INSERT INTO report_cache (key, value, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
            params![key, value, to_db_ts(now), to_db_ts(expires_at)],
        )?;
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM report_cache WHERE key = ?1", [key])?;
        Ok(())
    }
}
