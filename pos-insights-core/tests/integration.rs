//! Integration tests for the pos-insights record store and reports
//!
//! These tests load `tests/fixtures/store.json` into a file-backed SQLite
//! database and run every report through the facade, with the clock fixed
//! at 2024-06-30 12:00 UTC.

use chrono::{DateTime, TimeZone, Utc};
use pos_insights_core::analytics::{
    AgeBracket, ChurnRisk, RecommendedAction, Segment, UNCATEGORIZED_ID,
};
use pos_insights_core::cache::MemoryCache;
use pos_insights_core::config::{CacheBackend, CacheConfig, Config};
use pos_insights_core::{
    AnalyticsFacade, Category, Database, GroupBy, PaymentMethod, Product, SegmentFilter, Snapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load_snapshot() -> Snapshot {
    let json = std::fs::read_to_string(fixture_path("store.json")).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
}

fn day_start(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn day_end(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 23, 59, 59).unwrap()
}

/// Open a migrated database in `dir` loaded with the fixture.
fn seeded_db(dir: &TempDir) -> Arc<Database> {
    pos_insights_core::logging::init_test();
    let db = Database::open(&dir.path().join("data.db")).unwrap();
    db.migrate().unwrap();
    db.import_snapshot(&load_snapshot()).unwrap();
    Arc::new(db)
}

fn memory_facade(db: Arc<Database>) -> AnalyticsFacade {
    AnalyticsFacade::new(db, Arc::new(MemoryCache::new()), CacheConfig::default())
        .with_clock(as_of)
}

// ============================================
// Import
// ============================================

#[test]
fn test_import_counts() {
    pos_insights_core::logging::init_test();
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("data.db")).unwrap();
    db.migrate().unwrap();

    let summary = db.import_snapshot(&load_snapshot()).unwrap();
    assert_eq!(summary.categories, 2);
    assert_eq!(summary.products, 5);
    assert_eq!(summary.stock_movements, 3);
    assert_eq!(summary.customers, 3);
    assert_eq!(summary.loans, 1);
    assert_eq!(summary.sales, 6);
    assert_eq!(summary.sale_items, 6);

    // Importing again overwrites rather than duplicates
    db.import_snapshot(&load_snapshot()).unwrap();
    assert_eq!(db.count_rows("sales").unwrap(), 6);
    assert_eq!(db.count_rows("sale_items").unwrap(), 6);
}

// ============================================
// Profit margins
// ============================================

#[test]
fn test_march_margins() {
    let dir = TempDir::new().unwrap();
    let facade = memory_facade(seeded_db(&dir));

    let analysis = facade
        .profit_margins(day_start(2024, 3, 1), day_end(2024, 3, 31), GroupBy::Both)
        .unwrap();

    // s1 + s2; the cancelled s3 is excluded
    assert_eq!(analysis.overall.revenue, 8000.0);
    assert_eq!(analysis.overall.cost, 4000.0);
    assert_eq!(analysis.overall.profit, 4000.0);
    assert_eq!(analysis.overall.margin_percentage, 50.0);

    // Nothing sold in the preceding window
    assert_eq!(analysis.trends.change_percentage, 0.0);
    assert!(!analysis.trends.is_improving);
    assert_eq!(analysis.trends.forecast, 4000.0);

    let categories: Vec<&str> = analysis
        .by_category
        .iter()
        .map(|c| c.category_id.as_str())
        .collect();
    assert_eq!(categories, vec!["drinks", "food"]);
    assert!(!categories.contains(&UNCATEGORIZED_ID));

    let daily_revenue: f64 = analysis.by_time_range.daily.iter().map(|d| d.revenue).sum();
    assert_eq!(daily_revenue, analysis.overall.revenue);
    let category_profit: f64 = analysis.by_category.iter().map(|c| c.profit).sum();
    let product_profit: f64 = analysis.by_product.iter().map(|p| p.profit).sum();
    assert!((category_profit - analysis.overall.profit).abs() < 1e-6);
    assert!((product_profit - analysis.overall.profit).abs() < 1e-6);

    assert_eq!(analysis.by_time_range.monthly.len(), 1);
    assert_eq!(analysis.by_time_range.monthly[0].period, "2024-03");
}

#[test]
fn test_margin_trend_against_previous_window() {
    let dir = TempDir::new().unwrap();
    let facade = memory_facade(seeded_db(&dir));

    // Previous window covers s1 (revenue 2000); current profit is 3000
    let analysis = facade
        .profit_margins(day_start(2024, 3, 15), day_end(2024, 3, 31), GroupBy::Category)
        .unwrap();
    assert_eq!(analysis.overall.profit, 3000.0);
    assert_eq!(analysis.trends.change_percentage, 50.0);
    assert!(analysis.trends.is_improving);
    assert_eq!(analysis.trends.forecast, 4500.0);
    assert!(analysis.by_product.is_empty());
}

#[test]
fn test_repricing_changes_historical_cost() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);

    // Sale items do not snapshot cost, so a new cost price rewrites history
    let juice = Product {
        id: "juice".to_string(),
        name: "Mango Juice 1L".to_string(),
        sku: "JUICE-1".to_string(),
        cost_price: Some(1500.0),
        stock_quantity: 2,
        category: Some(Category {
            id: "drinks".to_string(),
            name: "Drinks".to_string(),
        }),
        supplier_id: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    };
    db.upsert_product(&juice).unwrap();

    let facade = memory_facade(db);
    let analysis = facade
        .profit_margins(day_start(2024, 3, 1), day_end(2024, 3, 31), GroupBy::Product)
        .unwrap();
    assert_eq!(analysis.overall.cost, 1000.0 + 4500.0);
    assert!(analysis.by_category.is_empty());
}

// ============================================
// Customer lifetime value
// ============================================

#[test]
fn test_customer_values() {
    let dir = TempDir::new().unwrap();
    let facade = memory_facade(seeded_db(&dir));

    let values = facade
        .customer_lifetime_values(None, SegmentFilter::All)
        .unwrap();

    // carol has no sales and is skipped
    let ids: Vec<&str> = values.iter().map(|v| v.customer_id.as_str()).collect();
    assert_eq!(ids, vec!["bob", "alice"]);

    let bob = &values[0];
    assert_eq!(bob.metrics.total_purchases, 3);
    assert_eq!(bob.metrics.total_spent, 1_502_000.0);
    assert_eq!(bob.metrics.purchase_frequency, 3.0);
    assert_eq!(bob.metrics.segment, Segment::Vip);
    assert_eq!(bob.metrics.churn_risk, ChurnRisk::Low);
    assert_eq!(bob.history.favorite_categories, vec!["Food", "Drinks"]);
    assert_eq!(bob.history.preferred_payment_method, PaymentMethod::Card);
    assert_eq!(bob.history.loan_count, 1);
    assert_eq!(bob.email.as_deref(), Some("bob@example.com"));

    let alice = &values[1];
    assert_eq!(alice.metrics.total_spent, 2000.0);
    assert_eq!(alice.metrics.total_purchases, 1);
    // the cancelled sale still counts as the last purchase
    assert_eq!(
        alice.history.last_purchase,
        Utc.with_ymd_and_hms(2024, 3, 21, 12, 0, 0).unwrap()
    );
    assert_eq!(alice.metrics.customer_lifespan_days, 16);
    assert_eq!(alice.metrics.churn_risk, ChurnRisk::High);
    assert_eq!(alice.metrics.segment, Segment::AtRisk);
    assert_eq!(alice.history.preferred_payment_method, PaymentMethod::MobileMoney);
}

#[test]
fn test_customer_filters() {
    let dir = TempDir::new().unwrap();
    let facade = memory_facade(seeded_db(&dir));

    let vip = facade
        .customer_lifetime_values(None, SegmentFilter::Vip)
        .unwrap();
    assert_eq!(vip.len(), 1);
    assert!(vip.iter().all(|v| v.metrics.segment == Segment::Vip));

    let at_risk = facade
        .customer_lifetime_values(None, SegmentFilter::AtRisk)
        .unwrap();
    assert_eq!(at_risk.len(), 1);
    assert_eq!(at_risk[0].customer_id, "alice");

    let one = facade
        .customer_lifetime_values(Some("alice"), SegmentFilter::Vip)
        .unwrap();
    assert!(one.is_empty());

    assert!(facade
        .customer_lifetime_values(Some("carol"), SegmentFilter::All)
        .unwrap()
        .is_empty());
}

// ============================================
// Inventory aging
// ============================================

#[test]
fn test_inventory_aging() {
    let dir = TempDir::new().unwrap();
    let facade = memory_facade(seeded_db(&dir));

    let report = facade.inventory_aging().unwrap();

    // kettle has no stock
    assert_eq!(report.summary.total_products, 4);
    assert_eq!(report.summary.total_inventory_value, 5150.0);
    assert_eq!(report.summary.total_aged_items, 2);

    let counts: u64 = AgeBracket::ALL
        .iter()
        .map(|b| report.aging_brackets.get(*b).items)
        .sum();
    assert_eq!(counts, report.summary.total_products);
    let values: f64 = AgeBracket::ALL
        .iter()
        .map(|b| report.aging_brackets.get(*b).value)
        .sum();
    assert_eq!(values, report.summary.total_inventory_value);

    assert_eq!(report.aging_brackets.current.items, 2);
    assert_eq!(report.aging_brackets.over180_days.items, 2);
    assert_eq!(report.aging_brackets.over180_days.value, 1150.0);

    let dead: Vec<(&str, i64, RecommendedAction)> = report
        .dead_stock
        .iter()
        .map(|d| (d.product_id.as_str(), d.days_in_stock, d.recommended_action))
        .collect();
    assert_eq!(
        dead,
        vec![
            ("lamp", 400, RecommendedAction::Writeoff),
            ("soap", 200, RecommendedAction::Discount),
        ]
    );

    let slow: Vec<&str> = report
        .slow_moving
        .iter()
        .map(|s| s.product_id.as_str())
        .collect();
    assert_eq!(slow, vec!["rice"]);
    assert_eq!(report.slow_moving[0].sales_in_period, 4);
}

// ============================================
// Caching
// ============================================

#[test]
fn test_reports_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let cached = memory_facade(db.clone());
    let fresh = || memory_facade(db.clone());

    let first = serde_json::to_string(&cached.inventory_aging().unwrap()).unwrap();
    let hit = serde_json::to_string(&cached.inventory_aging().unwrap()).unwrap();
    let recomputed = serde_json::to_string(&fresh().inventory_aging().unwrap()).unwrap();
    assert_eq!(first, hit);
    assert_eq!(first, recomputed);

    let range = (day_start(2024, 3, 1), day_end(2024, 3, 31));
    let margins = || {
        let analysis = cached.profit_margins(range.0, range.1, GroupBy::Both).unwrap();
        serde_json::to_string(&analysis).unwrap()
    };
    let first = margins();
    let hit = margins();
    assert_eq!(first, hit);
}

#[test]
fn test_database_cache_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let facade = AnalyticsFacade::new(db.clone(), db.clone(), CacheConfig::default())
        .with_clock(as_of);
    assert_eq!(facade.inventory_aging().unwrap().summary.total_products, 4);

    // New stock arrives, but the cached report is still served
    let mut kettle = Product {
        id: "kettle".to_string(),
        name: "Kettle".to_string(),
        sku: "KETTLE".to_string(),
        cost_price: Some(10.0),
        stock_quantity: 5,
        category: None,
        supplier_id: None,
        created_at: Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap(),
    };
    db.upsert_product(&kettle).unwrap();
    drop(facade);
    drop(db);

    let reopened = Arc::new(Database::open(&dir.path().join("data.db")).unwrap());
    reopened.migrate().unwrap();
    let facade = AnalyticsFacade::new(reopened.clone(), reopened.clone(), CacheConfig::default())
        .with_clock(as_of);
    assert_eq!(facade.inventory_aging().unwrap().summary.total_products, 4);

    facade.invalidate_inventory().unwrap();
    assert_eq!(facade.inventory_aging().unwrap().summary.total_products, 5);

    kettle.stock_quantity = 0;
    reopened.upsert_product(&kettle).unwrap();
    facade.invalidate_inventory().unwrap();
    assert_eq!(facade.inventory_aging().unwrap().summary.total_products, 4);
}

#[test]
fn test_open_from_config() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested/store.db");
    let mut config = Config {
        database_path: Some(db_path.clone()),
        ..Default::default()
    };
    config.cache.backend = CacheBackend::Database;

    let facade = AnalyticsFacade::open(&config).unwrap();
    assert!(db_path.exists());

    let report = facade.inventory_aging().unwrap();
    assert_eq!(report.summary.total_products, 0);
    assert!(report.dead_stock.is_empty());

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.count_rows("report_cache").unwrap(), 1);
}
