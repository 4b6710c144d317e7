//! # pos-insights-core
//!
//! Core library for pos-insights - business analytics for a retail
//! point-of-sale back office.
//!
//! This library provides:
//! - Domain types for sales, products, customers and loans
//! - SQLite record store and persistent report cache
//! - Profit margin, customer lifetime value and inventory aging reports
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Records:** sales, products and customers behind a [`RecordSource`]
//! - **Analyzers:** pure computations over records fetched per call
//! - **Facade:** [`AnalyticsFacade`], which adds the [`ResultCache`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::{TimeZone, Utc};
//! use pos_insights_core::{AnalyticsFacade, Config, GroupBy};
//!
//! let config = Config::load().expect("failed to load config");
//! let facade = AnalyticsFacade::open(&config).expect("failed to open record store");
//!
//! let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
//! let margins = facade
//!     .profit_margins(start, end, GroupBy::Both)
//!     .expect("report failed");
//! println!("profit: {}", margins.overall.profit);
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{
    AnalyticsFacade, CustomerLifetimeValue, GroupBy, InventoryAgingReport, ProfitMarginAnalysis,
    SegmentFilter,
};
pub use cache::{MemoryCache, ResultCache};
pub use config::Config;
pub use db::{Database, ImportSummary};
pub use error::{Error, Result};
pub use source::RecordSource;
pub use types::*;

// Public modules
pub mod analytics;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod source;
pub mod types;
