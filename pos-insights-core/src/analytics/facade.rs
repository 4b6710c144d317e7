//! Analytics facade
//!
//! The single entry point for reports. Owns the record source, the result
//! cache and the cache TTLs, and is the only component that knows about
//! caching. Analyzers stay pure.
//!
//! ## Caching
//!
//! | Report | Key | TTL |
//! |--------|-----|-----|
//! | Profit margins | `profit-margin:{start}:{end}:{group_by}` | `cache.profit_margin_ttl_secs` |
//! | Inventory aging | `inventory-aging` | `cache.inventory_ttl_secs` |
//! | Customer value | not cached | |
//!
//! Cache failures are logged and otherwise ignored. Record source failures
//! are logged and returned unchanged.

use super::customer_value::{CustomerLifetimeValue, CustomerValueAnalyzer, SegmentFilter};
use super::inventory_aging::{InventoryAgingAnalyzer, InventoryAgingReport};
use super::profit_margin::{GroupBy, ProfitMarginAnalysis, ProfitMarginAnalyzer};
use super::AnalyticsContext;
use crate::cache::{MemoryCache, ResultCache};
use crate::config::{CacheBackend, CacheConfig, Config};
use crate::db::Database;
use crate::error::Result;
use crate::source::RecordSource;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cache key of the inventory aging report.
pub const INVENTORY_AGING_KEY: &str = "inventory-aging";

/// Cache key of a profit margin report.
pub fn profit_margin_key(start: DateTime<Utc>, end: DateTime<Utc>, group_by: GroupBy) -> String {
    format!(
        "profit-margin:{}:{}:{}",
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true),
        group_by
    )
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Entry point for all reports.
pub struct AnalyticsFacade {
    source: Arc<dyn RecordSource>,
    cache: Arc<dyn ResultCache>,
    ttls: CacheConfig,
    clock: Clock,
}

impl AnalyticsFacade {
    pub fn new(
        source: Arc<dyn RecordSource>,
        cache: Arc<dyn ResultCache>,
        ttls: CacheConfig,
    ) -> Self {
        Self {
            source,
            cache,
            ttls,
            clock: Arc::new(Utc::now),
        }
    }

    /// Open the configured database and cache backend.
    pub fn open(config: &Config) -> Result<Self> {
        let path = config.database_path();
        let db = Arc::new(Database::open(&path)?);
        db.migrate()?;
        tracing::info!(
            path = %path.display(),
            backend = ?config.cache.backend,
            "Opened record store"
        );

        let cache: Arc<dyn ResultCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::Database => db.clone(),
        };
        Ok(Self::new(db, cache, config.cache.clone()))
    }

    /// Replace the clock used for "now" (tests, reproducible reports).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn context(&self) -> AnalyticsContext<'_> {
        AnalyticsContext::new(self.source.as_ref(), (self.clock)())
    }

    // ============================================
    // Reports
    // ============================================

    /// Profit margins for completed sales in `[start, end]`.
    pub fn profit_margins(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<ProfitMarginAnalysis> {
        let key = profit_margin_key(start, end, group_by);
        self.cached(&key, self.ttls.profit_margin_ttl(), || {
            ProfitMarginAnalyzer.analyze(&self.context(), start, end, group_by)
        })
    }

    /// Customer lifetime values, highest predicted LTV first. Never cached.
    pub fn customer_lifetime_values(
        &self,
        customer_id: Option<&str>,
        filter: SegmentFilter,
    ) -> Result<Vec<CustomerLifetimeValue>> {
        CustomerValueAnalyzer
            .analyze(&self.context(), customer_id, filter)
            .map_err(|e| {
                tracing::error!(error = %e, "Customer value analysis failed");
                e
            })
    }

    /// Current inventory aging.
    pub fn inventory_aging(&self) -> Result<InventoryAgingReport> {
        self.cached(INVENTORY_AGING_KEY, self.ttls.inventory_ttl(), || {
            InventoryAgingAnalyzer.analyze(&self.context())
        })
    }

    // ============================================
    // Invalidation
    // ============================================

    /// Drop the cached inventory report (call after stock changes).
    pub fn invalidate_inventory(&self) -> Result<()> {
        self.cache.invalidate(INVENTORY_AGING_KEY)
    }

    /// Drop one cached margin report.
    pub fn invalidate_profit_margins(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<()> {
        self.cache
            .invalidate(&profit_margin_key(start, end, group_by))
    }

    /// Serve `key` from the cache, or compute, store and return it.
    fn cached<T, F>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        match self.cache.get(key) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(report) => {
                    tracing::debug!(key, "Report cache hit");
                    return Ok(report);
                }
                Err(e) => tracing::warn!(key, error = %e, "Discarding unreadable cached report"),
            },
            Ok(None) => tracing::debug!(key, "Report cache miss"),
            Err(e) => tracing::warn!(key, error = %e, "Report cache read failed"),
        }

        let report = compute().map_err(|e| {
            tracing::error!(key, error = %e, "Report computation failed");
            e
        })?;

        match serde_json::to_string(&report) {
            Ok(json) => {
                if let Err(e) = self.cache.set(key, &json, ttl) {
                    tracing::warn!(key, error = %e, "Report cache write failed");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "Report serialization failed"),
        }

        Ok(report)
    }
}
