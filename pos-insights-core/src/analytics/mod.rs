//! Analytics module for pos-insights
//!
//! Turns raw POS records into decision-support reports:
//! - Profit margins by product, category and day/month, with trend
//! - Customer lifetime value, churn risk and segmentation
//! - Inventory aging, dead stock and slow movers
//!
//! Analyzers are stateless values. Each call receives an
//! [`AnalyticsContext`] carrying the record source and the instant the
//! report is computed for, so results depend only on their inputs.
//! [`AnalyticsFacade`] is the entry point that adds caching on top.

pub mod customer_value;
pub mod facade;
pub mod inventory_aging;
pub mod profit_margin;

use crate::source::RecordSource;
use chrono::{DateTime, Utc};

pub use customer_value::{
    ChurnRisk, CustomerLifetimeValue, CustomerMetrics, CustomerValueAnalyzer, PurchaseHistory,
    Segment, SegmentFilter,
};
pub use facade::AnalyticsFacade;
pub use inventory_aging::{
    AgeBracket, AgingBrackets, BracketSummary, DeadStockItem, InventoryAgingAnalyzer,
    InventoryAgingReport, InventorySummary, RecommendedAction, SlowMovingItem,
};
pub use profit_margin::{
    CategoryMargin, GroupBy, MarginTotals, MarginTrend, PeriodMargin, ProductMargin,
    ProfitMarginAnalysis, ProfitMarginAnalyzer, TimeRangeBreakdown,
};

/// Category id used for products without a category.
pub const UNCATEGORIZED_ID: &str = "uncategorized";
/// Display name of the [`UNCATEGORIZED_ID`] bucket.
pub const UNCATEGORIZED_NAME: &str = "Uncategorized";

/// Context provided to analyzers.
pub struct AnalyticsContext<'a> {
    /// Read-only access to POS records
    pub source: &'a dyn RecordSource,
    /// Instant the report is computed for ("today")
    pub as_of: DateTime<Utc>,
}

impl<'a> AnalyticsContext<'a> {
    pub fn new(source: &'a dyn RecordSource, as_of: DateTime<Utc>) -> Self {
        Self { source, as_of }
    }
}

/// `part / whole × 100`, or 0 when `whole` is 0.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Whole days from `earlier` to `later` (negative if reversed).
pub(crate) fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    later.signed_duration_since(earlier).num_days()
}

/// Tally of string keys that remembers first-seen order.
///
/// [`OrderedTally::ranked`] sorts by count descending with a stable sort, so
/// equal counts keep the order in which keys first appeared.
#[derive(Debug, Default)]
pub(crate) struct OrderedTally {
    counts: Vec<(String, usize)>,
}

impl OrderedTally {
    pub(crate) fn add(&mut self, key: &str) {
        match self.counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((key.to_string(), 1)),
        }
    }

    pub(crate) fn ranked(mut self) -> Vec<(String, usize)> {
        self.counts.sort_by(|a, b| b.1.cmp(&a.1));
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_percentage_zero_whole() {
        assert_eq!(percentage(10.0, 0.0), 0.0);
        assert_eq!(percentage(0.0, 0.0), 0.0);
        assert_eq!(percentage(25.0, 200.0), 12.5);
    }

    #[test]
    fn test_days_between_truncates() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 3, 23, 0, 0).unwrap();
        assert_eq!(days_between(a, b), 2);
        assert_eq!(days_between(b, a), -2);
    }

    #[test]
    fn test_tally_ties_keep_first_seen_order() {
        let mut tally = OrderedTally::default();
        for key in ["b", "a", "c", "a", "b", "c", "d"] {
            tally.add(key);
        }
        let ranked: Vec<String> = tally.ranked().into_iter().map(|(k, _)| k).collect();
        assert_eq!(ranked, vec!["b", "a", "c", "d"]);
    }
}
