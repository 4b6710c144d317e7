//! Profit margin analysis
//!
//! Aggregates completed sales into revenue, cost and profit, broken down by
//! product, category, day and month, and compares the period with the one
//! immediately before it.

use super::{percentage, AnalyticsContext, UNCATEGORIZED_ID, UNCATEGORIZED_NAME};
use crate::error::Result;
use crate::types::{Sale, SaleItem, SaleStatus};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which breakdowns a margin report includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Product,
    Category,
    #[default]
    Both,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Product => "product",
            GroupBy::Category => "category",
            GroupBy::Both => "both",
        }
    }

    fn includes_products(self) -> bool {
        self != GroupBy::Category
    }

    fn includes_categories(self) -> bool {
        self != GroupBy::Product
    }
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "product" => Ok(GroupBy::Product),
            "category" => Ok(GroupBy::Category),
            "both" => Ok(GroupBy::Both),
            _ => Err(format!("unknown group-by: {}", s)),
        }
    }
}

// ============================================
// Accumulators
// ============================================

/// Running revenue and cost.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarginAccumulator {
    pub revenue: f64,
    pub cost: f64,
}

impl MarginAccumulator {
    pub fn add(&mut self, revenue: f64, cost: f64) {
        self.revenue += revenue;
        self.cost += cost;
    }

    pub fn add_item(&mut self, item: &SaleItem) {
        self.add(item.revenue(), item.cost());
    }

    pub fn profit(&self) -> f64 {
        self.revenue - self.cost
    }

    /// Margin as a percentage of revenue; 0 when there is no revenue.
    pub fn margin_percentage(&self) -> f64 {
        percentage(self.profit(), self.revenue)
    }

    pub fn totals(&self) -> MarginTotals {
        MarginTotals {
            revenue: self.revenue,
            cost: self.cost,
            profit: self.profit(),
            margin_percentage: self.margin_percentage(),
        }
    }
}

/// Per-product bucket.
#[derive(Debug, Clone)]
pub struct ProductAggregate {
    pub product_id: String,
    pub product_name: String,
    pub sku: String,
    pub margin: MarginAccumulator,
    pub units_sold: u64,
}

/// Per-category bucket.
#[derive(Debug, Clone)]
pub struct CategoryAggregate {
    pub category_id: String,
    pub category_name: String,
    pub margin: MarginAccumulator,
}

/// Buckets keyed by id, iterated in first-seen order.
#[derive(Debug)]
struct Buckets<T> {
    index: HashMap<String, usize>,
    entries: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> Buckets<T> {
    fn entry(&mut self, id: &str, create: impl FnOnce() -> T) -> &mut T {
        let idx = match self.index.get(id) {
            Some(&idx) => idx,
            None => {
                self.entries.push(create());
                self.index.insert(id.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx]
    }

    fn into_entries(self) -> Vec<T> {
        self.entries
    }
}

// ============================================
// Report types
// ============================================

/// Revenue, cost, profit and margin for some slice of sales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginTotals {
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMargin {
    pub product_id: String,
    pub product_name: String,
    pub sku: String,
    pub units_sold: u64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMargin {
    pub category_id: String,
    pub category_name: String,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_percentage: f64,
}

/// Totals for one day (`yyyy-MM-dd`) or month (`yyyy-MM`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMargin {
    pub period: String,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeBreakdown {
    /// Ascending by date
    pub daily: Vec<PeriodMargin>,
    /// Ascending by month
    pub monthly: Vec<PeriodMargin>,
}

/// Period-over-period comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginTrend {
    pub is_improving: bool,
    pub change_percentage: f64,
    /// Current profit extrapolated one period by `change_percentage`
    pub forecast: f64,
}

impl MarginTrend {
    /// Compare current profit with the previous period's figure.
    ///
    /// The change is 0 when the previous figure is not positive.
    pub fn compare(current_profit: f64, previous_profit: f64) -> Self {
        let change_percentage = if previous_profit <= 0.0 {
            0.0
        } else {
            (current_profit - previous_profit) / previous_profit * 100.0
        };
        Self {
            is_improving: change_percentage > 0.0,
            change_percentage,
            forecast: current_profit * (1.0 + change_percentage / 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitMarginAnalysis {
    pub overall: MarginTotals,
    /// Descending by profit; empty when grouped by category only
    pub by_product: Vec<ProductMargin>,
    /// Descending by profit; empty when grouped by product only
    pub by_category: Vec<CategoryMargin>,
    pub by_time_range: TimeRangeBreakdown,
    pub trends: MarginTrend,
}

// ============================================
// Analyzer
// ============================================

/// Computes [`ProfitMarginAnalysis`] reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfitMarginAnalyzer;

impl ProfitMarginAnalyzer {
    /// Analyze completed sales with `created_at` in `[start, end]`.
    ///
    /// Expects `start <= end`; the range is not validated here.
    pub fn analyze(
        &self,
        ctx: &AnalyticsContext<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<ProfitMarginAnalysis> {
        let sales = ctx
            .source
            .sales_between(start, end, SaleStatus::Completed)?;
        tracing::debug!(sales = sales.len(), %group_by, "Analyzing profit margins");

        let mut analysis = aggregate(&sales, group_by);

        let (previous_start, previous_end) = previous_window(start, end);
        let previous_sales =
            ctx.source
                .sales_between(previous_start, previous_end, SaleStatus::Completed)?;
        // Only revenue is summed for the previous period.
        let previous_profit: f64 = previous_sales
            .iter()
            .flat_map(|sale| &sale.items)
            .map(SaleItem::revenue)
            .sum();

        analysis.trends = MarginTrend::compare(analysis.overall.profit, previous_profit);
        Ok(analysis)
    }
}

/// The equal-length window immediately before `[start, end]`.
///
/// Its length is the number of calendar days the range touches, at least
/// one, so the shifted end always falls before `start`.
pub fn previous_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let days = ((end.date_naive() - start.date_naive()).num_days() + 1).max(1);
    let shift = Duration::days(days);
    (
        start
            .checked_sub_signed(shift)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        end.checked_sub_signed(shift)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

/// Build every breakdown for `sales`; trends are left at their defaults.
fn aggregate(sales: &[Sale], group_by: GroupBy) -> ProfitMarginAnalysis {
    let mut products: Buckets<ProductAggregate> = Buckets::default();
    let mut categories: Buckets<CategoryAggregate> = Buckets::default();
    let mut daily: BTreeMap<NaiveDate, MarginAccumulator> = BTreeMap::new();

    for sale in sales.iter().filter(|s| s.is_completed()) {
        let day = daily.entry(sale.created_at.date_naive()).or_default();

        for item in &sale.items {
            day.add_item(item);

            let product = &item.product;
            let bucket = products.entry(&product.id, || ProductAggregate {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                margin: MarginAccumulator::default(),
                units_sold: 0,
            });
            bucket.margin.add_item(item);
            bucket.units_sold += u64::from(item.quantity);

            let (category_id, category_name) = match &product.category {
                Some(category) => (category.id.as_str(), category.name.as_str()),
                None => (UNCATEGORIZED_ID, UNCATEGORIZED_NAME),
            };
            categories
                .entry(category_id, || CategoryAggregate {
                    category_id: category_id.to_string(),
                    category_name: category_name.to_string(),
                    margin: MarginAccumulator::default(),
                })
                .margin
                .add_item(item);
        }
    }

    let by_product = if group_by.includes_products() {
        let mut rows = products.into_entries();
        rows.sort_by(|a, b| b.margin.profit().total_cmp(&a.margin.profit()));
        rows.into_iter()
            .map(|p| ProductMargin {
                product_id: p.product_id,
                product_name: p.product_name,
                sku: p.sku,
                units_sold: p.units_sold,
                revenue: p.margin.revenue,
                cost: p.margin.cost,
                profit: p.margin.profit(),
                margin_percentage: p.margin.margin_percentage(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let by_category = if group_by.includes_categories() {
        let mut rows = categories.into_entries();
        rows.sort_by(|a, b| b.margin.profit().total_cmp(&a.margin.profit()));
        rows.into_iter()
            .map(|c| CategoryMargin {
                category_id: c.category_id,
                category_name: c.category_name,
                revenue: c.margin.revenue,
                cost: c.margin.cost,
                profit: c.margin.profit(),
                margin_percentage: c.margin.margin_percentage(),
            })
            .collect()
    } else {
        Vec::new()
    };

    // Folded from the daily buckets so overall equals the sum of daily rows.
    let mut overall = MarginAccumulator::default();
    for margin in daily.values() {
        overall.add(margin.revenue, margin.cost);
    }

    ProfitMarginAnalysis {
        overall: overall.totals(),
        by_product,
        by_category,
        by_time_range: time_breakdown(&daily),
        trends: MarginTrend::default(),
    }
}

/// Daily rows plus their monthly rollup. Monthly margins are recomputed
/// from the summed revenue and cost.
fn time_breakdown(daily: &BTreeMap<NaiveDate, MarginAccumulator>) -> TimeRangeBreakdown {
    let mut monthly: BTreeMap<String, MarginAccumulator> = BTreeMap::new();
    for (date, margin) in daily {
        monthly
            .entry(date.format("%Y-%m").to_string())
            .or_default()
            .add(margin.revenue, margin.cost);
    }

    let row = |period: String, margin: &MarginAccumulator| PeriodMargin {
        period,
        revenue: margin.revenue,
        cost: margin.cost,
        profit: margin.profit(),
        margin_percentage: margin.margin_percentage(),
    };

    TimeRangeBreakdown {
        daily: daily
            .iter()
            .map(|(date, margin)| row(date.format("%Y-%m-%d").to_string(), margin))
            .collect(),
        monthly: monthly
            .into_iter()
            .map(|(month, margin)| row(month, &margin))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::RecordSource;
    use crate::types::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn product(id: &str, cost: Option<f64>, category: Option<&str>) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            sku: id.to_uppercase(),
            cost_price: cost,
            stock_quantity: 10,
            category: category.map(|c| Category {
                id: c.to_string(),
                name: c.to_uppercase(),
            }),
            supplier_id: None,
            created_at: ts(2023, 1, 1),
        }
    }

    fn sale(id: &str, at: DateTime<Utc>, lines: &[(&Product, u32, f64)]) -> Sale {
        let items: Vec<SaleItem> = lines
            .iter()
            .enumerate()
            .map(|(i, (p, quantity, unit_price))| SaleItem {
                id: format!("{}-{}", id, i),
                product: (*p).clone(),
                quantity: *quantity,
                unit_price: *unit_price,
            })
            .collect();
        Sale {
            id: id.to_string(),
            customer_id: None,
            status: SaleStatus::Completed,
            created_at: at,
            total_amount: items.iter().map(SaleItem::revenue).sum(),
            items,
            payment_method: PaymentMethod::Cash,
        }
    }

    /// Record source over a fixed list of sales.
    struct FixedSales(Vec<Sale>);

    impl RecordSource for FixedSales {
        fn sales_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            status: SaleStatus,
        ) -> Result<Vec<Sale>> {
            Ok(self
                .0
                .iter()
                .filter(|s| s.status == status && s.created_at >= start && s.created_at <= end)
                .cloned()
                .collect())
        }

        fn products_in_stock(&self, _: DateTime<Utc>) -> Result<Vec<StockedProduct>> {
            Ok(Vec::new())
        }

        fn customers(&self, _: Option<&str>) -> Result<Vec<CustomerRecord>> {
            Ok(Vec::new())
        }
    }

    struct Unreachable;

    impl RecordSource for Unreachable {
        fn sales_between(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
            _: SaleStatus,
        ) -> Result<Vec<Sale>> {
            Err(Error::Source("connection refused".to_string()))
        }

        fn products_in_stock(&self, _: DateTime<Utc>) -> Result<Vec<StockedProduct>> {
            Err(Error::Source("connection refused".to_string()))
        }

        fn customers(&self, _: Option<&str>) -> Result<Vec<CustomerRecord>> {
            Err(Error::Source("connection refused".to_string()))
        }
    }

    fn run(
        source: &dyn RecordSource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> ProfitMarginAnalysis {
        let ctx = AnalyticsContext::new(source, end);
        ProfitMarginAnalyzer.analyze(&ctx, start, end, group_by).unwrap()
    }

    #[test]
    fn test_two_completed_sales_totals() {
        let a = product("a", Some(500.0), Some("food"));
        let b = product("b", Some(1000.0), Some("drinks"));
        let source = FixedSales(vec![
            sale("s1", ts(2024, 3, 1), &[(&a, 2, 1000.0)]),
            sale("s2", ts(2024, 3, 2), &[(&b, 3, 2000.0)]),
        ]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        assert_eq!(analysis.overall.revenue, 8000.0);
        assert_eq!(analysis.overall.cost, 4000.0);
        assert_eq!(analysis.overall.profit, 4000.0);
        assert_eq!(analysis.overall.margin_percentage, 50.0);

        assert_eq!(analysis.by_product[0].product_id, "b");
        assert_eq!(analysis.by_product[0].units_sold, 3);
        assert_eq!(analysis.by_category[0].category_id, "drinks");
    }

    #[test]
    fn test_non_completed_sales_are_ignored() {
        let a = product("a", Some(5.0), None);
        let mut refunded = sale("s2", ts(2024, 3, 2), &[(&a, 100, 10.0)]);
        refunded.status = SaleStatus::Refunded;
        let source = FixedSales(vec![sale("s1", ts(2024, 3, 1), &[(&a, 1, 10.0)]), refunded]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        assert_eq!(analysis.overall.revenue, 10.0);
    }

    #[test]
    fn test_missing_cost_and_category_fall_back() {
        let a = product("a", None, None);
        let source = FixedSales(vec![sale("s1", ts(2024, 3, 1), &[(&a, 2, 50.0)])]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        assert_eq!(analysis.overall.cost, 0.0);
        assert_eq!(analysis.overall.margin_percentage, 100.0);
        assert_eq!(analysis.by_category.len(), 1);
        assert_eq!(analysis.by_category[0].category_id, UNCATEGORIZED_ID);
        assert_eq!(analysis.by_category[0].category_name, UNCATEGORIZED_NAME);
    }

    #[test]
    fn test_empty_period_is_well_formed() {
        let source = FixedSales(Vec::new());
        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        assert_eq!(analysis.overall, MarginTotals::default());
        assert!(analysis.by_product.is_empty());
        assert!(analysis.by_time_range.daily.is_empty());
        assert_eq!(analysis.trends, MarginTrend::default());
    }

    #[test]
    fn test_zero_revenue_has_zero_margin() {
        let a = product("a", Some(10.0), None);
        let source = FixedSales(vec![sale("s1", ts(2024, 3, 1), &[(&a, 1, 0.0)])]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        assert_eq!(analysis.overall.profit, -10.0);
        assert_eq!(analysis.overall.margin_percentage, 0.0);
        assert_eq!(analysis.by_product[0].margin_percentage, 0.0);
    }

    #[test]
    fn test_group_by_empties_other_breakdown() {
        let a = product("a", Some(1.0), Some("food"));
        let source = FixedSales(vec![sale("s1", ts(2024, 3, 1), &[(&a, 1, 2.0)])]);

        let by_category = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Category);
        assert!(by_category.by_product.is_empty());
        assert_eq!(by_category.by_category.len(), 1);

        let by_product = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Product);
        assert!(by_product.by_category.is_empty());
        assert_eq!(by_product.by_product.len(), 1);
    }

    #[test]
    fn test_equal_profit_keeps_first_seen_order() {
        let a = product("a", Some(1.0), Some("x"));
        let b = product("b", Some(1.0), Some("y"));
        let c = product("c", Some(1.0), Some("z"));
        let source = FixedSales(vec![sale(
            "s1",
            ts(2024, 3, 1),
            &[(&b, 1, 2.0), (&c, 1, 5.0), (&a, 1, 2.0)],
        )]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        let ids: Vec<&str> = analysis
            .by_product
            .iter()
            .map(|p| p.product_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        let categories: Vec<&str> = analysis
            .by_category
            .iter()
            .map(|c| c.category_id.as_str())
            .collect();
        assert_eq!(categories, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_daily_and_monthly_rollup() {
        let a = product("a", Some(30.0), None);
        let source = FixedSales(vec![
            sale("s1", ts(2024, 1, 31), &[(&a, 1, 100.0)]),
            sale("s2", ts(2024, 1, 31), &[(&a, 1, 100.0)]),
            sale("s3", ts(2024, 2, 1), &[(&a, 2, 50.0)]),
            sale("s4", ts(2024, 1, 5), &[(&a, 1, 40.0)]),
        ]);

        let analysis = run(&source, ts(2024, 1, 1), ts(2024, 2, 28), GroupBy::Both);
        let daily = &analysis.by_time_range.daily;
        let periods: Vec<&str> = daily.iter().map(|d| d.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-01-05", "2024-01-31", "2024-02-01"]);
        assert_eq!(daily[1].revenue, 200.0);

        let monthly = &analysis.by_time_range.monthly;
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].period, "2024-01");
        assert_eq!(monthly[0].revenue, 240.0);
        assert_eq!(monthly[0].cost, 90.0);
        assert_eq!(monthly[0].margin_percentage, 62.5);
        assert_eq!(monthly[1].period, "2024-02");

        let daily_revenue: f64 = daily.iter().map(|d| d.revenue).sum();
        assert_eq!(daily_revenue, analysis.overall.revenue);
    }

    #[test]
    fn test_trend_uses_previous_revenue() {
        let a = product("a", Some(50.0), None);
        let source = FixedSales(vec![
            // previous window: revenue 100 counts as previous "profit"
            sale("old", ts(2024, 2, 25), &[(&a, 1, 100.0)]),
            // current window: revenue 300, cost 150, profit 150
            sale("new", ts(2024, 3, 5), &[(&a, 3, 100.0)]),
        ]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 11), GroupBy::Both);
        assert_eq!(analysis.trends.change_percentage, 50.0);
        assert!(analysis.trends.is_improving);
        assert_eq!(analysis.trends.forecast, 225.0);
    }

    #[test]
    fn test_no_previous_sales_means_no_change() {
        let a = product("a", Some(50.0), None);
        let source = FixedSales(vec![sale("new", ts(2024, 3, 5), &[(&a, 3, 100.0)])]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 11), GroupBy::Both);
        assert_eq!(analysis.trends.change_percentage, 0.0);
        assert!(!analysis.trends.is_improving);
        assert_eq!(analysis.trends.forecast, analysis.overall.profit);
    }

    #[test]
    fn test_trend_compare() {
        let down = MarginTrend::compare(50.0, 100.0);
        assert_eq!(down.change_percentage, -50.0);
        assert!(!down.is_improving);
        assert_eq!(down.forecast, 25.0);

        assert_eq!(MarginTrend::compare(80.0, -5.0).change_percentage, 0.0);
    }

    #[test]
    fn test_previous_window_has_at_least_one_day() {
        let start = ts(2024, 3, 10);
        let (prev_start, prev_end) = previous_window(start, start);
        assert_eq!(prev_start, ts(2024, 3, 9));
        assert_eq!(prev_end, ts(2024, 3, 9));

        let (prev_start, prev_end) = previous_window(ts(2024, 3, 1), ts(2024, 3, 11));
        assert_eq!(prev_start, ts(2024, 2, 19));
        assert_eq!(prev_end, ts(2024, 2, 29));
    }

    #[test]
    fn test_previous_window_ends_before_start() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 2, 23, 59, 59).unwrap();
        let (prev_start, prev_end) = previous_window(start, end);
        assert_eq!(prev_start, Utc.with_ymd_and_hms(2024, 5, 30, 0, 0, 0).unwrap());
        assert_eq!(prev_end, Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap());

        let late = Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap();
        let next_morning = Utc.with_ymd_and_hms(2024, 6, 2, 1, 0, 0).unwrap();
        let (_, prev_end) = previous_window(late, next_morning);
        assert!(prev_end < late);
    }

    #[test]
    fn test_start_day_sale_is_not_counted_as_previous() {
        let a = product("a", Some(50.0), None);
        let source = FixedSales(vec![sale("s1", ts(2024, 6, 1), &[(&a, 1, 100.0)])]);
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 2, 23, 59, 59).unwrap();

        let analysis = run(&source, start, end, GroupBy::Both);
        assert_eq!(analysis.overall.profit, 50.0);
        assert_eq!(analysis.trends.change_percentage, 0.0);
        assert!(!analysis.trends.is_improving);
        assert_eq!(analysis.trends.forecast, 50.0);
    }

    #[test]
    fn test_overall_equals_sum_of_daily_rows_for_fractional_prices() {
        let a = product("a", Some(0.05), None);
        let source = FixedSales(vec![
            sale("s1", ts(2024, 3, 1), &[(&a, 1, 0.1)]),
            sale("s2", ts(2024, 3, 2), &[(&a, 1, 0.2)]),
            sale("s3", ts(2024, 3, 2), &[(&a, 1, 0.3)]),
        ]);

        let analysis = run(&source, ts(2024, 3, 1), ts(2024, 3, 31), GroupBy::Both);
        let daily = &analysis.by_time_range.daily;
        let daily_revenue: f64 = daily.iter().map(|d| d.revenue).sum();
        let daily_cost: f64 = daily.iter().map(|d| d.cost).sum();
        assert_eq!(analysis.overall.revenue, daily_revenue);
        assert_eq!(analysis.overall.cost, daily_cost);
    }

    #[test]
    fn test_source_failure_propagates() {
        let ctx = AnalyticsContext::new(&Unreachable, ts(2024, 3, 1));
        let result =
            ProfitMarginAnalyzer.analyze(&ctx, ts(2024, 3, 1), ts(2024, 3, 2), GroupBy::Both);
        assert!(matches!(result, Err(Error::Source(_))));
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!("category".parse::<GroupBy>().unwrap(), GroupBy::Category);
        assert_eq!(GroupBy::default().to_string(), "both");
        assert!("brand".parse::<GroupBy>().is_err());
    }
}
