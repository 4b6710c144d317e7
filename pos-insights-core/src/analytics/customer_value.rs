//! Customer lifetime value
//!
//! Scores every customer with purchase history: spend, frequency, a 24-month
//! LTV extrapolation, churn risk from purchase recency, and a retention
//! segment.

use super::{days_between, AnalyticsContext, OrderedTally};
use crate::error::{Error, Result};
use crate::types::{CustomerRecord, PaymentMethod, Sale};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Months of purchasing the LTV extrapolation assumes.
pub const LTV_HORIZON_MONTHS: f64 = 24.0;
/// Spend above which a frequent customer is VIP.
pub const VIP_MIN_SPENT: f64 = 1_000_000.0;
/// Purchases per month above which a big spender is VIP.
pub const VIP_MIN_FREQUENCY: f64 = 2.0;
/// Completed purchases above which a low-risk customer is loyal.
pub const LOYAL_MIN_PURCHASES: u64 = 10;
/// Customers with at most this many completed purchases are new.
pub const NEW_MAX_PURCHASES: u64 = 2;
const FAVORITE_CATEGORY_COUNT: usize = 3;

/// Likelihood that a customer has stopped buying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChurnRisk {
    Low,
    Medium,
    High,
}

impl ChurnRisk {
    /// More than 90 days idle is high, more than 45 medium.
    pub fn from_days_idle(days: i64) -> Self {
        if days > 90 {
            ChurnRisk::High
        } else if days > 45 {
            ChurnRisk::Medium
        } else {
            ChurnRisk::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChurnRisk::Low => "low",
            ChurnRisk::Medium => "medium",
            ChurnRisk::High => "high",
        }
    }
}

impl std::fmt::Display for ChurnRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Retention segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    Vip,
    Loyal,
    Regular,
    AtRisk,
    New,
}

impl Segment {
    /// Assign a segment. Rules are checked in order and the first match wins.
    pub fn classify(
        total_spent: f64,
        purchase_frequency: f64,
        total_purchases: u64,
        churn_risk: ChurnRisk,
    ) -> Self {
        if total_spent > VIP_MIN_SPENT && purchase_frequency > VIP_MIN_FREQUENCY {
            Segment::Vip
        } else if total_purchases > LOYAL_MIN_PURCHASES && churn_risk == ChurnRisk::Low {
            Segment::Loyal
        } else if churn_risk == ChurnRisk::High {
            Segment::AtRisk
        } else if total_purchases <= NEW_MAX_PURCHASES {
            Segment::New
        } else {
            Segment::Regular
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Vip => "vip",
            Segment::Loyal => "loyal",
            Segment::Regular => "regular",
            Segment::AtRisk => "at-risk",
            Segment::New => "new",
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which segments a CLV query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SegmentFilter {
    #[default]
    All,
    Vip,
    AtRisk,
}

impl SegmentFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentFilter::All => "all",
            SegmentFilter::Vip => "vip",
            SegmentFilter::AtRisk => "at-risk",
        }
    }

    pub fn matches(&self, segment: Segment) -> bool {
        match self {
            SegmentFilter::All => true,
            SegmentFilter::Vip => segment == Segment::Vip,
            SegmentFilter::AtRisk => segment == Segment::AtRisk,
        }
    }
}

impl std::fmt::Display for SegmentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SegmentFilter {
    type Err = Error;

    /// Only `all`, `vip` and `at-risk` are accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SegmentFilter::All),
            "vip" => Ok(SegmentFilter::Vip),
            "at-risk" => Ok(SegmentFilter::AtRisk),
            other => Err(Error::InvalidArgument(format!(
                "unknown segment filter {:?} (expected all, vip or at-risk)",
                other
            ))),
        }
    }
}

// ============================================
// Report types
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMetrics {
    /// Sum of completed sale totals
    pub total_spent: f64,
    /// Number of completed sales
    pub total_purchases: u64,
    pub average_order_value: f64,
    /// Completed purchases per active month
    pub purchase_frequency: f64,
    /// Days between first and last purchase, at least 1
    pub customer_lifespan_days: i64,
    pub days_since_last_purchase: i64,
    pub predicted_ltv: f64,
    pub churn_risk: ChurnRisk,
    pub segment: Segment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseHistory {
    /// Earliest sale of any status
    pub first_purchase: DateTime<Utc>,
    /// Latest sale of any status
    pub last_purchase: DateTime<Utc>,
    pub favorite_categories: Vec<String>,
    pub preferred_payment_method: PaymentMethod,
    pub loan_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLifetimeValue {
    pub customer_id: String,
    pub customer_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub metrics: CustomerMetrics,
    pub history: PurchaseHistory,
}

// ============================================
// Analyzer
// ============================================

/// Computes [`CustomerLifetimeValue`] scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerValueAnalyzer;

impl CustomerValueAnalyzer {
    /// Score customers, optionally one by id, sorted by predicted LTV
    /// descending. Customers without any sale are skipped.
    pub fn analyze(
        &self,
        ctx: &AnalyticsContext<'_>,
        customer_id: Option<&str>,
        filter: SegmentFilter,
    ) -> Result<Vec<CustomerLifetimeValue>> {
        let records = ctx.source.customers(customer_id)?;
        tracing::debug!(customers = records.len(), %filter, "Analyzing customer value");

        let mut scored: Vec<CustomerLifetimeValue> = records
            .iter()
            .filter_map(|record| score(record, ctx.as_of))
            .filter(|clv| filter.matches(clv.metrics.segment))
            .collect();

        scored.sort_by(|a, b| b.metrics.predicted_ltv.total_cmp(&a.metrics.predicted_ltv));
        Ok(scored)
    }
}

/// Score one customer, or `None` when they have no sales at all.
pub fn score(record: &CustomerRecord, as_of: DateTime<Utc>) -> Option<CustomerLifetimeValue> {
    let first_purchase = record.sales.iter().map(|s| s.created_at).min()?;
    let last_purchase = record.sales.iter().map(|s| s.created_at).max()?;

    let completed: Vec<&Sale> = record.sales.iter().filter(|s| s.is_completed()).collect();
    let total_spent: f64 = completed.iter().map(|s| s.total_amount).sum();
    let total_purchases = completed.len() as u64;
    let average_order_value = if total_purchases == 0 {
        0.0
    } else {
        total_spent / total_purchases as f64
    };

    let customer_lifespan_days = days_between(first_purchase, last_purchase).max(1);
    let active_months = (customer_lifespan_days as f64 / 30.0).max(1.0);
    let purchase_frequency = total_purchases as f64 / active_months;
    let predicted_ltv = average_order_value * purchase_frequency * LTV_HORIZON_MONTHS;

    let days_since_last_purchase = days_between(last_purchase, as_of);
    let churn_risk = ChurnRisk::from_days_idle(days_since_last_purchase);
    let segment = Segment::classify(total_spent, purchase_frequency, total_purchases, churn_risk);

    Some(CustomerLifetimeValue {
        customer_id: record.customer.id.clone(),
        customer_name: record.customer.name.clone(),
        email: record.customer.email.clone(),
        phone: record.customer.phone.clone(),
        metrics: CustomerMetrics {
            total_spent,
            total_purchases,
            average_order_value,
            purchase_frequency,
            customer_lifespan_days,
            days_since_last_purchase,
            predicted_ltv,
            churn_risk,
            segment,
        },
        history: PurchaseHistory {
            first_purchase,
            last_purchase,
            favorite_categories: favorite_categories(&completed),
            preferred_payment_method: preferred_payment_method(&completed),
            loan_count: record.loans.len(),
        },
    })
}

/// Top category names by item count; uncategorized items are not counted.
fn favorite_categories(completed: &[&Sale]) -> Vec<String> {
    let mut tally = OrderedTally::default();
    for item in completed.iter().flat_map(|s| &s.items) {
        if let Some(category) = &item.product.category {
            tally.add(&category.name);
        }
    }
    tally
        .ranked()
        .into_iter()
        .take(FAVORITE_CATEGORY_COUNT)
        .map(|(name, _)| name)
        .collect()
}

fn preferred_payment_method(completed: &[&Sale]) -> PaymentMethod {
    let mut tally = OrderedTally::default();
    for sale in completed {
        tally.add(sale.payment_method.as_str());
    }
    tally
        .ranked()
        .first()
        .and_then(|(method, _)| method.parse().ok())
        .unwrap_or_default()
}
