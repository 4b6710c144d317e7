//! Inventory aging
//!
//! Classifies stock on hand by days since it last moved, flags dead stock
//! with a recommended disposition and finds slow movers from a trailing
//! window of completed sales.

use super::{days_between, percentage, AnalyticsContext};
use crate::error::Result;
use crate::types::StockedProduct;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the trailing sales window used for turnover.
pub const TURNOVER_WINDOW_DAYS: i64 = 180;
/// Items idle for longer than this are dead stock.
pub const DEAD_STOCK_DAYS: i64 = 180;
/// Dead stock idle for longer than this should be written off.
pub const WRITEOFF_DAYS: i64 = 365;
/// Annualized turnover below which selling stock is slow-moving.
pub const SLOW_MOVING_TURNOVER: f64 = 4.0;
/// Days of supply reported for stock that is not selling.
pub const NO_SALES_DAYS_OF_SUPPLY: f64 = 999.0;

/// Age range of idle stock. Upper bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeBracket {
    /// 0-30 days
    Current,
    /// 31-60 days
    Days30To60,
    /// 61-90 days
    Days60To90,
    /// 91-180 days
    Days90To180,
    /// More than 180 days
    Over180Days,
}

impl AgeBracket {
    pub fn from_days(days: i64) -> Self {
        match days {
            d if d <= 30 => AgeBracket::Current,
            d if d <= 60 => AgeBracket::Days30To60,
            d if d <= 90 => AgeBracket::Days60To90,
            d if d <= DEAD_STOCK_DAYS => AgeBracket::Days90To180,
            _ => AgeBracket::Over180Days,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBracket::Current => "0-30 days",
            AgeBracket::Days30To60 => "31-60 days",
            AgeBracket::Days60To90 => "61-90 days",
            AgeBracket::Days90To180 => "91-180 days",
            AgeBracket::Over180Days => "180+ days",
        }
    }

    pub const ALL: [AgeBracket; 5] = [
        AgeBracket::Current,
        AgeBracket::Days30To60,
        AgeBracket::Days60To90,
        AgeBracket::Days90To180,
        AgeBracket::Over180Days,
    ];
}

/// What to do with dead stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Writeoff,
    Return,
    Discount,
}

impl RecommendedAction {
    /// Write off after a year idle, otherwise return to the supplier if
    /// there is one, otherwise discount.
    pub fn for_dead_stock(days_in_stock: i64, has_supplier: bool) -> Self {
        if days_in_stock > WRITEOFF_DAYS {
            RecommendedAction::Writeoff
        } else if has_supplier {
            RecommendedAction::Return
        } else {
            RecommendedAction::Discount
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Writeoff => "writeoff",
            RecommendedAction::Return => "return",
            RecommendedAction::Discount => "discount",
        }
    }
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// Report types
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSummary {
    pub items: u64,
    pub value: f64,
    /// Share of total inventory value
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingBrackets {
    pub current: BracketSummary,
    pub days30_to60: BracketSummary,
    pub days60_to90: BracketSummary,
    pub days90_to180: BracketSummary,
    pub over180_days: BracketSummary,
}

impl AgingBrackets {
    pub fn get(&self, bracket: AgeBracket) -> &BracketSummary {
        match bracket {
            AgeBracket::Current => &self.current,
            AgeBracket::Days30To60 => &self.days30_to60,
            AgeBracket::Days60To90 => &self.days60_to90,
            AgeBracket::Days90To180 => &self.days90_to180,
            AgeBracket::Over180Days => &self.over180_days,
        }
    }

    fn get_mut(&mut self, bracket: AgeBracket) -> &mut BracketSummary {
        match bracket {
            AgeBracket::Current => &mut self.current,
            AgeBracket::Days30To60 => &mut self.days30_to60,
            AgeBracket::Days60To90 => &mut self.days60_to90,
            AgeBracket::Days90To180 => &mut self.days90_to180,
            AgeBracket::Over180Days => &mut self.over180_days,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    /// Products with stock on hand
    pub total_products: u64,
    pub total_inventory_value: f64,
    /// Items outside the current bracket
    pub total_aged_items: u64,
    pub dead_stock_items: u64,
    pub dead_stock_value: f64,
    pub slow_moving_items: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadStockItem {
    pub product_id: String,
    pub product_name: String,
    pub sku: String,
    pub category: Option<String>,
    pub stock_quantity: i64,
    pub days_in_stock: i64,
    pub inventory_value: f64,
    pub recommended_action: RecommendedAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowMovingItem {
    pub product_id: String,
    pub product_name: String,
    pub sku: String,
    pub stock_quantity: i64,
    pub days_in_stock: i64,
    /// Units sold in the trailing window
    pub sales_in_period: u64,
    pub average_daily_sales: f64,
    pub turnover_rate: f64,
    pub days_of_supply: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAgingReport {
    pub summary: InventorySummary,
    pub aging_brackets: AgingBrackets,
    /// Descending by days in stock
    pub dead_stock: Vec<DeadStockItem>,
    /// Ascending by turnover rate
    pub slow_moving: Vec<SlowMovingItem>,
}

/// Turnover figures for one product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turnover {
    pub sales_in_period: u64,
    pub average_daily_sales: f64,
    pub turnover_rate: f64,
    pub days_of_supply: f64,
}

impl Turnover {
    pub fn compute(sales_in_period: u64, stock_quantity: i64) -> Self {
        let window = TURNOVER_WINDOW_DAYS as f64;
        let stock = stock_quantity as f64;
        let average_daily_sales = sales_in_period as f64 / window;

        let (turnover_rate, days_of_supply) = if average_daily_sales > 0.0 && stock > 0.0 {
            (
                sales_in_period as f64 / stock * (365.0 / window),
                stock / average_daily_sales,
            )
        } else {
            (0.0, NO_SALES_DAYS_OF_SUPPLY)
        };

        Self {
            sales_in_period,
            average_daily_sales,
            turnover_rate,
            days_of_supply,
        }
    }

    /// Selling, but below the turnover threshold.
    pub fn is_slow_moving(&self) -> bool {
        self.turnover_rate > 0.0 && self.turnover_rate < SLOW_MOVING_TURNOVER
    }
}

// ============================================
// Analyzer
// ============================================

/// Computes [`InventoryAgingReport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryAgingAnalyzer;

impl InventoryAgingAnalyzer {
    pub fn analyze(&self, ctx: &AnalyticsContext<'_>) -> Result<InventoryAgingReport> {
        let window_start = ctx
            .as_of
            .checked_sub_signed(Duration::days(TURNOVER_WINDOW_DAYS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let products = ctx.source.products_in_stock(window_start)?;
        tracing::debug!(products = products.len(), "Analyzing inventory aging");

        let mut summary = InventorySummary::default();
        let mut brackets = AgingBrackets::default();
        let mut dead_stock = Vec::new();
        let mut slow_moving = Vec::new();

        for stocked in products.iter().filter(|p| p.product.stock_quantity > 0) {
            let product = &stocked.product;
            let since = stocked.last_movement_at.unwrap_or(product.created_at);
            let days_in_stock = days_between(since, ctx.as_of).max(0);
            let inventory_value = product.stock_quantity as f64 * product.unit_cost();

            summary.total_products += 1;

            let bracket = AgeBracket::from_days(days_in_stock);
            let slot = brackets.get_mut(bracket);
            slot.items += 1;
            slot.value += inventory_value;
            if bracket != AgeBracket::Current {
                summary.total_aged_items += 1;
            }

            if bracket == AgeBracket::Over180Days {
                summary.dead_stock_items += 1;
                summary.dead_stock_value += inventory_value;
                dead_stock.push(DeadStockItem {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    sku: product.sku.clone(),
                    category: product.category.as_ref().map(|c| c.name.clone()),
                    stock_quantity: product.stock_quantity,
                    days_in_stock,
                    inventory_value,
                    recommended_action: RecommendedAction::for_dead_stock(
                        days_in_stock,
                        product.supplier_id.is_some(),
                    ),
                });
            }

            let turnover = Turnover::compute(units_sold(stocked), product.stock_quantity);
            if turnover.is_slow_moving() {
                summary.slow_moving_items += 1;
                slow_moving.push(SlowMovingItem {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    sku: product.sku.clone(),
                    stock_quantity: product.stock_quantity,
                    days_in_stock,
                    sales_in_period: turnover.sales_in_period,
                    average_daily_sales: turnover.average_daily_sales,
                    turnover_rate: turnover.turnover_rate,
                    days_of_supply: turnover.days_of_supply,
                });
            }
        }

        // Summed from the brackets so their values add up to the total.
        summary.total_inventory_value = AgeBracket::ALL
            .iter()
            .map(|&bracket| brackets.get(bracket).value)
            .sum();
        for bracket in AgeBracket::ALL {
            let slot = brackets.get_mut(bracket);
            slot.percentage = percentage(slot.value, summary.total_inventory_value);
        }

        dead_stock.sort_by(|a, b| b.days_in_stock.cmp(&a.days_in_stock));
        slow_moving.sort_by(|a, b| a.turnover_rate.total_cmp(&b.turnover_rate));

        Ok(InventoryAgingReport {
            summary,
            aging_brackets: brackets,
            dead_stock,
            slow_moving,
        })
    }
}

fn units_sold(stocked: &StockedProduct) -> u64 {
    stocked
        .recent_sale_quantities
        .iter()
        .map(|&q| u64::from(q))
        .sum()
}
