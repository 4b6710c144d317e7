//! pos-insights-report - run business reports over the local record store
//!
//! Prints profit margins, customer lifetime values or inventory aging as
//! text or JSON. Margin and inventory reports are served from the result
//! cache when fresh.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use pos_insights_core::analytics::{AgeBracket, AnalyticsFacade, GroupBy, SegmentFilter};
use pos_insights_core::format::{
    format_amount, format_delta, format_optional, format_percent, format_relative_time,
};
use pos_insights_core::{Config, CustomerLifetimeValue, InventoryAgingReport, ProfitMarginAnalysis};
use serde::Serialize;
use std::path::PathBuf;

/// Rows shown per breakdown in text output.
const TOP_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "pos-insights-report")]
#[command(about = "Profit, customer value and inventory aging reports")]
#[command(version)]
struct Args {
    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    /// Database file (default: from config, else $XDG_DATA_HOME/pos-insights/data.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Profit margins for completed sales between two dates (inclusive)
    Margins {
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,

        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,

        /// Breakdowns to include: product, category or both
        #[arg(long, default_value = "both")]
        group_by: GroupBy,

        /// Recompute even if a cached report exists
        #[arg(long)]
        refresh: bool,
    },

    /// Customer lifetime value, highest first
    Customers {
        /// Only this customer
        #[arg(long)]
        customer: Option<String>,

        /// Segment filter: all, vip or at-risk
        #[arg(long, default_value = "all")]
        segment: SegmentFilter,
    },

    /// Inventory aging, dead stock and slow movers
    Inventory {
        /// Recompute even if a cached report exists
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let format = match args.format.as_str() {
        "text" => OutputFormat::Text,
        "json" => OutputFormat::Json,
        other => anyhow::bail!("Unknown format '{}'. Use text or json", other),
    };

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(path) = args.database {
        config.database_path = Some(path);
    }

    // Initialize logging
    let _log_guard =
        pos_insights_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let facade = AnalyticsFacade::open(&config).context("failed to open record store")?;
    tracing::debug!(backend = ?config.cache.backend, "Running report");

    match args.command {
        Command::Margins {
            from,
            to,
            group_by,
            refresh,
        } => cmd_margins(&facade, format, from, to, group_by, refresh),
        Command::Customers { customer, segment } => {
            cmd_customers(&facade, format, customer.as_deref(), segment)
        }
        Command::Inventory { refresh } => cmd_inventory(&facade, format, refresh),
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

// ============================================
// Margins
// ============================================

fn cmd_margins(
    facade: &AnalyticsFacade,
    format: OutputFormat,
    from: NaiveDate,
    to: NaiveDate,
    group_by: GroupBy,
    refresh: bool,
) -> Result<()> {
    if to < from {
        anyhow::bail!("--to ({}) is before --from ({})", to, from);
    }

    // Whole days: [from 00:00:00, to 23:59:59] UTC
    let start = from
        .and_hms_opt(0, 0, 0)
        .context("invalid --from date")?
        .and_utc();
    let end = to
        .and_hms_opt(23, 59, 59)
        .context("invalid --to date")?
        .and_utc();

    if refresh {
        facade
            .invalidate_profit_margins(start, end, group_by)
            .context("failed to invalidate cached report")?;
    }

    let analysis = facade
        .profit_margins(start, end, group_by)
        .context("failed to analyze profit margins")?;

    match format {
        OutputFormat::Json => print_json(&analysis),
        OutputFormat::Text => {
            print_margins(&analysis, from, to);
            Ok(())
        }
    }
}

fn print_margins(analysis: &ProfitMarginAnalysis, from: NaiveDate, to: NaiveDate) {
    println!("Profit Margins: {} to {}", from, to);
    println!("==========================================");
    println!();

    let overall = &analysis.overall;
    println!("Revenue:  {:>18}", format_amount(overall.revenue));
    println!("Cost:     {:>18}", format_amount(overall.cost));
    println!("Profit:   {:>18}", format_amount(overall.profit));
    println!("Margin:   {:>18}", format_percent(overall.margin_percentage));
    println!();

    let trend = &analysis.trends;
    println!(
        "Trend:    {} vs previous period ({})",
        format_delta(trend.change_percentage),
        if trend.is_improving {
            "improving"
        } else {
            "not improving"
        }
    );
    println!("Forecast: {}", format_amount(trend.forecast));

    if !analysis.by_product.is_empty() {
        println!();
        println!("By product:");
        for row in analysis.by_product.iter().take(TOP_ROWS) {
            println!(
                "  {:<28} {:>6} units {:>16} {:>8}",
                truncate(&row.product_name, 28),
                row.units_sold,
                format_amount(row.profit),
                format_percent(row.margin_percentage)
            );
        }
        if analysis.by_product.len() > TOP_ROWS {
            println!("  ... and {} more", analysis.by_product.len() - TOP_ROWS);
        }
    }

    if !analysis.by_category.is_empty() {
        println!();
        println!("By category:");
        for row in analysis.by_category.iter().take(TOP_ROWS) {
            println!(
                "  {:<40} {:>16} {:>8}",
                truncate(&row.category_name, 40),
                format_amount(row.profit),
                format_percent(row.margin_percentage)
            );
        }
    }

    if !analysis.by_time_range.monthly.is_empty() {
        println!();
        println!("By month:");
        for row in &analysis.by_time_range.monthly {
            println!(
                "  {:<10} revenue {:>16}  profit {:>16}  {:>8}",
                row.period,
                format_amount(row.revenue),
                format_amount(row.profit),
                format_percent(row.margin_percentage)
            );
        }
    }
}

// ============================================
// Customers
// ============================================

fn cmd_customers(
    facade: &AnalyticsFacade,
    format: OutputFormat,
    customer: Option<&str>,
    segment: SegmentFilter,
) -> Result<()> {
    let values = facade
        .customer_lifetime_values(customer, segment)
        .context("failed to analyze customer value")?;

    match format {
        OutputFormat::Json => print_json(&values),
        OutputFormat::Text => {
            print_customers(&values, segment);
            Ok(())
        }
    }
}

fn print_customers(values: &[CustomerLifetimeValue], segment: SegmentFilter) {
    println!("Customer Lifetime Value ({})", segment);
    println!("==========================================");

    if values.is_empty() {
        println!();
        println!("No customers with purchase history.");
        return;
    }

    let now = Utc::now();
    for clv in values {
        let m = &clv.metrics;
        println!();
        println!("{} ({})", clv.customer_name, clv.customer_id);
        println!(
            "  Segment: {:<8} Churn risk: {:<7} Last purchase: {}",
            m.segment.as_str(),
            m.churn_risk.as_str(),
            format_relative_time(clv.history.last_purchase, now)
        );
        println!(
            "  Spent: {}  Purchases: {}  Avg order: {}",
            format_amount(m.total_spent),
            m.total_purchases,
            format_amount(m.average_order_value)
        );
        println!(
            "  Predicted LTV: {}  ({:.2} purchases/month)",
            format_amount(m.predicted_ltv),
            m.purchase_frequency
        );
        if !clv.history.favorite_categories.is_empty() {
            println!(
                "  Favorites: {}",
                clv.history.favorite_categories.join(", ")
            );
        }
        println!(
            "  Pays by: {}  Loans: {}  Phone: {}  Email: {}",
            clv.history.preferred_payment_method,
            clv.history.loan_count,
            format_optional(clv.phone.as_deref()),
            format_optional(clv.email.as_deref())
        );
    }
}

// ============================================
// Inventory
// ============================================

fn cmd_inventory(facade: &AnalyticsFacade, format: OutputFormat, refresh: bool) -> Result<()> {
    if refresh {
        facade
            .invalidate_inventory()
            .context("failed to invalidate cached report")?;
    }

    let report = facade
        .inventory_aging()
        .context("failed to analyze inventory aging")?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print_inventory(&report);
            Ok(())
        }
    }
}

fn print_inventory(report: &InventoryAgingReport) {
    let summary = &report.summary;
    println!("Inventory Aging");
    println!("==========================================");
    println!();
    println!("Products in stock: {}", summary.total_products);
    println!(
        "Inventory value:   {}",
        format_amount(summary.total_inventory_value)
    );
    println!("Aged items:        {}", summary.total_aged_items);
    println!();

    println!("Aging brackets:");
    for bracket in AgeBracket::ALL {
        let slot = report.aging_brackets.get(bracket);
        println!(
            "  {:<12} {:>5} items {:>16} {:>8}",
            bracket.label(),
            slot.items,
            format_amount(slot.value),
            format_percent(slot.percentage)
        );
    }

    if !report.dead_stock.is_empty() {
        println!();
        println!(
            "Dead stock ({} items, {}):",
            summary.dead_stock_items,
            format_amount(summary.dead_stock_value)
        );
        for item in &report.dead_stock {
            println!(
                "  {:<28} {:>5} days {:>16}  {}",
                truncate(&item.product_name, 28),
                item.days_in_stock,
                format_amount(item.inventory_value),
                item.recommended_action
            );
        }
    }

    if !report.slow_moving.is_empty() {
        println!();
        println!("Slow movers ({}):", summary.slow_moving_items);
        for item in &report.slow_moving {
            println!(
                "  {:<28} turnover {:>6.2}  supply {:>6.0} days",
                truncate(&item.product_name, 28),
                item.turnover_rate,
                item.days_of_supply
            );
        }
    }
}

/// Truncate a string to fit in a column.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
