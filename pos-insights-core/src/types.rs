//! Core domain types for pos-insights
//!
//! These types mirror the records kept by the point-of-sale back office.
//! The analytics engine only ever reads them; ownership stays with the
//! [`RecordSource`](crate::source::RecordSource).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Sale** | A checkout, possibly for a walk-in shopper with no customer record |
//! | **SaleItem** | One line of a sale; carries a unit price snapshot |
//! | **Product** | A stocked article with a *current* cost price |
//! | **Category** | A grouping label for products |
//! | **Customer** | A known buyer with a history of sales and loans |
//! | **StockMovement** | Any change to a product's stock level (receipt, sale, adjustment) |
//!
//! Only sales with [`SaleStatus::Completed`] count toward monetary totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Sale status
// ============================================

/// Lifecycle state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl SaleStatus {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "PENDING",
            SaleStatus::Completed => "COMPLETED",
            SaleStatus::Cancelled => "CANCELLED",
            SaleStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SaleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SaleStatus::Pending),
            "COMPLETED" => Ok(SaleStatus::Completed),
            "CANCELLED" => Ok(SaleStatus::Cancelled),
            "REFUNDED" => Ok(SaleStatus::Refunded),
            _ => Err(format!("unknown sale status: {}", s)),
        }
    }
}

// ============================================
// Payment method
// ============================================

/// How a sale was paid for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    MobileMoney,
    Card,
    BankTransfer,
    Credit,
}

impl PaymentMethod {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::MobileMoney => "MOBILE_MONEY",
            PaymentMethod::Card => "CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentMethod::Cash),
            "MOBILE_MONEY" => Ok(PaymentMethod::MobileMoney),
            "CARD" => Ok(PaymentMethod::Card),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "CREDIT" => Ok(PaymentMethod::Credit),
            _ => Err(format!("unknown payment method: {}", s)),
        }
    }
}

// ============================================
// Catalog
// ============================================

/// A product grouping label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// A stocked article.
///
/// `cost_price` is the *current* purchase cost. Sale items do not snapshot
/// it, so repricing a product changes the cost side of historical reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: String,
    /// Unit cost; `None` is treated as zero by every report
    #[serde(default)]
    pub cost_price: Option<f64>,
    /// Units currently on hand
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub supplier_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Cost price with the missing-price policy applied.
    pub fn unit_cost(&self) -> f64 {
        self.cost_price.unwrap_or(0.0)
    }
}

/// A change to a product's stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    /// Signed change in units (receipts positive, removals negative)
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================
// Sales
// ============================================

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: String,
    /// The product sold, with its category
    pub product: Product,
    pub quantity: u32,
    /// Price per unit at the time of sale
    pub unit_price: f64,
}

impl SaleItem {
    /// `quantity × unit_price`
    pub fn revenue(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }

    /// `quantity × current cost price`
    pub fn cost(&self) -> f64 {
        f64::from(self.quantity) * self.product.unit_cost()
    }
}

/// A checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    /// Walk-in sales have no customer
    pub customer_id: Option<String>,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
    pub total_amount: f64,
    pub payment_method: PaymentMethod,
}

impl Sale {
    pub fn is_completed(&self) -> bool {
        self.status == SaleStatus::Completed
    }
}

// ============================================
// Customers
// ============================================

/// A known buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Credit extended to a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: String,
    pub customer_id: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// A customer together with everything the CLV report reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer: Customer,
    /// All sales regardless of status, with items, products and categories
    pub sales: Vec<Sale>,
    pub loans: Vec<Loan>,
}

/// A product with stock on hand plus the movement and sales data the
/// inventory report needs.
#[derive(Debug, Clone, PartialEq)]
pub struct StockedProduct {
    pub product: Product,
    /// Timestamp of the most recent stock movement, if any
    pub last_movement_at: Option<DateTime<Utc>>,
    /// Quantities of completed sale items inside the trailing window
    pub recent_sale_quantities: Vec<u32>,
}

// ============================================
// Import snapshot
// ============================================

/// Flat sale line as it appears in an import snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSaleItem {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// Flat sale as it appears in an import snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSale {
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SnapshotSaleItem>,
    pub total_amount: f64,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Flat product as it appears in an import snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotProduct {
    pub id: String,
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub cost_price: Option<f64>,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub supplier_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Product> for SnapshotProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            sku: product.sku.clone(),
            cost_price: product.cost_price,
            stock_quantity: product.stock_quantity,
            category_id: product.category.as_ref().map(|c| c.id.clone()),
            supplier_id: product.supplier_id.clone(),
            created_at: product.created_at,
        }
    }
}

impl From<&Sale> for SnapshotSale {
    fn from(sale: &Sale) -> Self {
        Self {
            id: sale.id.clone(),
            customer_id: sale.customer_id.clone(),
            status: sale.status,
            created_at: sale.created_at,
            items: sale
                .items
                .iter()
                .map(|item| SnapshotSaleItem {
                    id: item.id.clone(),
                    product_id: item.product.id.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            total_amount: sale.total_amount,
            payment_method: sale.payment_method,
        }
    }
}

/// A dump of POS records, loaded by `pos-insights-import`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub categories: Vec<Category>,
    pub products: Vec<SnapshotProduct>,
    pub stock_movements: Vec<StockMovement>,
    pub customers: Vec<Customer>,
    pub loans: Vec<Loan>,
    pub sales: Vec<SnapshotSale>,
}
