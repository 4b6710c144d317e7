//! Record source abstraction
//!
//! The analytics engine never owns POS records. It reads them through
//! [`RecordSource`], which the SQLite [`Database`](crate::db::Database)
//! implements. Other backends (an HTTP client to the main POS service, a
//! fixture in tests) can implement it too.

use crate::error::Result;
use crate::types::{CustomerRecord, Sale, SaleStatus, StockedProduct};
use chrono::{DateTime, Utc};

/// Read-only query contract over persisted POS records.
///
/// Implementations must not retry internally; a failed query is returned
/// to the caller as-is.
pub trait RecordSource: Send + Sync {
    /// Sales with `created_at` in `[start, end]` and the given status.
    ///
    /// Each sale carries its items, each item its product, each product its
    /// category. Sales are ordered by `created_at` ascending.
    fn sales_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: SaleStatus,
    ) -> Result<Vec<Sale>>;

    /// Products with `stock_quantity > 0`.
    ///
    /// Each entry carries the timestamp of the newest stock movement and the
    /// quantities of completed sale items created at or after `sales_since`.
    fn products_in_stock(&self, sales_since: DateTime<Utc>) -> Result<Vec<StockedProduct>>;

    /// Customers with all their sales (any status) and loans.
    ///
    /// `customer_id` narrows the result to one customer; an unknown id
    /// yields an empty list.
    fn customers(&self, customer_id: Option<&str>) -> Result<Vec<CustomerRecord>>;
}
