//! # Stock Status
//!
//! Per-product availability rollup consumed by the catalog.
//!
//! ## Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Σ quantity == 0                                   → out_of_stock       │
//! │  Σ quantity  > 0 and ANY item quantity ≤ threshold → low_stock          │
//! │  otherwise                                         → in_stock           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Catalog-facing availability of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockStatus::InStock => write!(f, "in_stock"),
            StockStatus::LowStock => write!(f, "low_stock"),
            StockStatus::OutOfStock => write!(f, "out_of_stock"),
        }
    }
}

/// The stock figures of one item that the rollup needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStockLevel {
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub low_stock_threshold: i64,
}

/// Aggregated stock of every active item of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductStockInfo {
    pub product_id: String,
    pub status: StockStatus,
    pub total_quantity: i64,
    pub total_reserved: i64,
    pub total_available: i64,
    pub item_count: i64,
    /// Items at or below their own low-stock threshold.
    pub low_stock_items: i64,
}

impl ProductStockInfo {
    /// Rolls item levels up into a product status.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::stock_status::{ItemStockLevel, ProductStockInfo, StockStatus};
    ///
    /// let levels = [
    ///     ItemStockLevel { quantity: 40, reserved_quantity: 0, low_stock_threshold: 10 },
    ///     ItemStockLevel { quantity: 3, reserved_quantity: 1, low_stock_threshold: 10 },
    /// ];
    /// let info = ProductStockInfo::from_levels("p1", levels);
    /// assert_eq!(info.status, StockStatus::LowStock);
    /// assert_eq!(info.total_available, 42);
    /// ```
    pub fn from_levels(
        product_id: impl Into<String>,
        levels: impl IntoIterator<Item = ItemStockLevel>,
    ) -> Self {
        let mut total_quantity = 0;
        let mut total_reserved = 0;
        let mut total_available = 0;
        let mut item_count = 0;
        let mut low_stock_items = 0;

        for level in levels {
            total_quantity += level.quantity;
            total_reserved += level.reserved_quantity;
            total_available += (level.quantity - level.reserved_quantity).max(0);
            item_count += 1;
            if level.quantity <= level.low_stock_threshold {
                low_stock_items += 1;
            }
        }

        let status = if total_quantity <= 0 {
            StockStatus::OutOfStock
        } else if low_stock_items > 0 {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        };

        ProductStockInfo {
            product_id: product_id.into(),
            status,
            total_quantity,
            total_reserved,
            total_available,
            item_count,
            low_stock_items,
        }
    }
}
