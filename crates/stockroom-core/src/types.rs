//! # Domain Types
//!
//! Core domain types of the inventory core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Model                                    │
//! │                                                                         │
//! │  ItemKey (product, variant, size)                                      │
//! │     │ 1:1                                                               │
//! │     ▼                                                                   │
//! │  InventoryItem ──────────┬──── 1:N ───► InventoryTransaction (ledger)  │
//! │  • quantity              │                • IN / OUT / ADJUST           │
//! │  • reserved_quantity     │                • before / change / after     │
//! │  • average_cost_price    │                • reason, reference           │
//! │  • selling/final price   │                                              │
//! │                          └──── 1:N ───► InventoryReservation           │
//! │                                           • per order (correlation id)  │
//! │                                                                         │
//! │  Order ──► LineItem (ItemKey, quantity)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every inventory item has:
//! - `id`: UUID v4 - immutable, used by the ledger and reservations
//! - Business key: `(product_id, variant_id, size)` plus the immutable `sku`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::{Money, Percent};
use crate::stock_status::ItemStockLevel;

// =============================================================================
// Item Key
// =============================================================================

/// Identifies one stock record: a size of a variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemKey {
    pub product_id: String,
    pub variant_id: String,
    pub size: String,
}

impl ItemKey {
    pub fn new(
        product_id: impl Into<String>,
        variant_id: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        ItemKey {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.product_id, self.variant_id, self.size)
    }
}

// =============================================================================
// Inventory Item
// =============================================================================

/// Stock record for one (product, variant, size).
///
/// ## Cached Pricing
/// `selling_price`, `discount_bps` and `final_price` are derived from
/// `average_cost_price` on every stock-in and cached for catalog reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub product_id: String,
    pub variant_id: String,
    pub size: String,

    /// Assigned by the variant subsystem before creation; never changes.
    pub sku: String,

    /// On-hand units, never negative.
    pub quantity: i64,

    /// Units earmarked for orders that are not yet deducted.
    pub reserved_quantity: i64,

    /// Unit cost of the most recent stock-in batch.
    pub cost_price: i64,

    /// Quantity-weighted average unit cost since the item last hit zero.
    pub average_cost_price: i64,

    /// Base selling price derived from the average cost.
    pub selling_price: i64,

    /// Discount applied on top of the selling price (basis points).
    pub discount_bps: i64,

    /// Price after discount.
    pub final_price: i64,

    /// Profit target used for the cached prices (basis points).
    pub target_profit_bps: i64,

    /// Reorder trigger for the stock-status rollup.
    pub low_stock_threshold: i64,

    /// False once the size was removed from its variant.
    pub is_active: bool,

    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Creates an empty stock record (quantity and costs at zero).
    pub fn new(key: &ItemKey, sku: impl Into<String>, low_stock_threshold: i64, now: DateTime<Utc>) -> Self {
        InventoryItem {
            id: Uuid::new_v4().to_string(),
            product_id: key.product_id.clone(),
            variant_id: key.variant_id.clone(),
            size: key.size.clone(),
            sku: sku.into(),
            quantity: 0,
            reserved_quantity: 0,
            cost_price: 0,
            average_cost_price: 0,
            selling_price: 0,
            discount_bps: 0,
            final_price: 0,
            target_profit_bps: 0,
            low_stock_threshold,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the business key of this item.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(&self.product_id, &self.variant_id, &self.size)
    }

    /// On-hand minus reserved, never below zero.
    #[inline]
    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved_quantity).max(0)
    }

    #[inline]
    pub fn average_cost(&self) -> Money {
        Money::from_units(self.average_cost_price)
    }

    #[inline]
    pub fn discount(&self) -> Percent {
        Percent::from_bps(self.discount_bps)
    }

    #[inline]
    pub fn target_profit(&self) -> Percent {
        Percent::from_bps(self.target_profit_bps)
    }

    /// Human-readable name used in order-facing error messages.
    pub fn label(&self) -> String {
        format!("{} (size {})", self.sku, self.size)
    }

    pub fn stock_level(&self) -> ItemStockLevel {
        ItemStockLevel {
            quantity: self.quantity,
            reserved_quantity: self.reserved_quantity,
            low_stock_threshold: self.low_stock_threshold,
        }
    }
}

// =============================================================================
// Transaction Type
// =============================================================================

/// Direction of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Units added (restock, return, rollback).
    In,
    /// Units removed (sale, damage).
    Out,
    /// Absolute correction from a physical stocktake.
    Adjust,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::In => write!(f, "IN"),
            TransactionType::Out => write!(f, "OUT"),
            TransactionType::Adjust => write!(f, "ADJUST"),
        }
    }
}

// =============================================================================
// Transaction Reason
// =============================================================================

/// Why a movement happened. Fixed vocabulary: historical ledger rows depend
/// on these exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    Restock,
    Sale,
    Return,
    Damage,
    Adjustment,
    Cancelled,
    DeliveryFailed,
    Rollback,
}

impl TransactionReason {
    /// Reasons that may be recorded under a movement type.
    pub fn allowed_for(kind: TransactionType) -> &'static [TransactionReason] {
        use TransactionReason::*;
        match kind {
            TransactionType::In => &[Restock, Return, Cancelled, DeliveryFailed, Rollback, Adjustment],
            TransactionType::Out => &[Sale, Damage, Adjustment],
            TransactionType::Adjust => &[Adjustment, Damage],
        }
    }

    /// The movement that undoes this one within a fulfillment saga.
    ///
    /// A `sale` deduction is undone by a `rollback` stock-in and vice versa;
    /// the duplicate guard only honours the most recent of the pair.
    pub fn saga_counterpart(&self) -> Option<(TransactionType, TransactionReason)> {
        match self {
            TransactionReason::Sale => Some((TransactionType::In, TransactionReason::Rollback)),
            TransactionReason::Rollback => Some((TransactionType::Out, TransactionReason::Sale)),
            _ => None,
        }
    }

    /// Reasons used to put sold units back after an order is unwound.
    pub fn is_order_restock(&self) -> bool {
        matches!(
            self,
            TransactionReason::Return | TransactionReason::Cancelled | TransactionReason::DeliveryFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::Restock => "restock",
            TransactionReason::Sale => "sale",
            TransactionReason::Return => "return",
            TransactionReason::Damage => "damage",
            TransactionReason::Adjustment => "adjustment",
            TransactionReason::Cancelled => "cancelled",
            TransactionReason::DeliveryFailed => "delivery_failed",
            TransactionReason::Rollback => "rollback",
        }
    }
}

impl fmt::Display for TransactionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "restock" => Ok(TransactionReason::Restock),
            "sale" => Ok(TransactionReason::Sale),
            "return" => Ok(TransactionReason::Return),
            "damage" => Ok(TransactionReason::Damage),
            "adjustment" => Ok(TransactionReason::Adjustment),
            "cancelled" => Ok(TransactionReason::Cancelled),
            "delivery_failed" => Ok(TransactionReason::DeliveryFailed),
            "rollback" => Ok(TransactionReason::Rollback),
            other => Err(ValidationError::InvalidFormat {
                field: "reason".to_string(),
                reason: format!("unknown ledger reason '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Inventory Transaction
// =============================================================================

/// One immutable ledger row.
///
/// ## Snapshot Pattern
/// Quantities and costs are recorded before and after the movement, so the
/// ledger alone can reconstruct the item's history and historical cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryTransaction {
    /// Store-wide ledger sequence in commit order; an item's history is its rows ordered by it.
    pub seq: i64,

    pub id: String,
    pub inventory_item_id: String,
    pub transaction_type: TransactionType,

    pub quantity_before: i64,
    /// Signed change; negative for OUT and downward adjustments.
    pub quantity_change: i64,
    pub quantity_after: i64,

    /// Unit cost this movement was valued at.
    pub cost_price: i64,
    pub average_cost_price_before: i64,
    pub average_cost_price_after: i64,
    /// `cost_price × |quantity_change|`.
    pub total_cost: i64,

    /// Pricing inputs and outputs; only recorded for IN.
    pub target_profit_bps: Option<i64>,
    pub discount_bps: Option<i64>,
    pub base_price: Option<i64>,
    pub final_price: Option<i64>,
    pub profit_per_item: Option<i64>,
    pub margin_bps: Option<i64>,
    pub markup_bps: Option<i64>,

    pub reason: TransactionReason,
    /// External correlation id (typically an order id).
    pub reference: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reservations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Units are held against the item.
    Active,
    /// Released without moving stock (cancellation, undo).
    Released,
    /// Taken by the order's sale; restored if that sale is rolled back.
    Consumed,
}

/// Units held for one order on one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryReservation {
    pub id: String,
    pub inventory_item_id: String,
    pub correlation_id: String,
    pub quantity: i64,
    pub status: ReservationStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub released_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Orders
// =============================================================================

/// One line of an order, as the order component hands it to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub key: ItemKey,
    pub quantity: i64,
}

impl LineItem {
    pub fn new(key: ItemKey, quantity: i64) -> Self {
        LineItem { key, quantity }
    }
}

/// The slice of an order the fulfillment saga needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    /// Order id; doubles as the ledger reference and reservation correlation id.
    pub id: String,
    pub items: Vec<LineItem>,
}

// =============================================================================
// Compensation Outbox
// =============================================================================

/// A compensating stock-in that could not be applied during a saga.
///
/// ## Lifecycle
/// ```text
/// saga rollback fails ──► queued (attempts = 1)
///                              │ worker retries with backoff
///                              ▼
///            applied or found already applied ──► resolved_at = now
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CompensationEntry {
    pub id: String,
    pub inventory_item_id: String,
    pub quantity: i64,
    /// Cost the deducted units left with; restored at the same cost.
    pub unit_cost: i64,
    pub reference: String,
    pub performed_by: Option<String>,
    /// The error that made the saga compensate in the first place.
    pub failure: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Catalog Read Models
// =============================================================================

/// Availability and price of one size, as the catalog renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SizePricing {
    pub size: String,
    pub sku: String,
    pub quantity: i64,
    pub available: i64,
    pub average_cost_price: Money,
    pub selling_price: Money,
    pub discount: Percent,
    pub final_price: Money,
}

impl From<&InventoryItem> for SizePricing {
    fn from(item: &InventoryItem) -> Self {
        SizePricing {
            size: item.size.clone(),
            sku: item.sku.clone(),
            quantity: item.quantity,
            available: item.available(),
            average_cost_price: item.average_cost(),
            selling_price: Money::from_units(item.selling_price),
            discount: item.discount(),
            final_price: Money::from_units(item.final_price),
        }
    }
}

/// Pricing for every active size of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantPricing {
    pub variant_id: String,
    pub sizes: Vec<SizePricing>,
}

// =============================================================================
// Unit Tests
// =============================================================================
