//! # Stock Change Events
//!
//! Every committed movement or reservation change is announced to one
//! listener. Delivery is best-effort: a listener cannot fail the write
//! that triggered it.
//!
//! ```text
//! Executor / ReservationManager ──► StockChanged ──► StockChangeListener
//!                                                     (StockStatusProjector)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use stockroom_core::{InventoryItem, TransactionType};

/// What caused a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockChangeKind {
    Movement(TransactionType),
    Reserved,
    Released,
}

/// An item's state right after a change committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChanged {
    pub kind: StockChangeKind,
    pub item_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub reserved_quantity: i64,
}

impl StockChanged {
    pub fn new(kind: StockChangeKind, item: &InventoryItem) -> Self {
        StockChanged {
            kind,
            item_id: item.id.clone(),
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
            reserved_quantity: item.reserved_quantity,
        }
    }
}

/// Receives stock changes after commit. Must handle its own failures.
#[async_trait]
pub trait StockChangeListener: Send + Sync {
    async fn on_stock_changed(&self, event: &StockChanged);
}

/// Listener that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

#[async_trait]
impl StockChangeListener for NoopListener {
    async fn on_stock_changed(&self, _event: &StockChanged) {}
}

/// Shared listener handle.
pub type SharedListener = Arc<dyn StockChangeListener>;
