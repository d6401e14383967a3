//! # Stock-Status Projection
//!
//! Recomputes a product's stock status after every stock change and pushes
//! it to the catalog cache.
//!
//! ```text
//! StockChanged(product p) ──► find_by_product(p) ──► ProductStockInfo
//!                                                         │ bounded publish
//!                                                         ▼
//!                                                   StockStatusSink
//! ```
//!
//! A failed push is logged and dropped; the next change for the product
//! publishes a fresh rollup.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use stockroom_core::ProductStockInfo;
use stockroom_db::Database;

use crate::collaborators::{bounded, StockStatusSink};
use crate::error::InventoryResult;
use crate::events::{StockChangeListener, StockChanged};

/// Stock-status projector.
#[derive(Clone)]
pub struct StockStatusProjector {
    db: Database,
    sink: Arc<dyn StockStatusSink>,
    timeout: Duration,
}

impl StockStatusProjector {
    pub fn new(db: Database, sink: Arc<dyn StockStatusSink>, timeout: Duration) -> Self {
        StockStatusProjector { db, sink, timeout }
    }

    /// Rolls up every active item of a product. Unknown products are out of stock.
    pub async fn product_stock_info(&self, product_id: &str) -> InventoryResult<ProductStockInfo> {
        let items = self.db.items().find_by_product(product_id).await?;
        Ok(ProductStockInfo::from_levels(
            product_id,
            items.iter().map(|item| item.stock_level()),
        ))
    }

    /// Recomputes and publishes one product's status.
    pub async fn refresh(&self, product_id: &str) -> InventoryResult<ProductStockInfo> {
        let info = self.product_stock_info(product_id).await?;
        bounded("stock status publish", self.timeout, self.sink.publish(&info)).await?;
        debug!(product_id, status = %info.status, "Stock status published");
        Ok(info)
    }
}

#[async_trait]
impl StockChangeListener for StockStatusProjector {
    async fn on_stock_changed(&self, event: &StockChanged) {
        if let Err(e) = self.refresh(&event.product_id).await {
            warn!(
                product_id = %event.product_id,
                item_id = %event.item_id,
                error = %e,
                "Stock status projection failed"
            );
        }
    }
}
