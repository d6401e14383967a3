//! # Inventory Service
//!
//! The one entry point the order component and the admin surface call.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         InventoryService                                │
//! │                                                                         │
//! │   Collaborators ─┬─ VariantCatalog ───► InventoryItemStore             │
//! │                  ├─ OrderReferences ──► remove_size                    │
//! │                  └─ StockStatusSink ──► StockStatusProjector           │
//! │                                              ▲                          │
//! │                                              │ StockChanged             │
//! │   StockMovementExecutor ─────────────────────┤                          │
//! │   ReservationManager ────────────────────────┘                          │
//! │          ▲                                                              │
//! │   FulfillmentSaga (executor + reservations + outbox)                   │
//! │   CompensationWorker (outbox → executor)                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let service = InventoryService::open(InventoryConfig::load_or_default(None), collaborators).await?;
//! service.reserve(&order.items, &order.id).await?;
//! service.deduct_for_order(&order, Some("shipper-7")).await?;
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use stockroom_core::{
    AdjustRequest, CompensationEntry, CoreError, InventoryItem, InventoryReservation,
    InventoryTransaction, ItemKey, LineItem, Order, ProductStockInfo, SizePricing,
    StockInRequest, StockOutRequest, TransactionReason, VariantPricing,
};
use stockroom_db::Database;

use crate::collaborators::{bounded, OrderReferences, StockStatusSink, VariantCatalog};
use crate::compensation::{CompensationWorker, CompensationWorkerHandle};
use crate::config::InventoryConfig;
use crate::error::InventoryResult;
use crate::events::SharedListener;
use crate::movement::{MovementReceipt, RetryPolicy, StockMovementExecutor};
use crate::projection::StockStatusProjector;
use crate::reservation::ReservationManager;
use crate::saga::FulfillmentSaga;
use crate::store::InventoryItemStore;

/// External systems the service depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn VariantCatalog>,
    pub orders: Arc<dyn OrderReferences>,
    pub stock_status: Arc<dyn StockStatusSink>,
}

/// What `remove_size` did with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeRemoval {
    /// No stock and no references: the row is gone (ledger kept).
    Deleted,
    /// Stock or order references remain: kept but inactive.
    Retired,
    /// There was no item for the size.
    Absent,
}

/// Inventory service facade.
#[derive(Clone)]
pub struct InventoryService {
    db: Database,
    config: Arc<InventoryConfig>,
    orders: Arc<dyn OrderReferences>,
    store: InventoryItemStore,
    executor: StockMovementExecutor,
    reservations: ReservationManager,
    saga: FulfillmentSaga,
    projector: StockStatusProjector,
}

impl InventoryService {
    /// Opens the configured database and wires the services.
    pub async fn open(config: InventoryConfig, collaborators: Collaborators) -> InventoryResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(db, config, collaborators))
    }

    /// Wires the services over an open database.
    pub fn new(db: Database, config: InventoryConfig, collaborators: Collaborators) -> Self {
        let timeout = config.collaborator_timeout();

        let projector = StockStatusProjector::new(db.clone(), collaborators.stock_status, timeout);
        let listener: SharedListener = Arc::new(projector.clone());

        let store = InventoryItemStore::new(
            db.clone(),
            collaborators.catalog,
            config.stock.default_low_stock_threshold,
            timeout,
        );
        let retry = RetryPolicy {
            max_attempts: config.concurrency.max_write_retries,
            initial_backoff: config.retry_backoff(),
        };
        let executor = StockMovementExecutor::new(db.clone(), listener.clone(), retry);
        let reservations = ReservationManager::new(db.clone(), store.clone(), listener);
        let saga = FulfillmentSaga::new(
            db.clone(),
            store.clone(),
            executor.clone(),
            reservations.clone(),
        );

        InventoryService {
            db,
            config: Arc::new(config),
            orders: collaborators.orders,
            store,
            executor,
            reservations,
            saga,
            projector,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    // =========================================================================
    // Order Lifecycle
    // =========================================================================

    /// Holds stock for a placed order. All lines or none.
    pub async fn reserve(
        &self,
        lines: &[LineItem],
        correlation_id: &str,
    ) -> InventoryResult<Vec<InventoryReservation>> {
        self.reservations.reserve(lines, correlation_id).await
    }

    /// Releases an order's holds. Repeat calls are no-ops.
    pub async fn release(
        &self,
        lines: &[LineItem],
        correlation_id: &str,
    ) -> InventoryResult<Vec<InventoryReservation>> {
        self.reservations.release(lines, correlation_id).await
    }

    /// Deducts an order's stock at shipper assignment.
    pub async fn deduct_for_order(
        &self,
        order: &Order,
        performed_by: Option<&str>,
    ) -> InventoryResult<Vec<MovementReceipt>> {
        self.saga.deduct_for_order(order, performed_by).await
    }

    /// Returns a deducted order's units (return, cancellation, failed delivery).
    pub async fn restock_order(
        &self,
        order: &Order,
        reason: TransactionReason,
        performed_by: Option<&str>,
    ) -> InventoryResult<Vec<MovementReceipt>> {
        self.saga.restock_order(order, reason, performed_by).await
    }

    /// Cancels an order before deduction.
    pub async fn cancel_order(&self, order: &Order) -> InventoryResult<()> {
        self.saga.cancel_order(order).await
    }

    // =========================================================================
    // Administrative Movements
    // =========================================================================

    /// Receives stock, creating the item on first receipt.
    pub async fn stock_in(
        &self,
        key: &ItemKey,
        request: &StockInRequest,
    ) -> InventoryResult<MovementReceipt> {
        let item = self.store.get_or_create(key).await?;
        self.executor.stock_in(&item.id, request).await
    }

    /// Removes stock (damage, manual sale, correction).
    pub async fn stock_out(
        &self,
        key: &ItemKey,
        request: &StockOutRequest,
    ) -> InventoryResult<MovementReceipt> {
        let item = self.store.get_active(key).await?;
        self.executor.stock_out(&item.id, request).await
    }

    /// Sets on-hand stock to a counted quantity.
    pub async fn adjust_stock(
        &self,
        key: &ItemKey,
        request: &AdjustRequest,
    ) -> InventoryResult<MovementReceipt> {
        let item = self.store.get_or_create(key).await?;
        self.executor.adjust(&item.id, request).await
    }

    /// Handles a size being removed from its variant.
    ///
    /// The item is deleted only when it holds no stock and no order refers
    /// to it; otherwise it is retired and stops accepting movements.
    pub async fn remove_size(&self, key: &ItemKey) -> InventoryResult<SizeRemoval> {
        let Some(item) = self.store.find(key).await? else {
            return Ok(SizeRemoval::Absent);
        };

        let referenced = bounded(
            "order reference lookup",
            self.config.collaborator_timeout(),
            self.orders.is_referenced(key),
        )
        .await?;

        let items = self.db.items();
        let removal = if !referenced && items.delete_if_empty(&item.id).await? {
            SizeRemoval::Deleted
        } else {
            items.retire(&item.id, Utc::now()).await?;
            SizeRemoval::Retired
        };

        info!(
            key = %key,
            sku = %item.sku,
            quantity = item.quantity,
            referenced,
            ?removal,
            "Size removed from inventory"
        );

        if let Err(e) = self.projector.refresh(&item.product_id).await {
            warn!(product_id = %item.product_id, error = %e, "Stock status refresh failed");
        }

        Ok(removal)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_item(&self, key: &ItemKey) -> InventoryResult<Option<InventoryItem>> {
        self.store.find(key).await
    }

    /// Ledger of one item in commit order.
    pub async fn item_history(&self, key: &ItemKey) -> InventoryResult<Vec<InventoryTransaction>> {
        let item = self
            .store
            .find(key)
            .await?
            .ok_or_else(|| CoreError::not_found("Inventory item", key.to_string()))?;
        Ok(self.db.ledger().list_for_item(&item.id).await?)
    }

    pub async fn get_product_stock_info(&self, product_id: &str) -> InventoryResult<ProductStockInfo> {
        self.projector.product_stock_info(product_id).await
    }

    /// Availability and cached prices of every active size of a variant.
    pub async fn get_variant_pricing(&self, variant_id: &str) -> InventoryResult<VariantPricing> {
        let items = self.store.find_by_variant(variant_id).await?;
        Ok(VariantPricing {
            variant_id: variant_id.to_string(),
            sizes: items.iter().map(SizePricing::from).collect(),
        })
    }

    /// Active items at or below their threshold, emptiest first.
    pub async fn low_stock_report(&self) -> InventoryResult<Vec<InventoryItem>> {
        self.store
            .list_low_stock(self.config.stock.low_stock_report_limit)
            .await
    }

    /// Compensations that have not been applied yet.
    pub async fn pending_reconciliation(&self) -> InventoryResult<Vec<CompensationEntry>> {
        Ok(self.db.compensations().list_unresolved().await?)
    }

    /// Builds the outbox worker for this service. Spawn `worker.run()`.
    pub fn compensation_worker(&self) -> (CompensationWorker, CompensationWorkerHandle) {
        CompensationWorker::new(
            self.db.clone(),
            self.executor.clone(),
            self.config.compensation.clone(),
        )
    }
}
