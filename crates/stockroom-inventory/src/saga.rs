//! # Order Fulfillment Saga
//!
//! Moves an order's stock through deduction, rollback and restock.
//!
//! ## Deduction Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       deduct_for_order(order)                           │
//! │                                                                         │
//! │  1. PRE-VALIDATE      every line → active item, quantity ≥ requested    │
//! │        │ fail ──────► InsufficientStock / NotFound (nothing written)   │
//! │        ▼                                                                │
//! │  2. DEDUCT            stock_out(sale, reference = order id), in order  │
//! │        │              (each write also consumes the order's hold)      │
//! │        │ fail ──────► 3. COMPENSATE deducted lines in reverse          │
//! │        │                 stock_in(rollback) at the cost they left with │
//! │        │                 (restores the hold it consumed)               │
//! │        │                 │ fail ──► ERROR critical + outbox row        │
//! │        │                 ▼                                             │
//! │        │              re-raise the original error                      │
//! │        ▼                                                                │
//! │     receipts                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines are not atomic across items. Every step is keyed by the order id, so
//! the duplicate guard makes compensation and outbox retries idempotent.

use tracing::{debug, error, info, warn};

use stockroom_core::validation::validate_reference;
use stockroom_core::{
    CoreError, InventoryItem, Money, Order, StockInRequest, StockOutRequest, TransactionReason,
    ValidationError,
};
use stockroom_db::{Database, NewCompensation};

use crate::error::{InventoryError, InventoryResult};
use crate::movement::{MovementReceipt, StockMovementExecutor};
use crate::reservation::{aggregate_lines, ReservationManager};
use crate::store::InventoryItemStore;

/// Fulfillment Saga over the executor and reservation manager.
#[derive(Clone)]
pub struct FulfillmentSaga {
    db: Database,
    store: InventoryItemStore,
    executor: StockMovementExecutor,
    reservations: ReservationManager,
}

impl FulfillmentSaga {
    pub fn new(
        db: Database,
        store: InventoryItemStore,
        executor: StockMovementExecutor,
        reservations: ReservationManager,
    ) -> Self {
        FulfillmentSaga {
            db,
            store,
            executor,
            reservations,
        }
    }

    /// Deducts every line of an order, or compensates what was deducted.
    ///
    /// ## Errors
    /// * `InsufficientStock` / `NotFound` - pre-validation; nothing written
    /// * any movement error - after compensation, naming the failing line
    pub async fn deduct_for_order(
        &self,
        order: &Order,
        performed_by: Option<&str>,
    ) -> InventoryResult<Vec<MovementReceipt>> {
        let reference = validate_reference(&order.id)?;
        let totals = aggregate_lines(&order.items)?;

        // Step 1: pre-validate on-hand stock
        let mut planned: Vec<(InventoryItem, i64)> = Vec::with_capacity(totals.len());
        for (key, quantity) in &totals {
            let item = self.store.get_active(key).await?;
            if item.quantity < *quantity {
                warn!(
                    order_id = %reference,
                    sku = %item.sku,
                    available = item.quantity,
                    requested = quantity,
                    "Order cannot be fulfilled"
                );
                return Err(CoreError::InsufficientStock {
                    item: item.label(),
                    available: item.quantity,
                    requested: *quantity,
                }
                .into());
            }
            planned.push((item, *quantity));
        }

        // Step 2: deduct line by line
        let mut deducted: Vec<MovementReceipt> = Vec::with_capacity(planned.len());
        for (item, quantity) in &planned {
            let mut request =
                StockOutRequest::new(*quantity, TransactionReason::Sale).reference(&reference);
            if let Some(user) = performed_by {
                request = request.performed_by(user);
            }

            match self.executor.stock_out(&item.id, &request).await {
                Ok(receipt) => deducted.push(receipt),
                Err(failure) => {
                    warn!(
                        order_id = %reference,
                        sku = %item.sku,
                        deducted = deducted.len(),
                        error = %failure,
                        "Order deduction failed; compensating"
                    );
                    // Step 3: compensate, then surface the original error
                    self.compensate(&deducted, &reference, performed_by, &failure)
                        .await;
                    return Err(failure);
                }
            }
        }

        info!(order_id = %reference, lines = deducted.len(), "Order stock deducted");
        Ok(deducted)
    }

    /// Puts deducted units back, newest first.
    async fn compensate(
        &self,
        deducted: &[MovementReceipt],
        reference: &str,
        performed_by: Option<&str>,
        failure: &InventoryError,
    ) {
        for receipt in deducted.iter().rev() {
            let sold = &receipt.transaction;
            let quantity = -sold.quantity_change;
            let unit_cost = Money::from_units(sold.cost_price);

            let mut request = StockInRequest::new(quantity, TransactionReason::Rollback)
                .unit_cost(unit_cost)
                .reference(reference)
                .notes(format!("Rollback of failed order deduction: {}", failure));
            if let Some(user) = performed_by {
                request = request.performed_by(user);
            }

            match self.executor.stock_in(&sold.inventory_item_id, &request).await {
                Ok(rollback) => {
                    info!(
                        order_id = reference,
                        item_id = %sold.inventory_item_id,
                        quantity,
                        seq = rollback.transaction.seq,
                        "Deduction rolled back"
                    );
                }
                Err(e) if e.is_duplicate() => {
                    debug!(
                        order_id = reference,
                        item_id = %sold.inventory_item_id,
                        "Deduction already rolled back"
                    );
                }
                Err(e) => {
                    error!(
                        critical = true,
                        order_id = reference,
                        item_id = %sold.inventory_item_id,
                        quantity,
                        unit_cost = sold.cost_price,
                        error = %e,
                        "Compensation failed; stock is short until reconciled"
                    );

                    let entry = NewCompensation {
                        inventory_item_id: sold.inventory_item_id.clone(),
                        quantity,
                        unit_cost: sold.cost_price,
                        reference: reference.to_string(),
                        performed_by: performed_by.map(str::to_string),
                        failure: failure.to_string(),
                        first_error: e.to_string(),
                    };

                    if let Err(queue_err) = self.db.compensations().enqueue(entry).await {
                        error!(
                            critical = true,
                            order_id = reference,
                            item_id = %sold.inventory_item_id,
                            error = %queue_err,
                            "Compensation could not be queued; manual reconciliation required"
                        );
                    }
                }
            }
        }
    }

    /// Returns an order's units to stock at each item's average cost.
    ///
    /// Lines already restocked for this order and reason are skipped, so a
    /// failed call can be retried as is.
    ///
    /// ## Errors
    /// * `Validation` - reason is not return, cancelled or delivery_failed
    pub async fn restock_order(
        &self,
        order: &Order,
        reason: TransactionReason,
        performed_by: Option<&str>,
    ) -> InventoryResult<Vec<MovementReceipt>> {
        if !reason.is_order_restock() {
            return Err(ValidationError::NotAllowed {
                field: "restock reason".to_string(),
                allowed: [
                    TransactionReason::Return,
                    TransactionReason::Cancelled,
                    TransactionReason::DeliveryFailed,
                ]
                .iter()
                .map(|r| r.to_string())
                .collect(),
            }
            .into());
        }

        let reference = validate_reference(&order.id)?;
        let totals = aggregate_lines(&order.items)?;
        let mut restocked = Vec::with_capacity(totals.len());

        for (key, quantity) in &totals {
            let item = self.store.get_active(key).await?;

            // No cost: planning values the units at the average it re-reads on each attempt.
            let mut request = StockInRequest::new(*quantity, reason).reference(&reference);
            if let Some(user) = performed_by {
                request = request.performed_by(user);
            }

            match self.executor.stock_in(&item.id, &request).await {
                Ok(receipt) => restocked.push(receipt),
                Err(e) if e.is_duplicate() => {
                    info!(order_id = %reference, sku = %item.sku, %reason, "Line already restocked");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            order_id = %reference,
            %reason,
            lines = restocked.len(),
            "Order stock restocked"
        );
        Ok(restocked)
    }

    /// Cancels an order that was never deducted.
    pub async fn cancel_order(&self, order: &Order) -> InventoryResult<()> {
        self.reservations.release(&order.items, &order.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticVariantCatalog;
    use crate::events::{NoopListener, SharedListener, StockChangeKind, StockChangeListener, StockChanged};
    use crate::movement::RetryPolicy;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use stockroom_core::{AdjustRequest, ItemKey, LineItem, ReservationStatus, TransactionType};

    /// Empties `target` right after `trigger` is sold, the way a concurrent
    /// shipper would. Optionally retires `trigger` too, so its rollback fails.
    struct Saboteur {
        db: Database,
        trigger: String,
        target: String,
        retire_trigger: bool,
        fired: AtomicBool,
    }

    #[async_trait]
    impl StockChangeListener for Saboteur {
        async fn on_stock_changed(&self, event: &StockChanged) {
            if event.item_id != self.trigger
                || event.kind != StockChangeKind::Movement(TransactionType::Out)
                || self.fired.swap(true, Ordering::SeqCst)
            {
                return;
            }

            let other = StockMovementExecutor::new(
                self.db.clone(),
                Arc::new(NoopListener),
                RetryPolicy::default(),
            );
            other
                .adjust(&self.target, &AdjustRequest::new(0, TransactionReason::Damage))
                .await
                .unwrap();

            if self.retire_trigger {
                self.db.items().retire(&self.trigger, Utc::now()).await.unwrap();
            }
        }
    }

    struct Fixture {
        db: Database,
        store: InventoryItemStore,
        shirt: InventoryItem,
        hat: InventoryItem,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = Database::in_memory().await.unwrap();
            let catalog = StaticVariantCatalog::new()
                .with_sku(ItemKey::new("p1", "v1", "M"), "SHIRT-M")
                .with_sku(ItemKey::new("p2", "v2", "OS"), "HAT-OS");
            let store = InventoryItemStore::new(db.clone(), Arc::new(catalog), 10, Duration::from_secs(1));
            let executor = StockMovementExecutor::new(db.clone(), Arc::new(NoopListener), RetryPolicy::default());

            let shirt = store.get_or_create(&ItemKey::new("p1", "v1", "M")).await.unwrap();
            let hat = store.get_or_create(&ItemKey::new("p2", "v2", "OS")).await.unwrap();
            executor
                .stock_in(&shirt.id, &StockInRequest::restock(10, Money::from_units(10)))
                .await
                .unwrap();
            executor
                .stock_in(&hat.id, &StockInRequest::restock(5, Money::from_units(20)))
                .await
                .unwrap();

            Fixture { db, store, shirt, hat }
        }

        fn saga(&self, listener: SharedListener) -> FulfillmentSaga {
            let executor = StockMovementExecutor::new(self.db.clone(), listener, RetryPolicy::default());
            let reservations =
                ReservationManager::new(self.db.clone(), self.store.clone(), Arc::new(NoopListener));
            FulfillmentSaga::new(self.db.clone(), self.store.clone(), executor, reservations)
        }

        fn saboteur(&self, retire_trigger: bool) -> SharedListener {
            Arc::new(Saboteur {
                db: self.db.clone(),
                trigger: self.shirt.id.clone(),
                target: self.hat.id.clone(),
                retire_trigger,
                fired: AtomicBool::new(false),
            })
        }

        fn order(&self, id: &str, shirts: i64, hats: i64) -> Order {
            Order {
                id: id.to_string(),
                items: vec![
                    LineItem::new(self.shirt.key(), shirts),
                    LineItem::new(self.hat.key(), hats),
                ],
            }
        }

        async fn item(&self, item: &InventoryItem) -> InventoryItem {
            self.db.items().get_by_id(&item.id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn test_deducts_every_line_and_consumes_reservations() {
        let f = Fixture::new().await;
        let saga = f.saga(Arc::new(NoopListener));
        let order = f.order("ORD-1", 3, 2);

        saga.reservations.reserve(&order.items, &order.id).await.unwrap();
        let receipts = saga.deduct_for_order(&order, Some("shipper-1")).await.unwrap();

        assert_eq!(receipts.len(), 2);
        let shirt = f.item(&f.shirt).await;
        let hat = f.item(&f.hat).await;
        assert_eq!((shirt.quantity, shirt.reserved_quantity), (7, 0));
        assert_eq!((hat.quantity, hat.reserved_quantity), (3, 0));

        let rows = f.db.ledger().list_by_reference("ORD-1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.reason == TransactionReason::Sale));
        assert!(rows.iter().all(|r| r.performed_by.as_deref() == Some("shipper-1")));

        let holds = f.db.reservations().list_for_correlation("ORD-1").await.unwrap();
        assert_eq!(holds.len(), 2);
        assert!(holds.iter().all(|h| h.status == ReservationStatus::Consumed));
    }

    #[tokio::test]
    async fn test_rollback_restores_consumed_hold() {
        let f = Fixture::new().await;
        let saga = f.saga(f.saboteur(false));
        let order = f.order("ORD-1", 3, 2);

        saga.reservations.reserve(&order.items, &order.id).await.unwrap();
        saga.deduct_for_order(&order, None).await.unwrap_err();

        let shirt = f.item(&f.shirt).await;
        assert_eq!((shirt.quantity, shirt.reserved_quantity), (10, 3));
        let hold = f.db.reservations().find_active(&f.shirt.id, "ORD-1").await.unwrap();
        assert_eq!(hold.map(|h| h.quantity), Some(3));
    }

    #[tokio::test]
    async fn test_prevalidation_failure_touches_nothing() {
        let f = Fixture::new().await;
        let saga = f.saga(Arc::new(NoopListener));

        let err = saga
            .deduct_for_order(&f.order("ORD-1", 3, 6), None)
            .await
            .unwrap_err();

        match err.as_core() {
            Some(CoreError::InsufficientStock { item, available, requested }) => {
                assert_eq!(item, "HAT-OS (size OS)");
                assert_eq!((*available, *requested), (5, 6));
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }

        assert_eq!(f.item(&f.shirt).await.quantity, 10);
        assert_eq!(f.item(&f.hat).await.quantity, 5);
        assert!(f.db.ledger().list_by_reference("ORD-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_mid_order_rolls_back_earlier_lines() {
        let f = Fixture::new().await;
        let saga = f.saga(f.saboteur(false));

        let err = saga
            .deduct_for_order(&f.order("ORD-1", 3, 2), None)
            .await
            .unwrap_err();

        match err.as_core() {
            Some(CoreError::InsufficientStock { item, .. }) => assert_eq!(item, "HAT-OS (size OS)"),
            other => panic!("expected InsufficientStock, got {:?}", other),
        }

        let shirt = f.item(&f.shirt).await;
        assert_eq!(shirt.quantity, 10);
        assert_eq!(shirt.average_cost_price, 10);

        let history = f.db.ledger().list_for_item(&f.shirt.id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.transaction_type, TransactionType::In);
        assert_eq!(last.reason, TransactionReason::Rollback);
        assert_eq!(last.quantity_change, 3);
        assert_eq!(last.cost_price, 10);
        assert_eq!(last.reference.as_deref(), Some("ORD-1"));

        assert_eq!(f.db.compensations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compensated_order_can_be_retried() {
        let f = Fixture::new().await;
        f.saga(f.saboteur(false))
            .deduct_for_order(&f.order("ORD-1", 3, 2), None)
            .await
            .unwrap_err();

        let saga = f.saga(Arc::new(NoopListener));
        saga.executor
            .stock_in(&f.hat.id, &StockInRequest::restock(4, Money::from_units(20)))
            .await
            .unwrap();

        saga.deduct_for_order(&f.order("ORD-1", 3, 2), None).await.unwrap();
        assert_eq!(f.item(&f.shirt).await.quantity, 7);
        assert_eq!(f.item(&f.hat).await.quantity, 2);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_queued() {
        let f = Fixture::new().await;
        let saga = f.saga(f.saboteur(true));

        let err = saga
            .deduct_for_order(&f.order("ORD-1", 3, 2), Some("shipper-1"))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })));

        let pending = f.db.compensations().list_unresolved().await.unwrap();
        assert_eq!(pending.len(), 1);
        let entry = &pending[0];
        assert_eq!(entry.inventory_item_id, f.shirt.id);
        assert_eq!(entry.quantity, 3);
        assert_eq!(entry.unit_cost, 10);
        assert_eq!(entry.reference, "ORD-1");
        assert_eq!(entry.performed_by.as_deref(), Some("shipper-1"));
        assert_eq!(entry.attempts, 1);
        assert!(entry.failure.contains("HAT-OS"));

        assert_eq!(f.item(&f.shirt).await.quantity, 7);
    }

    #[tokio::test]
    async fn test_restock_order_uses_average_cost_once() {
        let f = Fixture::new().await;
        let saga = f.saga(Arc::new(NoopListener));
        let order = f.order("ORD-1", 3, 2);
        saga.deduct_for_order(&order, None).await.unwrap();

        let receipts = saga
            .restock_order(&order, TransactionReason::Return, Some("support"))
            .await
            .unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].transaction.cost_price, 10);
        assert_eq!(receipts[1].transaction.cost_price, 20);
        assert_eq!(f.item(&f.shirt).await.quantity, 10);
        assert_eq!(f.item(&f.hat).await.quantity, 5);

        let again = saga
            .restock_order(&order, TransactionReason::Return, None)
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(f.item(&f.shirt).await.quantity, 10);
    }

    #[tokio::test]
    async fn test_restock_values_units_at_current_average() {
        let f = Fixture::new().await;
        let saga = f.saga(Arc::new(NoopListener));
        let order = f.order("ORD-1", 3, 1);
        saga.deduct_for_order(&order, None).await.unwrap();

        // 7 left at 10, 7 more at 24: average 17
        saga.executor
            .stock_in(&f.shirt.id, &StockInRequest::restock(7, Money::from_units(24)))
            .await
            .unwrap();

        let receipts = saga
            .restock_order(&order, TransactionReason::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(receipts[0].transaction.cost_price, 17);
        assert_eq!(receipts[0].item.average_cost_price, 17);
        assert_eq!(receipts[0].item.quantity, 17);
    }

    #[tokio::test]
    async fn test_restock_rejects_non_order_reason() {
        let f = Fixture::new().await;
        let saga = f.saga(Arc::new(NoopListener));
        let err = saga
            .restock_order(&f.order("ORD-1", 1, 1), TransactionReason::Restock, None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cancel_order_releases_reservations() {
        let f = Fixture::new().await;
        let saga = f.saga(Arc::new(NoopListener));
        let order = f.order("ORD-1", 4, 1);

        saga.reservations.reserve(&order.items, &order.id).await.unwrap();
        assert_eq!(f.item(&f.shirt).await.reserved_quantity, 4);

        saga.cancel_order(&order).await.unwrap();
        saga.cancel_order(&order).await.unwrap();
        assert_eq!(f.item(&f.shirt).await.reserved_quantity, 0);
        assert_eq!(f.item(&f.shirt).await.quantity, 10);
    }
}
