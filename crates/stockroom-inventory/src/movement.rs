//! # Stock Movement Executor
//!
//! Applies stock-in, stock-out and absolute adjustments to one item.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Compare-and-Swap Movement                           │
//! │                                                                         │
//! │   attempt 1..=max_write_retries                                        │
//! │     │                                                                   │
//! │     ├── read item (version v)                                          │
//! │     ├── plan movement (stockroom-core, pure)                           │
//! │     └── apply_movement (one DB transaction)                            │
//! │           UPDATE ... WHERE id = ? AND version = v                       │
//! │           duplicate guard (IN/OUT with reference)                       │
//! │           INSERT ledger row                                             │
//! │              │                                                          │
//! │              ├── Applied   ──► notify listener ──► receipt             │
//! │              ├── Duplicate ──► DuplicateTransaction (nothing written)  │
//! │              └── Stale / Busy ──► back off, re-read, re-plan           │
//! │                                                                         │
//! │   retries exhausted ──► ConcurrencyConflict                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation and business-rule errors come out of planning and are never
//! retried.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use stockroom_core::movement::{plan_adjust, plan_stock_in, plan_stock_out};
use stockroom_core::{
    AdjustRequest, CoreError, CoreResult, InventoryItem, InventoryTransaction, MovementPlan,
    StockInRequest, StockOutRequest,
};
use stockroom_db::{Database, MovementOutcome};

use crate::error::{InventoryError, InventoryResult};
use crate::events::{SharedListener, StockChangeKind, StockChanged};

/// A committed movement: the item as stored and its ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementReceipt {
    pub item: InventoryItem,
    pub transaction: InventoryTransaction,
}

/// Retry policy for version conflicts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.initial_backoff * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
        }
    }
}

/// Stock Movement Executor.
#[derive(Clone)]
pub struct StockMovementExecutor {
    db: Database,
    listener: SharedListener,
    retry: RetryPolicy,
}

impl StockMovementExecutor {
    pub fn new(db: Database, listener: SharedListener, retry: RetryPolicy) -> Self {
        StockMovementExecutor { db, listener, retry }
    }

    /// Receives a batch.
    ///
    /// ## Errors
    /// * `Validation` - bad quantity, reason, cost or reference
    /// * `NotFound` - unknown or retired item
    /// * `DuplicateTransaction` - same reference already received
    /// * `ConcurrencyConflict` - the item kept changing underneath
    pub async fn stock_in(
        &self,
        item_id: &str,
        request: &StockInRequest,
    ) -> InventoryResult<MovementReceipt> {
        self.execute(item_id, |item, now| plan_stock_in(item, request, now))
            .await
    }

    /// Removes units from on-hand stock.
    ///
    /// ## Errors
    /// * `InsufficientStock` - on-hand below the requested quantity
    /// * everything [`stock_in`](Self::stock_in) can return
    pub async fn stock_out(
        &self,
        item_id: &str,
        request: &StockOutRequest,
    ) -> InventoryResult<MovementReceipt> {
        self.execute(item_id, |item, now| plan_stock_out(item, request, now))
            .await
    }

    /// Sets on-hand stock to a counted quantity. No duplicate guard.
    pub async fn adjust(
        &self,
        item_id: &str,
        request: &AdjustRequest,
    ) -> InventoryResult<MovementReceipt> {
        self.execute(item_id, |item, now| plan_adjust(item, request, now))
            .await
    }

    async fn execute<F>(&self, item_id: &str, plan: F) -> InventoryResult<MovementReceipt>
    where
        F: Fn(&InventoryItem, DateTime<Utc>) -> CoreResult<MovementPlan>,
    {
        let items = self.db.items();
        let mut backoff = self.retry.backoff();

        for attempt in 1..=self.retry.max_attempts {
            let current = items
                .get_by_id(item_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Inventory item", item_id))?;

            let planned = plan(&current, Utc::now())?;

            if planned.cost_fallback {
                warn!(
                    item_id = %item_id,
                    sku = %current.sku,
                    "Order restock received with no cost and no average cost; valued at zero"
                );
            }

            match items.apply_movement(&planned).await {
                Ok(MovementOutcome::Applied { item, transaction }) => {
                    info!(
                        item_id = %item.id,
                        sku = %item.sku,
                        kind = %transaction.transaction_type,
                        reason = %transaction.reason,
                        change = transaction.quantity_change,
                        quantity = item.quantity,
                        average_cost = item.average_cost_price,
                        seq = transaction.seq,
                        "Stock movement applied"
                    );

                    let event =
                        StockChanged::new(StockChangeKind::Movement(transaction.transaction_type), &item);
                    self.listener.on_stock_changed(&event).await;

                    return Ok(MovementReceipt { item, transaction });
                }
                Ok(MovementOutcome::Duplicate(existing)) => {
                    warn!(
                        item_id = %item_id,
                        existing_id = %existing.id,
                        reference = ?existing.reference,
                        "Duplicate stock movement rejected"
                    );
                    return Err(CoreError::DuplicateTransaction {
                        existing_id: existing.id,
                        reference: existing.reference.unwrap_or_default(),
                    }
                    .into());
                }
                Ok(MovementOutcome::Stale) => {
                    debug!(item_id = %item_id, attempt, "Version conflict, retrying");
                }
                Err(e) if e.is_retryable() => {
                    debug!(item_id = %item_id, attempt, error = %e, "Store busy, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            if attempt < self.retry.max_attempts {
                if let Some(wait) = backoff.next_backoff() {
                    tokio::time::sleep(wait).await;
                }
            }
        }

        warn!(
            item_id = %item_id,
            attempts = self.retry.max_attempts,
            "Giving up on stock movement after repeated conflicts"
        );
        Err(InventoryError::ConcurrencyConflict {
            item_id: item_id.to_string(),
            attempts: self.retry.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopListener;
    use std::sync::Arc;
    use stockroom_core::{ItemKey, Money, Percent, TransactionReason, TransactionType};

    async fn setup() -> (Database, StockMovementExecutor, InventoryItem) {
        let db = Database::in_memory().await.unwrap();
        let item = db
            .items()
            .insert_if_absent(&InventoryItem::new(
                &ItemKey::new("p1", "v1", "M"),
                "TEE-BLK-M",
                10,
                Utc::now(),
            ))
            .await
            .unwrap();
        let executor = StockMovementExecutor::new(db.clone(), Arc::new(NoopListener), RetryPolicy::default());
        (db, executor, item)
    }

    #[tokio::test]
    async fn test_two_batches_blend_average_cost() {
        let (_db, executor, item) = setup().await;

        let request = StockInRequest::restock(10, Money::from_units(100))
            .target_profit(Percent::from_percent(30))
            .discount(Percent::zero());
        executor.stock_in(&item.id, &request).await.unwrap();

        let receipt = executor
            .stock_in(&item.id, &StockInRequest::restock(10, Money::from_units(200)))
            .await
            .unwrap();

        assert_eq!(receipt.item.quantity, 20);
        assert_eq!(receipt.item.average_cost_price, 150);
        assert_eq!(receipt.item.selling_price, 195);
        assert_eq!(receipt.item.final_price, 195);
        assert_eq!(receipt.item.version, 2);
        assert_eq!(receipt.transaction.average_cost_price_before, 100);
        assert_eq!(receipt.transaction.average_cost_price_after, 150);
    }

    #[tokio::test]
    async fn test_stock_in_then_out_restores_quantity() {
        let (db, executor, item) = setup().await;
        executor
            .stock_in(&item.id, &StockInRequest::restock(7, Money::from_units(40)))
            .await
            .unwrap();
        let receipt = executor
            .stock_out(&item.id, &StockOutRequest::new(7, TransactionReason::Damage))
            .await
            .unwrap();

        assert_eq!(receipt.item.quantity, 0);
        assert_eq!(receipt.item.reserved_quantity, 0);
        assert_eq!(receipt.transaction.quantity_change, -7);
        assert_eq!(receipt.transaction.cost_price, 40);
        assert_eq!(db.ledger().count_for_item(&item.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let (db, executor, item) = setup().await;
        executor
            .stock_in(&item.id, &StockInRequest::restock(3, Money::from_units(40)))
            .await
            .unwrap();

        let err = executor
            .stock_out(&item.id, &StockOutRequest::new(4, TransactionReason::Sale))
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_core(),
            Some(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
        let stored = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 3);
        assert_eq!(db.ledger().count_for_item(&item.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected_and_state_unchanged() {
        let (db, executor, item) = setup().await;
        let request = StockInRequest::restock(5, Money::from_units(20)).reference("PO-1");
        let first = executor.stock_in(&item.id, &request).await.unwrap();

        let err = executor.stock_in(&item.id, &request).await.unwrap_err();
        match err.as_core() {
            Some(CoreError::DuplicateTransaction { existing_id, reference }) => {
                assert_eq!(existing_id, &first.transaction.id);
                assert_eq!(reference, "PO-1");
            }
            other => panic!("expected duplicate, got {:?}", other),
        }

        let stored = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
        assert_eq!(stored.version, first.item.version);
    }

    #[tokio::test]
    async fn test_same_reference_different_reason_is_allowed() {
        let (_db, executor, item) = setup().await;
        executor
            .stock_in(&item.id, &StockInRequest::restock(5, Money::from_units(20)).reference("ORD-9"))
            .await
            .unwrap();

        let receipt = executor
            .stock_out(
                &item.id,
                &StockOutRequest::new(2, TransactionReason::Sale).reference("ORD-9"),
            )
            .await
            .unwrap();
        assert_eq!(receipt.item.quantity, 3);
    }

    #[tokio::test]
    async fn test_adjust_sets_absolute_quantity() {
        let (_db, executor, item) = setup().await;
        executor
            .stock_in(&item.id, &StockInRequest::restock(12, Money::from_units(30)))
            .await
            .unwrap();

        let receipt = executor
            .adjust(&item.id, &AdjustRequest::new(9, TransactionReason::Adjustment))
            .await
            .unwrap();

        assert_eq!(receipt.transaction.transaction_type, TransactionType::Adjust);
        assert_eq!(receipt.transaction.quantity_after, 9);
        assert_eq!(receipt.transaction.quantity_change, -3);
        assert_eq!(receipt.transaction.cost_price, 30);
        assert_eq!(receipt.item.quantity, 9);
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let (_db, executor, _item) = setup().await;
        let err = executor
            .stock_in("missing", &StockInRequest::restock(1, Money::from_units(1)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_first_conflict_wait_follows_policy() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
        };
        let mut backoff = policy.backoff();

        // 50% jitter around the configured interval
        let first = backoff.next_backoff().unwrap();
        assert!(first <= Duration::from_millis(15), "first wait was {:?}", first);
        assert!(first >= Duration::from_millis(5), "first wait was {:?}", first);
    }

    #[tokio::test]
    async fn test_concurrent_stock_ins_all_land() {
        let (db, _executor, item) = setup().await;
        let executor = StockMovementExecutor::new(
            db.clone(),
            Arc::new(NoopListener),
            RetryPolicy {
                max_attempts: 64,
                initial_backoff: Duration::from_millis(1),
            },
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let executor = executor.clone();
            let id = item.id.clone();
            handles.push(tokio::spawn(async move {
                executor
                    .stock_in(&id, &StockInRequest::restock(1, Money::from_units(10)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 8);
        assert_eq!(db.ledger().count_for_item(&item.id).await.unwrap(), 8);
    }
}
